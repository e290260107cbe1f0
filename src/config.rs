//! Engine configuration
//!
//! Product-tunable knobs for matchmaking and messaging. The durations are
//! deliberately configuration, not contract values: the defaults mirror the
//! reference client behavior (2s pairing poll, 30s search cap, 2s typing
//! quiet period).

use std::env;
use std::time::Duration;

/// Default pairing poll interval
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default bound on how long a user stays in the waiting pool
const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default quiet period after which an unrefreshed typing signal clears
const DEFAULT_TYPING_QUIET_PERIOD: Duration = Duration::from_secs(2);

/// Built-in banned terms, used when `BANNED_WORDS` is not set
const DEFAULT_BANNED_WORDS: &[&str] = &["badword1", "badword2", "spam", "abuse"];

/// Tunable engine settings
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How often a searching user re-attempts pairing
    pub poll_interval: Duration,
    /// How long a user may wait in the pool before the search gives up
    pub search_timeout: Duration,
    /// How long an unrefreshed typing signal stays asserted
    pub typing_quiet_period: Duration,
    /// Ordered banned-term list for the profanity filter
    pub banned_words: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
            typing_quiet_period: DEFAULT_TYPING_QUIET_PERIOD,
            banned_words: DEFAULT_BANNED_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }
}

impl EngineConfig {
    /// Build a config from the environment
    ///
    /// `BANNED_WORDS` is a comma-separated ordered term list; empty items
    /// are dropped. Unset means the built-in default list.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = env::var("BANNED_WORDS") {
            let words: Vec<String> = raw
                .split(',')
                .map(|w| w.trim().to_string())
                .filter(|w| !w.is_empty())
                .collect();
            if !words.is_empty() {
                config.banned_words = words;
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_durations() {
        let config = EngineConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.search_timeout, Duration::from_secs(30));
        assert_eq!(config.typing_quiet_period, Duration::from_secs(2));
        assert!(!config.banned_words.is_empty());
    }
}
