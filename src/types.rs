//! Basic type definitions for the matchmaking server
//!
//! Provides newtype wrappers for type safety:
//! - `UserId`: UUID-based anonymous session identity
//! - `RoomId`: UUID-based room identifier
//! - `MessageId`: UUID-based chat message identifier
//!
//! Plus the anonymous `Profile` summary supplied by the identity boundary.

use uuid::Uuid;

/// Unique user identifier (newtype pattern)
///
/// Wraps a UUID v4 for type-safe user identification.
/// Implements Hash and Eq for use as HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Create a new random user ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique room identifier (newtype pattern)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoomId(pub Uuid);

impl RoomId {
    /// Create a new random room ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique chat message identifier (newtype pattern)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub Uuid);

impl MessageId {
    /// Create a new random message ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Avatar glyphs assigned to anonymous sessions
const AVATAR_GLYPHS: &[&str] = &["🦊", "🐱", "🐼", "🐸", "🦉", "🐙", "🦄", "🐢"];

/// Anonymous profile summary
///
/// Supplied at connect time by the identity boundary. The nickname is
/// optional and set by the client; the avatar glyph is assigned randomly.
#[derive(Debug, Clone)]
pub struct Profile {
    /// Display nickname (None until the client sets one)
    pub nickname: Option<String>,
    /// Randomly assigned avatar glyph
    pub avatar_glyph: String,
}

impl Profile {
    /// Create an anonymous profile with a random avatar glyph
    pub fn anonymous() -> Self {
        use rand::seq::SliceRandom;
        let glyph = AVATAR_GLYPHS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or("🦊");
        Self {
            nickname: None,
            avatar_glyph: glyph.to_string(),
        }
    }

    /// Get the display name: nickname if set, otherwise "Stranger"
    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or("Stranger")
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::anonymous()
    }
}
