//! Message headers, offer statuses and block identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

static NEXT_POSTED_HEADER: AtomicU64 = AtomicU64::new(1);

/// Identifies one message offered by a source.
///
/// Id 0 never identifies a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageHeader(u64);

impl MessageHeader {
    /// The header that identifies no message.
    pub const INVALID: Self = Self(0);

    /// Creates a header with the given id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Draws a fresh header for a message posted from outside any source.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_POSTED_HEADER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the id.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }

    /// Returns whether this header identifies a message.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for MessageHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The answer a target gives to an offered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// The target took the message.
    Accepted,
    /// The target did not want the message; offer it elsewhere.
    Declined,
    /// The target wants the message later and will consume it from the source.
    Postponed,
    /// The target tried to consume the message but it was already gone.
    NotAvailable,
    /// The target has completed; it will decline everything from now on.
    DecliningPermanently,
}

impl MessageStatus {
    /// Returns whether the message was taken.
    #[must_use]
    pub const fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted => write!(f, "accepted"),
            Self::Declined => write!(f, "declined"),
            Self::Postponed => write!(f, "postponed"),
            Self::NotAvailable => write!(f, "not_available"),
            Self::DecliningPermanently => write!(f, "declining_permanently"),
        }
    }
}

/// Identity of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId(Uuid);

impl BlockId {
    /// Creates a fresh block id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying uuid.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BlockId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
