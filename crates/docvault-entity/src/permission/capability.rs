//! The four independently resolved capabilities.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// One capability a principal can hold on an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Read,
    Comment,
    Share,
    Write,
}

impl Capability {
    /// All capabilities in resolution order.
    pub const ALL: [Capability; 4] = [Self::Read, Self::Comment, Self::Share, Self::Write];

    /// Return the capability as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Comment => "comment",
            Self::Share => "share",
            Self::Write => "write",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A set of capability flags, as stored on an override row and as returned
/// by access resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, FromRow)]
pub struct Capabilities {
    #[sqlx(rename = "can_read")]
    pub read: bool,
    #[sqlx(rename = "can_comment")]
    pub comment: bool,
    #[sqlx(rename = "can_share")]
    pub share: bool,
    #[sqlx(rename = "can_write")]
    pub write: bool,
}

impl Capabilities {
    /// No capabilities.
    pub const NONE: Self = Self {
        read: false,
        comment: false,
        share: false,
        write: false,
    };

    /// Every capability.
    pub const FULL: Self = Self {
        read: true,
        comment: true,
        share: true,
        write: true,
    };

    /// Read only.
    pub const READ_ONLY: Self = Self {
        read: true,
        comment: false,
        share: false,
        write: false,
    };

    /// Build from explicit flags.
    pub fn new(read: bool, comment: bool, share: bool, write: bool) -> Self {
        Self {
            read,
            comment,
            share,
            write,
        }
    }

    /// Look up one capability.
    pub fn get(&self, capability: Capability) -> bool {
        match capability {
            Capability::Read => self.read,
            Capability::Comment => self.comment,
            Capability::Share => self.share,
            Capability::Write => self.write,
        }
    }

    /// Set one capability.
    pub fn set(&mut self, capability: Capability, value: bool) {
        match capability {
            Capability::Read => self.read = value,
            Capability::Comment => self.comment = value,
            Capability::Share => self.share = value,
            Capability::Write => self.write = value,
        }
    }

    /// Whether every capability is granted.
    pub fn is_full(&self) -> bool {
        *self == Self::FULL
    }

    /// Whether no capability is granted.
    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }
}
