//! Bypass token claims.

use serde::{Deserialize, Serialize};

use docvault_core::types::EntityId;

/// Claims carried by a bypass token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BypassClaims {
    /// The single entity the token unlocks.
    pub ent: EntityId,
    /// Issued at (UTC epoch seconds).
    pub iat: i64,
    /// Expires at (UTC epoch seconds).
    pub exp: i64,
}
