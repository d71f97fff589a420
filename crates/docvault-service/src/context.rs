//! Request context carrying the caller and an optional bypass token.

use chrono::{DateTime, Utc};

use docvault_core::error::AppError;
use docvault_entity::principal::Principal;

/// Context for the current request.
///
/// Built by the request layer and passed into service methods so that every
/// operation knows who is acting. `principal` is `None` for anonymous
/// callers, who can only reach content through a bypass token.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The authenticated caller, if any.
    pub principal: Option<Principal>,
    /// Signed single-entity read token presented with the request.
    pub bypass_token: Option<String>,
    /// When the request was received.
    pub request_time: DateTime<Utc>,
}

impl RequestContext {
    /// Context for an authenticated principal.
    pub fn new(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
            bypass_token: None,
            request_time: Utc::now(),
        }
    }

    /// Context for an unauthenticated caller.
    pub fn anonymous() -> Self {
        Self {
            principal: None,
            bypass_token: None,
            request_time: Utc::now(),
        }
    }

    /// Attach a bypass token (builder style).
    pub fn with_bypass_token(mut self, token: impl Into<String>) -> Self {
        self.bypass_token = Some(token.into());
        self
    }

    /// The caller, if authenticated.
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// The caller, or `Authentication` for anonymous requests.
    pub fn require_principal(&self) -> Result<&Principal, AppError> {
        self.principal
            .as_ref()
            .ok_or_else(|| AppError::authentication("This operation requires a signed-in principal"))
    }
}
