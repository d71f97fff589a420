//! Bypass token issuing and verification.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};

use docvault_core::config::AuthConfig;
use docvault_core::config::auth::MAX_BYPASS_TOKEN_TTL_SECONDS;
use docvault_core::error::AppError;
use docvault_core::types::EntityId;

use super::claims::BypassClaims;

/// A freshly issued token.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BypassToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies HS256 bypass tokens.
#[derive(Clone)]
pub struct BypassTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl_seconds: i64,
}

impl std::fmt::Debug for BypassTokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BypassTokenService")
            .field("ttl_seconds", &self.ttl_seconds)
            .finish()
    }
}

impl BypassTokenService {
    /// Creates a new token service from auth configuration. The lifetime is
    /// clamped to one minute.
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let ttl = config
            .bypass_token_ttl_seconds
            .clamp(1, MAX_BYPASS_TOKEN_TTL_SECONDS);

        Self {
            encoding_key: EncodingKey::from_secret(config.bypass_token_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.bypass_token_secret.as_bytes()),
            validation,
            ttl_seconds: ttl as i64,
        }
    }

    /// Issue a token for `entity_id`.
    pub fn issue(&self, entity_id: EntityId) -> Result<BypassToken, AppError> {
        let now = Utc::now();
        let expires_at = now + Duration::seconds(self.ttl_seconds);
        let claims = BypassClaims {
            ent: entity_id,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("Failed to encode bypass token: {e}")))?;

        tracing::debug!(entity_id = %entity_id, %expires_at, "Issued bypass token");
        Ok(BypassToken { token, expires_at })
    }

    /// Decode a token, checking signature and expiry only.
    pub fn decode(&self, token: &str) -> Result<BypassClaims, AppError> {
        let data = decode::<BypassClaims>(token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AppError::authentication("Bypass token has expired")
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    AppError::authentication("Invalid bypass token signature")
                }
                _ => AppError::authentication(format!("Invalid bypass token: {e}")),
            },
        )?;

        let claims = data.claims;
        if claims.exp - claims.iat > MAX_BYPASS_TOKEN_TTL_SECONDS as i64 {
            return Err(AppError::authentication(
                "Bypass token lifetime exceeds one minute",
            ));
        }
        Ok(claims)
    }

    /// Verify that `token` is valid and bound to `entity_id`.
    pub fn verify(&self, token: &str, entity_id: EntityId) -> Result<(), AppError> {
        let claims = self.decode(token)?;
        if claims.ent != entity_id {
            return Err(AppError::authentication(
                "Bypass token is bound to a different entity",
            ));
        }
        Ok(())
    }
}
