//! Handshake credential verification.
//!
//! Token issuance and refresh rotation live elsewhere; the hub only
//! verifies. Verification happens before any registry or hub state is
//! touched, so an unauthenticated flooder never reaches the admission maps.

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use relay_core::OperatorId;
use serde::{Deserialize, Serialize};

/// JWT claims the gateway cares about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Operator identity.
    pub sub: String,
    /// Expiry (seconds since epoch).
    pub exp: u64,
    /// Issuer, validated when the verifier is configured with one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// Credential verification failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No credential was presented in the handshake.
    #[error("missing credential")]
    Missing,
    /// The credential did not verify (bad signature, wrong issuer, garbage).
    #[error("invalid credential")]
    Invalid,
    /// The credential verified but is past its expiry.
    #[error("expired credential")]
    Expired,
}

/// Verifies a bearer credential into an operator identity.
pub trait CredentialVerifier: Send + Sync {
    /// Verify `token` and return the operator it identifies.
    fn verify(&self, token: &str) -> Result<OperatorId, AuthError>;
}

/// HS256 JWT verifier.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// Build a verifier over a shared HMAC secret, optionally pinning the
    /// expected issuer.
    #[must_use]
    pub fn new(secret: &[u8], issuer: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(iss) = issuer {
            validation.set_issuer(&[iss]);
        }
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl CredentialVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<OperatorId, AuthError> {
        match jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation) {
            Ok(data) => Ok(OperatorId::from_string(data.claims.sub)),
            Err(e) => match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => Err(AuthError::Expired),
                _ => Err(AuthError::Invalid),
            },
        }
    }
}
