// Access token claim decoding
// Only the expiry and subject are read; signatures are the server's business

use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, Validation};
use serde::Deserialize;

#[derive(Deserialize)]
struct RawClaims {
    exp: Option<i64>,
    user_id: Option<serde_json::Value>,
    sub: Option<serde_json::Value>,
}

/// Claims read from an encoded token
#[derive(Debug, Clone, PartialEq)]
pub struct TokenClaims {
    pub expires_at: Option<DateTime<Utc>>,
    pub subject: Option<String>,
}

/// Read the claims of a `header.payload.signature` token without verifying it
///
/// Returns `None` when the token is not in that shape or the payload is not JSON.
pub fn decode_claims(token: &str) -> Option<TokenClaims> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let raw = jsonwebtoken::decode::<RawClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| tracing::debug!(error = %e, "Undecodable access token"))
        .ok()?
        .claims;

    Some(TokenClaims {
        expires_at: raw.exp.and_then(|exp| DateTime::from_timestamp(exp, 0)),
        subject: raw.user_id.or(raw.sub).map(|v| match v {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        }),
    })
}

/// Expiry instant of a token, if decodable
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    decode_claims(token).and_then(|claims| claims.expires_at)
}
