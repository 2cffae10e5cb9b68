//! Session tokens
//!
//! Uses HMAC-signed tokens carried in a cookie or a Bearer header.
//! No server-side session storage needed.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Authenticated user on whose behalf a service call runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
}

impl Principal {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// Signed token payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    /// When session was created
    pub created_at: DateTime<Utc>,
    /// When session expires
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Session for `user_id` valid for `max_age_secs` seconds from now
    pub fn issue(user_id: &str, max_age_secs: i64) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.to_string(),
            created_at: now,
            expires_at: now + Duration::seconds(max_age_secs),
        }
    }

    /// Check if session is expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    pub fn principal(&self) -> Principal {
        Principal::new(self.user_id.clone())
    }
}

type HmacSha256 = hmac::Hmac<sha2::Sha256>;

fn sign(payload_b64: &str, secret: &str) -> Result<HmacSha256, AppError> {
    use hmac::Mac;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Encryption(e.to_string()))?;
    mac.update(payload_b64.as_bytes());
    Ok(mac)
}

/// Create a signed session token
///
/// Token format: base64(payload).base64(hmac_sha256(payload))
pub fn create_session_token(session: &Session, secret: &str) -> Result<String, AppError> {
    use base64::{Engine as _, engine::general_purpose};
    use hmac::Mac;

    let payload = serde_json::to_string(session).map_err(|e| AppError::Internal(e.into()))?;
    let payload_b64 = general_purpose::URL_SAFE_NO_PAD.encode(payload.as_bytes());

    let signature = sign(&payload_b64, secret)?.finalize().into_bytes();
    let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);

    Ok(format!("{}.{}", payload_b64, signature_b64))
}

/// Verify and decode a session token
///
/// # Errors
/// `Unauthorized` if the token is malformed, forged or expired
pub fn verify_session_token(token: &str, secret: &str) -> Result<Session, AppError> {
    use base64::{Engine as _, engine::general_purpose};
    use hmac::Mac;

    let (payload_b64, signature_b64) = token.split_once('.').ok_or(AppError::Unauthorized)?;

    let signature = general_purpose::URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AppError::Unauthorized)?;
    sign(payload_b64, secret)?
        .verify_slice(&signature)
        .map_err(|_| AppError::Unauthorized)?;

    let payload = general_purpose::URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AppError::Unauthorized)?;
    let session: Session =
        serde_json::from_slice(&payload).map_err(|_| AppError::Unauthorized)?;

    if session.is_expired() {
        return Err(AppError::Unauthorized);
    }

    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn token_round_trips_principal() {
        let session = Session::issue("01ARZ3NDEKTSV4RRFFQ69G5FAV", 60);
        let token = tokio_test::assert_ok!(create_session_token(&session, SECRET));

        let verified = tokio_test::assert_ok!(verify_session_token(&token, SECRET));
        assert_eq!(verified.principal(), Principal::new("01ARZ3NDEKTSV4RRFFQ69G5FAV"));
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = create_session_token(&Session::issue("user", 60), SECRET).unwrap();

        let error = verify_session_token(&token, "another-secret-another-secret-xx").unwrap_err();
        assert!(matches!(error, AppError::Unauthorized));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = create_session_token(&Session::issue("user", -1), SECRET).unwrap();

        tokio_test::assert_err!(verify_session_token(&token, SECRET));
    }

    #[test]
    fn malformed_token_is_rejected() {
        assert!(verify_session_token("no-dot-here", SECRET).is_err());
        assert!(verify_session_token("a.b.c", SECRET).is_err());
    }
}
