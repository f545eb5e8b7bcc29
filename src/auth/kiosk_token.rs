use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::AppError;

type HmacSha256 = Hmac<Sha256>;

const PURPOSE: &str = "kiosk";

/// Signed kiosk credential embedded in the kiosk URL.
/// Format: base64url(kiosk:kiosk_id:expiry_timestamp:hex_hmac)
pub fn generate_kiosk_token(kiosk_id: Uuid, ttl: Duration, secret: &str) -> Result<(String, DateTime<Utc>), AppError> {
    generate_kiosk_token_at(kiosk_id, Utc::now() + ttl, secret)
}

fn generate_kiosk_token_at(kiosk_id: Uuid, expires_at: DateTime<Utc>, secret: &str) -> Result<(String, DateTime<Utc>), AppError> {
    let payload = format!("{}:{}:{}", PURPOSE, kiosk_id, expires_at.timestamp());
    let signature = sign(&payload, secret)?;
    let token = URL_SAFE_NO_PAD.encode(format!("{}:{}", payload, signature).as_bytes());
    Ok((token, expires_at))
}

/// Returns the kiosk ID when the token is well-formed, signed with `secret`
/// and not expired.
pub fn validate_kiosk_token(token: &str, secret: &str) -> Result<Uuid, AppError> {
    let decoded = URL_SAFE_NO_PAD
        .decode(token.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| AppError::Unauthorized("Invalid kiosk token format".to_string()))?;

    let parts: Vec<&str> = decoded.split(':').collect();
    let [purpose, kiosk_id, expiry, signature] = parts.as_slice() else {
        return Err(AppError::Unauthorized("Invalid kiosk token structure".to_string()));
    };

    if *purpose != PURPOSE {
        return Err(AppError::Unauthorized("Token is not a kiosk token".to_string()));
    }

    let payload = format!("{}:{}:{}", purpose, kiosk_id, expiry);
    let expected = sign(&payload, secret)?;
    if !bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
        return Err(AppError::Unauthorized("Invalid kiosk token signature".to_string()));
    }

    let expiry: i64 = expiry
        .parse()
        .map_err(|_| AppError::Unauthorized("Invalid expiry in kiosk token".to_string()))?;
    if Utc::now().timestamp() > expiry {
        return Err(AppError::Unauthorized("Kiosk token has expired".to_string()));
    }

    kiosk_id
        .parse()
        .map_err(|_| AppError::Unauthorized("Invalid kiosk ID in token".to_string()))
}

fn sign(data: &str, secret: &str) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(format!("HMAC initialization error: {}", e)))?;
    mac.update(data.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "kiosk_signing_secret_for_tests_0123456789";

    #[test]
    fn test_generate_and_validate() {
        let kiosk_id = Uuid::new_v4();
        let (token, expires_at) = generate_kiosk_token(kiosk_id, Duration::hours(1), SECRET).unwrap();
        assert!(expires_at > Utc::now());
        assert_eq!(validate_kiosk_token(&token, SECRET).unwrap(), kiosk_id);
    }

    #[test]
    fn test_token_is_url_safe() {
        let (token, _) = generate_kiosk_token(Uuid::new_v4(), Duration::hours(1), SECRET).unwrap();
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let (token, _) = generate_kiosk_token(Uuid::new_v4(), Duration::hours(1), SECRET).unwrap();
        assert!(validate_kiosk_token(&token, "another_secret_entirely_0123456789").is_err());
    }

    #[test]
    fn test_expired_rejected() {
        let (token, _) =
            generate_kiosk_token_at(Uuid::new_v4(), Utc::now() - Duration::minutes(1), SECRET).unwrap();
        let err = validate_kiosk_token(&token, SECRET).unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn test_tampered_kiosk_id_rejected() {
        let (token, _) = generate_kiosk_token(Uuid::new_v4(), Duration::hours(1), SECRET).unwrap();
        let decoded = String::from_utf8(URL_SAFE_NO_PAD.decode(&token).unwrap()).unwrap();
        let mut parts: Vec<String> = decoded.split(':').map(str::to_string).collect();
        parts[1] = Uuid::new_v4().to_string();
        let forged = URL_SAFE_NO_PAD.encode(parts.join(":"));
        assert!(validate_kiosk_token(&forged, SECRET).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(validate_kiosk_token("not-a-token", SECRET).is_err());
    }
}
