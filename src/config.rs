use chrono_tz::Tz;
use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub cors_origin: String,
    pub clerk_secret_key: String,
    pub clerk_publishable_key: String,
    pub clerk_domain: String,
    pub debug_key: String,
    pub token_signing_secret: String,
    pub default_timezone: Tz,
    pub auto_close_scan_interval: Duration,
    pub sms_webhook_url: Option<String>,
    pub sms_api_key: Option<String>,
    pub kiosk_base_url: String,
    pub kiosk_token_ttl_hours: i64,
    pub invitation_ttl_hours: i64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL must be set".to_string())?;

        let clerk_secret_key = env::var("CLERK_SECRET_KEY")
            .map_err(|_| "CLERK_SECRET_KEY must be set".to_string())?;

        let clerk_publishable_key = env::var("VITE_CLERK_PUBLISHABLE_KEY")
            .map_err(|_| "VITE_CLERK_PUBLISHABLE_KEY must be set".to_string())?;

        // Format: pk_test_xxx or pk_live_xxx
        let clerk_domain = extract_clerk_domain(&clerk_publishable_key)?;

        let debug_key = env::var("DEBUG_KEY")
            .map_err(|_| "DEBUG_KEY must be set".to_string())?;

        let token_signing_secret = env::var("TOKEN_SIGNING_SECRET")
            .map_err(|_| "TOKEN_SIGNING_SECRET must be set".to_string())?;
        if token_signing_secret.len() < 32 {
            return Err("TOKEN_SIGNING_SECRET must be at least 32 characters".to_string());
        }

        let default_timezone = parse_timezone(
            &env::var("DEFAULT_TIMEZONE").unwrap_or_else(|_| "America/New_York".to_string()),
        )?;

        let auto_close_scan_secs: u64 = parse_or("AUTO_CLOSE_SCAN_SECS", 60)?;
        if auto_close_scan_secs == 0 {
            return Err("AUTO_CLOSE_SCAN_SECS must be positive".to_string());
        }

        Ok(Self {
            database_url,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            cors_origin: env::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string()),
            clerk_secret_key,
            clerk_publishable_key,
            clerk_domain,
            debug_key,
            token_signing_secret,
            default_timezone,
            auto_close_scan_interval: Duration::from_secs(auto_close_scan_secs),
            sms_webhook_url: env::var("SMS_WEBHOOK_URL").ok().filter(|v| !v.is_empty()),
            sms_api_key: env::var("SMS_API_KEY").ok().filter(|v| !v.is_empty()),
            kiosk_base_url: env::var("KIOSK_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000/kiosk".to_string()),
            kiosk_token_ttl_hours: parse_or("KIOSK_TOKEN_TTL_HOURS", 720)?,
            invitation_ttl_hours: parse_or("INVITATION_TTL_HOURS", 168)?,
        })
    }
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, String> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| format!("{} has an invalid value: {}", name, raw)),
        Err(_) => Ok(default),
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz, String> {
    name.parse::<Tz>()
        .map_err(|_| format!("Unknown timezone: {}", name))
}

fn extract_clerk_domain(publishable_key: &str) -> Result<String, String> {
    let encoded = publishable_key
        .strip_prefix("pk_test_")
        .or_else(|| publishable_key.strip_prefix("pk_live_"))
        .ok_or("Invalid Clerk publishable key format")?;

    // The frontend API domain is base64-encoded in the key, terminated by '$'
    let decoded = base64_decode(encoded)
        .map_err(|_| "Failed to decode Clerk domain")?;

    let domain = std::str::from_utf8(&decoded)
        .map_err(|_| "Invalid UTF-8 in Clerk domain")?
        .trim_end_matches('$')
        .to_string();

    Ok(domain)
}

fn base64_decode(input: &str) -> Result<Vec<u8>, String> {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    STANDARD.decode(input).map_err(|e| format!("Base64 decode error: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_clerk_domain() {
        // "clerk.example.com$"
        let key = "pk_test_Y2xlcmsuZXhhbXBsZS5jb20k";
        assert_eq!(extract_clerk_domain(key).unwrap(), "clerk.example.com");
        assert!(extract_clerk_domain("sk_test_abc").is_err());
    }

    #[test]
    fn test_parse_timezone() {
        assert_eq!(parse_timezone("America/Sao_Paulo").unwrap(), chrono_tz::America::Sao_Paulo);
        assert!(parse_timezone("Mars/Olympus").is_err());
    }
}
