use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::{AppError, AppResult};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClerkClaims {
    pub sub: String,  // Clerk user ID (user_xxx)
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
    pub azp: Option<String>,
    /// Present only when the session token template includes it
    #[serde(default)]
    pub email: Option<String>,
}

const JWKS_KEY: &str = "jwks";

/// Caches the Clerk JWKS for an hour. An unknown `kid` forces one refetch so
/// rotated keys are picked up without waiting for the TTL.
pub struct JwksCache {
    cache: Cache<&'static str, Arc<JwkSet>>,
    jwks_url: String,
    client: reqwest::Client,
}

impl JwksCache {
    pub fn new(clerk_domain: &str) -> Self {
        Self {
            cache: Cache::builder().time_to_live(Duration::from_secs(3600)).build(),
            jwks_url: format!("https://{}/.well-known/jwks.json", clerk_domain),
            client: reqwest::Client::new(),
        }
    }

    async fn fetch(&self) -> AppResult<Arc<JwkSet>> {
        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to fetch JWKS: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Internal(format!("JWKS endpoint returned {}", response.status())));
        }

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to parse JWKS: {}", e)))?;

        let jwks = Arc::new(jwks);
        self.cache.insert(JWKS_KEY, jwks.clone()).await;
        tracing::debug!(keys = jwks.keys.len(), "JWKS refreshed");
        Ok(jwks)
    }

    pub async fn decoding_key(&self, kid: &str) -> AppResult<DecodingKey> {
        let cached = self.cache.get(&JWKS_KEY).await;
        let jwks = match cached {
            Some(jwks) if jwks.find(kid).is_some() => jwks,
            _ => self.fetch().await?,
        };

        let jwk = jwks
            .find(kid)
            .ok_or_else(|| AppError::Unauthorized(format!("No key found with kid: {}", kid)))?;

        DecodingKey::from_jwk(jwk)
            .map_err(|e| AppError::Internal(format!("Failed to create decoding key: {}", e)))
    }
}

pub async fn validate_jwt(token: &str, jwks_cache: &JwksCache, expected_issuer: &str) -> AppResult<ClerkClaims> {
    let header = decode_header(token)
        .map_err(|e| AppError::Unauthorized(format!("Failed to decode JWT header: {}", e)))?;
    let kid = header
        .kid
        .ok_or_else(|| AppError::Unauthorized("Missing kid in JWT header".to_string()))?;

    let decoding_key = jwks_cache.decoding_key(&kid).await?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_issuer(&[expected_issuer]);
    validation.validate_exp = true;

    decode::<ClerkClaims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| AppError::Unauthorized(format!("JWT validation failed: {}", e)))
}

/// Primary email of a Clerk user, via the backend API.
pub async fn fetch_primary_email(clerk_user_id: &str, clerk_secret_key: &str) -> AppResult<String> {
    let url = format!("https://api.clerk.com/v1/users/{}", clerk_user_id);
    let response = reqwest::Client::new()
        .get(&url)
        .header("Authorization", format!("Bearer {}", clerk_secret_key))
        .send()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, clerk_user_id, "Clerk API request failed");
            AppError::Internal(format!("Clerk API request failed: {}", e))
        })?;

    if !response.status().is_success() {
        let status = response.status();
        tracing::error!(status = %status, clerk_user_id, "Clerk API returned error");
        return Err(AppError::Internal(format!("Clerk API returned {}", status)));
    }

    let user: serde_json::Value = response
        .json()
        .await
        .map_err(|e| AppError::Internal(format!("Failed to parse Clerk response: {}", e)))?;

    primary_email_from_user(&user)
        .ok_or_else(|| AppError::Internal(format!("No primary email found for user {}", clerk_user_id)))
}

fn primary_email_from_user(user: &serde_json::Value) -> Option<String> {
    let addresses = user.get("email_addresses")?.as_array()?;
    addresses
        .iter()
        .find(|e| e.get("id") == user.get("primary_email_address_id"))
        .or_else(|| addresses.first())
        .and_then(|e| e.get("email_address"))
        .and_then(|e| e.as_str())
        .map(str::to_string)
}
