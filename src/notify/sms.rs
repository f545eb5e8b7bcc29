use async_trait::async_trait;
use serde_json::json;

use crate::AppError;

#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<(), AppError>;
}

/// Posts `{to, body}` to an SMS gateway webhook.
pub struct HttpSmsSender {
    client: reqwest::Client,
    webhook_url: String,
    api_key: Option<String>,
}

impl HttpSmsSender {
    pub fn new(webhook_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url,
            api_key,
        }
    }
}

#[async_trait]
impl SmsSender for HttpSmsSender {
    async fn send(&self, to: &str, body: &str) -> Result<(), AppError> {
        let mut request = self.client.post(&self.webhook_url).json(&json!({ "to": to, "body": body }));
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, "SMS gateway request failed");
            AppError::Internal(format!("SMS gateway request failed: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = text, "SMS gateway returned error");
            return Err(AppError::Internal(format!("SMS gateway returned {}", status)));
        }

        Ok(())
    }
}

/// Used when no gateway is configured.
pub struct LogSmsSender;

#[async_trait]
impl SmsSender for LogSmsSender {
    async fn send(&self, to: &str, body: &str) -> Result<(), AppError> {
        tracing::info!(to, body, "SMS (no gateway configured)");
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records every message; fails for numbers listed in `failing`.
    #[derive(Default)]
    pub struct RecordingSmsSender {
        pub sent: Mutex<Vec<(String, String)>>,
        pub failing: Vec<String>,
    }

    #[async_trait]
    impl SmsSender for RecordingSmsSender {
        async fn send(&self, to: &str, body: &str) -> Result<(), AppError> {
            if self.failing.iter().any(|n| n == to) {
                return Err(AppError::Internal("gateway down".to_string()));
            }
            self.sent.lock().unwrap().push((to.to_string(), body.to_string()));
            Ok(())
        }
    }
}
