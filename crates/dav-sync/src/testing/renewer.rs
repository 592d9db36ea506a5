use async_trait::async_trait;
use dav_api::{ApiError, Credentials, SessionRenewer};
use std::sync::Mutex;
use std::time::Duration;

use super::lock;

/// A renewer that always answers the same way and records what it was sent
pub struct StaticRenewer {
    result: Result<Credentials, ApiError>,
    delay: Option<Duration>,
    received: Mutex<Vec<String>>,
}

impl StaticRenewer {
    pub fn succeeding(access_token: &str, refresh_token: Option<&str>) -> Self {
        Self::with_result(Ok(Credentials::new(
            access_token,
            refresh_token.map(str::to_string),
        )))
    }

    pub fn failing(error: ApiError) -> Self {
        Self::with_result(Err(error))
    }

    fn with_result(result: Result<Credentials, ApiError>) -> Self {
        Self {
            result,
            delay: None,
            received: Mutex::new(Vec::new()),
        }
    }

    /// Hold every renewal for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        lock(&self.received).len()
    }

    /// Refresh credentials received, in call order
    pub fn received(&self) -> Vec<String> {
        lock(&self.received).clone()
    }
}

#[async_trait]
impl SessionRenewer for StaticRenewer {
    async fn renew(&self, refresh_token: &str) -> Result<Credentials, ApiError> {
        lock(&self.received).push(refresh_token.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result.clone()
    }
}
