use dav_api::{ApiError, Credentials, SessionRenewer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// The process-wide session held by the credential guard
///
/// Every successful renewal bumps `generation` while holding the credentials
/// write lock, so a `(credential, generation)` snapshot is always consistent.
/// Renewals are serialized through `renewal`, which also keeps the cause of the
/// last failed renewal. A caller that observed an older generation than the
/// current one reuses the newer credential instead of renewing.
pub struct Session {
    credentials: RwLock<Credentials>,
    generation: AtomicU64,
    renewal: Mutex<Option<ApiError>>,
    renewer: Arc<dyn SessionRenewer>,
    renewals: AtomicU64,
    failed_renewals: AtomicU64,
}

impl Session {
    pub fn new(credentials: Credentials, renewer: Arc<dyn SessionRenewer>) -> Self {
        Self {
            credentials: RwLock::new(credentials),
            generation: AtomicU64::new(0),
            renewal: Mutex::new(None),
            renewer,
            renewals: AtomicU64::new(0),
            failed_renewals: AtomicU64::new(0),
        }
    }

    /// The access credential sent with ambient-session calls
    pub async fn current_credential(&self) -> String {
        self.credentials.read().await.access_token.clone()
    }

    pub async fn credentials(&self) -> Credentials {
        self.credentials.read().await.clone()
    }

    /// Current access credential together with the generation it belongs to
    pub async fn snapshot(&self) -> (String, u64) {
        let credentials = self.credentials.read().await;
        (
            credentials.access_token.clone(),
            self.generation.load(Ordering::SeqCst),
        )
    }

    /// Number of renewal exchanges actually sent to the renewer
    pub fn renewal_count(&self) -> u64 {
        self.renewals.load(Ordering::SeqCst)
    }

    /// Number of renewals that failed, including those without a refresh credential
    pub fn renewal_failure_count(&self) -> u64 {
        self.failed_renewals.load(Ordering::SeqCst)
    }

    /// Cause of the most recent failed renewal
    pub async fn last_renewal_failure(&self) -> Option<ApiError> {
        self.renewal.lock().await.clone()
    }

    /// Replace the credentials wholesale (e.g. after a fresh login)
    pub async fn replace(&self, credentials: Credentials) {
        let mut current = self.credentials.write().await;
        *current = credentials;
        self.generation.fetch_add(1, Ordering::SeqCst);
        info!("[Session] credentials replaced");
    }

    /// Renew the session unless someone already did so after `observed_generation`
    ///
    /// Returns the access credential to replay with.
    pub async fn renew_after(&self, observed_generation: u64) -> Result<String, ApiError> {
        let mut last_failure = self.renewal.lock().await;

        let refresh_token = {
            let credentials = self.credentials.read().await;
            if self.generation.load(Ordering::SeqCst) != observed_generation {
                debug!("[Session] renewal already completed by a concurrent caller");
                return Ok(credentials.access_token.clone());
            }
            credentials.refresh_token.clone()
        };

        let Some(refresh_token) = refresh_token else {
            warn!("[Session] credential expired and no refresh credential is available");
            self.failed_renewals.fetch_add(1, Ordering::SeqCst);
            *last_failure = Some(ApiError::AuthorizationExpired);
            return Err(ApiError::AuthorizationExpired);
        };

        self.renewals.fetch_add(1, Ordering::SeqCst);
        let renewed = match self.renewer.renew(&refresh_token).await {
            Ok(renewed) => renewed,
            Err(e) => {
                warn!("[Session] renewal failed: {}", e);
                self.failed_renewals.fetch_add(1, Ordering::SeqCst);
                *last_failure = Some(e.clone());
                return Err(e);
            }
        };

        let mut credentials = self.credentials.write().await;
        credentials.access_token = renewed.access_token;
        if let Some(refresh_token) = renewed.refresh_token {
            credentials.refresh_token = Some(refresh_token);
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!("[Session] session renewed (generation {})", generation);
        Ok(credentials.access_token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticRenewer;

    #[tokio::test]
    async fn test_renewal_replaces_ambient_credential() {
        let renewer = Arc::new(StaticRenewer::succeeding("fresh", Some("refresh-2")));
        let session = Session::new(
            Credentials::new("stale", Some("refresh-1".to_string())),
            renewer.clone(),
        );

        let (_, generation) = session.snapshot().await;
        let credential = session.renew_after(generation).await.unwrap();

        assert_eq!(credential, "fresh");
        assert_eq!(session.current_credential().await, "fresh");
        assert_eq!(
            session.credentials().await.refresh_token.as_deref(),
            Some("refresh-2")
        );
        assert_eq!(renewer.received(), vec!["refresh-1".to_string()]);
    }

    #[tokio::test]
    async fn test_stale_generation_reuses_newer_credential() {
        let renewer = Arc::new(StaticRenewer::succeeding("fresh", None));
        let session = Session::new(
            Credentials::new("stale", Some("refresh".to_string())),
            renewer.clone(),
        );

        let (_, generation) = session.snapshot().await;
        session.renew_after(generation).await.unwrap();
        let second = session.renew_after(generation).await.unwrap();

        assert_eq!(second, "fresh");
        assert_eq!(session.renewal_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_refresh_credential_fails_without_renewing() {
        let renewer = Arc::new(StaticRenewer::succeeding("fresh", None));
        let session = Session::new(Credentials::new("stale", None), renewer.clone());

        let result = session.renew_after(0).await;

        assert_eq!(result, Err(ApiError::AuthorizationExpired));
        assert_eq!(session.renewal_count(), 0);
        assert_eq!(session.renewal_failure_count(), 1);
        assert_eq!(session.current_credential().await, "stale");
    }

    #[tokio::test]
    async fn test_failed_renewal_keeps_its_cause() {
        let renewer = Arc::new(StaticRenewer::failing(ApiError::Network(
            "dns lookup failed".to_string(),
        )));
        let session = Session::new(
            Credentials::new("stale", Some("refresh".to_string())),
            renewer,
        );
        assert_eq!(session.last_renewal_failure().await, None);

        let result = session.renew_after(0).await;

        assert_eq!(
            result,
            Err(ApiError::Network("dns lookup failed".to_string()))
        );
        assert_eq!(session.renewal_failure_count(), 1);
        assert_eq!(
            session.last_renewal_failure().await,
            Some(ApiError::Network("dns lookup failed".to_string()))
        );
    }
}
