use dav_api::ApiError;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::Session;

/// Wraps remote calls with at most one renewal-and-replay
///
/// The wrapped operation receives the credential to send. When the caller passes
/// an explicit credential it is used as-is and no renewal is attempted.
#[derive(Clone)]
pub struct CredentialGuard {
    session: Arc<Session>,
}

impl CredentialGuard {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Run `op`, renewing the session once if it reports an expired credential
    ///
    /// The replay result is returned as-is, so a second expiry surfaces to the caller.
    /// When renewal itself fails the original expiry error is returned; the
    /// renewal cause stays available through [`Session::last_renewal_failure`].
    pub async fn call<T, F, Fut>(&self, explicit: Option<&str>, op: F) -> Result<T, ApiError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        if let Some(credential) = explicit {
            return op(credential.to_string()).await;
        }

        let (credential, generation) = self.session.snapshot().await;
        match op(credential).await {
            Err(ApiError::AuthorizationExpired) => {
                debug!("[CredentialGuard] credential expired, renewing session");
                match self.session.renew_after(generation).await {
                    Ok(renewed) => op(renewed).await,
                    Err(e) => {
                        warn!("[CredentialGuard] renewal failed, surfacing expiry: {}", e);
                        debug!("[CredentialGuard] renewal failure cause: {:?}", e);
                        Err(ApiError::AuthorizationExpired)
                    }
                }
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticRenewer;
    use dav_api::Credentials;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn guard_with(renewer: Arc<StaticRenewer>) -> CredentialGuard {
        let session = Session::new(
            Credentials::new("stale", Some("refresh".to_string())),
            renewer,
        );
        CredentialGuard::new(Arc::new(session))
    }

    #[tokio::test]
    async fn test_expired_call_is_replayed_with_renewed_credential() {
        let renewer = Arc::new(StaticRenewer::succeeding("fresh", None));
        let guard = guard_with(renewer.clone());
        let seen = std::sync::Mutex::new(Vec::new());

        let result = guard
            .call(None, |credential| {
                seen.lock().unwrap().push(credential.clone());
                async move {
                    if credential == "fresh" {
                        Ok(42)
                    } else {
                        Err(ApiError::AuthorizationExpired)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(renewer.call_count(), 1);
        assert_eq!(*seen.lock().unwrap(), vec!["stale", "fresh"]);
    }

    #[tokio::test]
    async fn test_second_expiry_is_surfaced_without_another_renewal() {
        let renewer = Arc::new(StaticRenewer::succeeding("fresh", None));
        let guard = guard_with(renewer.clone());
        let attempts = AtomicUsize::new(0);

        let result: Result<(), ApiError> = guard
            .call(None, |_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::AuthorizationExpired) }
            })
            .await;

        assert_eq!(result, Err(ApiError::AuthorizationExpired));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(renewer.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_renewal_returns_original_expiry() {
        let renewer = Arc::new(StaticRenewer::failing(ApiError::Network(
            "offline".to_string(),
        )));
        let guard = guard_with(renewer.clone());
        let attempts = AtomicUsize::new(0);

        let result: Result<(), ApiError> = guard
            .call(None, |_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::AuthorizationExpired) }
            })
            .await;

        assert_eq!(result, Err(ApiError::AuthorizationExpired));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(guard.session().current_credential().await, "stale");
        assert_eq!(
            guard.session().last_renewal_failure().await,
            Some(ApiError::Network("offline".to_string()))
        );
    }

    #[tokio::test]
    async fn test_explicit_credential_never_renews() {
        let renewer = Arc::new(StaticRenewer::succeeding("fresh", None));
        let guard = guard_with(renewer.clone());

        let result: Result<String, ApiError> = guard
            .call(Some("explicit"), |credential| async move {
                assert_eq!(credential, "explicit");
                Err(ApiError::AuthorizationExpired)
            })
            .await;

        assert_eq!(result, Err(ApiError::AuthorizationExpired));
        assert_eq!(renewer.call_count(), 0);
    }

    #[tokio::test]
    async fn test_other_errors_pass_through() {
        let renewer = Arc::new(StaticRenewer::succeeding("fresh", None));
        let guard = guard_with(renewer.clone());

        let result: Result<(), ApiError> = guard
            .call(None, |_| async { Err(ApiError::NotFound("gone".to_string())) })
            .await;

        assert_eq!(result, Err(ApiError::NotFound("gone".to_string())));
        assert_eq!(renewer.call_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_expiries_share_one_renewal() {
        let renewer = Arc::new(
            StaticRenewer::succeeding("fresh", None).with_delay(Duration::from_millis(50)),
        );
        let guard = guard_with(renewer.clone());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let guard = guard.clone();
            handles.push(tokio::spawn(async move {
                guard
                    .call(None, |credential| async move {
                        if credential == "fresh" {
                            Ok(())
                        } else {
                            Err(ApiError::AuthorizationExpired)
                        }
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(()));
        }
        assert_eq!(renewer.call_count(), 1);
    }
}
