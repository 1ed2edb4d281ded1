//! Client-side retry helper for `find_actor`/`register_actor` (spec.md §5).
//!
//! Wraps a leader-routed call: retries only on `LeaderNotFound`, up to
//! `ClientConfig::retry_attempts` times with `retry_backoff` between tries,
//! each attempt bounded by `call_timeout`. Every other error — including a
//! timeout — is returned to the caller immediately.

use std::future::Future;

use tokio::time::{sleep, timeout};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{ClusterError, Result};

pub async fn call_with_retry<T, F, Fut>(config: &ClientConfig, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut tries_left = config.retry_attempts;
    loop {
        let outcome = match timeout(config.call_timeout, attempt()).await {
            Ok(result) => result,
            Err(_) => Err(ClusterError::RpcError("call timed out".to_string())),
        };

        match outcome {
            Err(ClusterError::LeaderNotFound(service)) if tries_left > 0 => {
                tries_left -= 1;
                debug!(%service, tries_left, "leader not found, retrying after backoff");
                sleep(config.retry_backoff).await;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ServiceId;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast_config(attempts: u32) -> ClientConfig {
        ClientConfig {
            call_timeout: Duration::from_secs(5),
            retry_backoff: Duration::from_millis(1),
            retry_attempts: attempts,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_first_try_without_retrying() {
        let calls = AtomicU32::new(0);
        let result = call_with_retry(&fast_config(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, ClusterError>(42) }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_leader_not_found_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = call_with_retry(&fast_config(5), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ClusterError::LeaderNotFound(ServiceId::new("svc")))
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_exhausting_retries() {
        let result = call_with_retry(&fast_config(2), || async {
            Err::<(), _>(ClusterError::LeaderNotFound(ServiceId::new("svc")))
        })
        .await;
        assert_eq!(result, Err(ClusterError::LeaderNotFound(ServiceId::new("svc"))));
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result = call_with_retry(&fast_config(5), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(ClusterError::ActorNotFound) }
        })
        .await;
        assert_eq!(result, Err(ClusterError::ActorNotFound));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
