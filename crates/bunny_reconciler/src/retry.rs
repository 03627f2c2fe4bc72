//! Retry Policy für die App-Lifecycle-Kommandos
//!
//! Nur stop_app, join_cluster, start_app und die Reset-Sequenz laufen mit
//! Retries; alle anderen Kommandos werden genau einmal ausgeführt.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::ctl::CommandError;
use crate::ConvergeError;

/// Fixe Anzahl Versuche und fixe (nicht-exponentielle) Pause dazwischen.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

/// Retry-Budget der App-Lifecycle-Schritte: 3 Versuche, 3 Sekunden Pause.
pub const APP_STEP_RETRY: RetryPolicy = RetryPolicy {
    attempts: 3,
    delay: Duration::from_secs(3),
};

/// Führt einen Schritt mit dem gegebenen Retry-Budget aus.
///
/// Zwischen den Versuchen wird die fixe Pause gewartet. Nach dem letzten
/// fehlgeschlagenen Versuch wird `RetriesExhausted` zurückgegeben.
pub async fn run_with_retry<T, F, Fut>(
    policy: RetryPolicy,
    step: &str,
    mut op: F,
) -> Result<T, ConvergeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CommandError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < policy.attempts => {
                warn!(step, attempt, %error, "step failed, retrying after delay");
                sleep(policy.delay).await;
                attempt += 1;
            }
            Err(error) => {
                return Err(ConvergeError::RetriesExhausted {
                    step: step.to_string(),
                    attempts: policy.attempts,
                    source: error,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn injected_failure(step: &str) -> CommandError {
        CommandError::Failed {
            command: step.to_string(),
            code: Some(69),
            stderr: "injected".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt() {
        let calls = AtomicU32::new(0);

        let result = run_with_retry(APP_STEP_RETRY, "stop_app", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, CommandError>(()) }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);

        let result = run_with_retry(APP_STEP_RETRY, "stop_app", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(injected_failure("stop_app"))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_after_exactly_three_attempts() {
        let calls = AtomicU32::new(0);

        let result = run_with_retry(APP_STEP_RETRY, "join_cluster", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(injected_failure("join_cluster")) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(ConvergeError::RetriesExhausted { step, attempts, .. }) => {
                assert_eq!(step, "join_cluster");
                assert_eq!(attempts, 3);
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(()) => panic!("expected retry exhaustion"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_between_attempts() {
        let start = tokio::time::Instant::now();

        let _ = run_with_retry(APP_STEP_RETRY, "start_app", || async {
            Err::<(), _>(injected_failure("start_app"))
        })
        .await;

        // 3 Versuche -> 2 Pausen à 3 Sekunden
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }
}
