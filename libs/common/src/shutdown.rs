//! Graceful shutdown utilities

use tokio_util::sync::CancellationToken;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Wait for Ctrl+C, or SIGTERM on Unix
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term_signal = match signal(SignalKind::terminate()) {
            Ok(sig) => Some(sig),
            Err(e) => {
                warn!(
                    "Failed to install SIGTERM handler: {}. Service will only respond to Ctrl+C",
                    e
                );
                None
            },
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                match term_signal.as_mut() {
                    Some(sig) => { sig.recv().await; },
                    None => std::future::pending::<()>().await,
                }
            } => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Cancel `token` once a shutdown signal arrives
///
/// Background tasks and the HTTP server both watch the same token, so one
/// signal stops everything.
pub fn cancel_on_shutdown(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_shutdown() => {
                info!("Shutdown signal received");
                token.cancel();
            },
            _ = token.cancelled() => {},
        }
    })
}

/// Await a background task during shutdown, logging a panic or abort
///
/// Returns `false` when the task did not finish normally.
pub async fn join_background(name: &str, handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            error!("{} task failed: {}", name, e);
            false
        },
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[tokio::test]
    async fn test_cancel_on_shutdown_exits_when_token_cancelled() {
        let token = CancellationToken::new();
        let handle = cancel_on_shutdown(token.clone());
        token.cancel();
        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_join_background_reports_panicked_task() {
        let token = CancellationToken::new();
        let signal = cancel_on_shutdown(token.clone());
        token.cancel();
        assert!(join_background("Shutdown signal", signal).await);

        let crashed = tokio::spawn(async { panic!("boom") });
        assert!(!join_background("Periodic sync", crashed).await);
        assert!(logs_contain("Periodic sync task failed"));
    }
}
