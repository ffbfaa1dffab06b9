use std::time::Duration;

use tokio::signal;

use crate::services::grader::GraderService;

pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

/// Longest time shutdown waits for the in-flight item of a cancelled run.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Waits for a termination signal, then stops any running batch after its
/// current item.
pub(crate) async fn graceful(grader: GraderService) {
    shutdown_signal().await;
    drain(&grader, DRAIN_TIMEOUT).await;
}

/// Cancels the active run and waits up to `grace` for it to settle. Returns
/// false when the run was still going at the deadline.
pub(crate) async fn drain(grader: &GraderService, grace: Duration) -> bool {
    if !grader.cancel_batch() {
        return true;
    }
    tracing::info!("Running grading batch asked to stop before shutdown");

    match tokio::time::timeout(grace, grader.wait_until_idle()).await {
        Ok(()) => {
            tracing::info!("Grading run settled before shutdown");
            true
        }
        Err(_) => {
            tracing::warn!(
                grace_seconds = grace.as_secs_f64(),
                "Grading run still active at shutdown; in-flight item abandoned"
            );
            false
        }
    }
}
