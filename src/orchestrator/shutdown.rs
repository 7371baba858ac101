//! # OS termination signals.
//!
//! [`wait_for_shutdown_signal`] completes when the process receives a
//! termination signal; [`cancel_on_signal`] turns that into a cancelled
//! [`CancellationToken`] so a CI abort stops watchers at their next poll.
//!
//! **Unix:** `SIGINT`, `SIGTERM`, `SIGQUIT`. **Windows:** Ctrl-C.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Waits for a termination signal.
///
/// Returns `Err` if signal registration fails.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

/// Waits for a termination signal.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Cancels `token` on the first termination signal.
///
/// The returned task ends when the token is cancelled by anyone; abort it to
/// stop listening earlier.
pub fn cancel_on_signal(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            res = wait_for_shutdown_signal() => {
                match res {
                    Ok(()) => tracing::warn!("termination signal received, stopping deployment"),
                    Err(e) => {
                        tracing::warn!(error = %e, "cannot listen for termination signals");
                        return;
                    }
                }
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn listener_ends_with_the_token() {
        let token = CancellationToken::new();
        let handle = cancel_on_signal(token.clone());
        token.cancel();
        handle.await.unwrap();
    }
}
