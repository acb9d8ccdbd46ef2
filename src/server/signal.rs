//! OS shutdown signal.

use std::future::Future;

use tracing::error;

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGINT** (Ctrl-C) and **SIGTERM** (sent
/// by orchestrators), and the handlers are installed when this function is
/// called, not when the future is first polled. On other platforms only
/// Ctrl-C is available. If a handler cannot be installed the failure is
/// logged and that arm never fires.
///
/// Must be called from within a tokio runtime.
pub fn shutdown_signal() -> impl Future<Output = ()> + Send + 'static {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let interrupt = listen(signal(SignalKind::interrupt()), "SIGINT");
        let terminate = listen(signal(SignalKind::terminate()), "SIGTERM");
        async move {
            tokio::select! {
                () = interrupt => {}
                () = terminate => {}
            }
        }
    }

    #[cfg(not(unix))]
    {
        async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to install Ctrl-C handler");
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(unix)]
fn listen(
    installed: std::io::Result<tokio::signal::unix::Signal>,
    name: &'static str,
) -> impl Future<Output = ()> + Send + 'static {
    let signal = match installed {
        Ok(signal) => Some(signal),
        Err(e) => {
            error!(error = %e, "failed to install {name} handler");
            None
        }
    };
    async move {
        match signal {
            Some(mut signal) => {
                signal.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
