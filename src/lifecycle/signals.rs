//! OS signal handling.
//!
//! - SIGINT / SIGTERM: graceful shutdown
//! - SIGHUP: reload the certificate pair from disk (unix only)

use std::path::PathBuf;
use std::sync::Arc;

use crate::lifecycle::Shutdown;
use crate::net::tls::CertificateStore;

/// Resolve once SIGINT or SIGTERM is received.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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
    tracing::info!("Shutdown signal received");
}

/// Trigger `shutdown` on the first SIGINT/SIGTERM.
pub fn spawn_shutdown_listener(shutdown: Shutdown) {
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.trigger();
    });
}

/// Reload the certificate pair on every SIGHUP until shutdown.
#[cfg(unix)]
pub fn spawn_reload_listener(
    store: Arc<CertificateStore>,
    cert_path: PathBuf,
    key_path: PathBuf,
    shutdown: Shutdown,
) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for SIGHUP, certificate reload by signal disabled");
            return;
        }
    };
    let mut stop = shutdown.subscribe();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                received = hangup.recv() => {
                    if received.is_none() {
                        break;
                    }
                    tracing::info!("SIGHUP received, reloading certificate");
                    let store = store.clone();
                    let (cert, key) = (cert_path.clone(), key_path.clone());
                    // Blocking file I/O stays off the runtime threads.
                    let _ = tokio::task::spawn_blocking(move || store.load(&cert, &key)).await;
                }
                _ = stop.recv() => break,
            }
        }
    });
}

#[cfg(not(unix))]
pub fn spawn_reload_listener(
    _store: Arc<CertificateStore>,
    _cert_path: PathBuf,
    _key_path: PathBuf,
    _shutdown: Shutdown,
) {
}
