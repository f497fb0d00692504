//! Certificate file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::net::tls::CertificateStore;

/// Quiet period after the last file event before reloading.
const DEBOUNCE: Duration = Duration::from_millis(300);

/// Reloads the certificate store whenever the certificate or key file
/// changes on disk.
pub struct CertificateWatcher {
    cert_path: PathBuf,
    key_path: PathBuf,
    store: Arc<CertificateStore>,
}

impl CertificateWatcher {
    pub fn new(cert_path: &Path, key_path: &Path, store: Arc<CertificateStore>) -> Self {
        Self {
            cert_path: cert_path.to_path_buf(),
            key_path: key_path.to_path_buf(),
            store,
        }
    }

    /// Start watching in the notifier's background thread.
    ///
    /// Events are debounced so that a certificate and key rewritten one
    /// after the other are loaded together. The returned watcher must be
    /// kept alive for as long as reloads are wanted.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let (tx, rx) = mpsc::channel::<()>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::debug!(paths = ?event.paths, "Certificate file event");
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!(error = %e, "Certificate watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.cert_path, RecursiveMode::NonRecursive)?;
        if self.key_path != self.cert_path {
            watcher.watch(&self.key_path, RecursiveMode::NonRecursive)?;
        }

        tracing::info!(cert = ?self.cert_path, key = ?self.key_path, "Certificate watcher started");
        thread::spawn(move || self.reload_loop(rx));
        Ok(watcher)
    }

    /// Runs until the watcher (and with it the sender) is dropped.
    fn reload_loop(self, rx: mpsc::Receiver<()>) {
        while rx.recv().is_ok() {
            loop {
                match rx.recv_timeout(DEBOUNCE) {
                    Ok(()) => continue,
                    Err(RecvTimeoutError::Timeout) => break,
                    Err(RecvTimeoutError::Disconnected) => return,
                }
            }

            tracing::info!("Certificate change detected, reloading");
            // Failure keeps the current pair and is already logged.
            let _ = self.store.load(&self.cert_path, &self.key_path);
        }
    }
}
