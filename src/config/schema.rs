//! Configuration schema definitions.
//!
//! Keys are PascalCase to stay compatible with existing deployment files:
//!
//! ```toml
//! Certfile = "/etc/dualgate/fullchain.pem"
//! Keyfile = "/etc/dualgate/privkey.pem"
//! Listen = ":443"
//! MetricListenAddr = "127.0.0.1:9100"
//! AccessLogPath = "/var/log/dualgate/access.log"
//! ```
//!
//! Optional string settings treat the empty string as "unset".

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Root configuration for the front door.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ServerConfig {
    /// Path to the PEM certificate chain. Empty disables TLS and QUIC.
    pub certfile: String,

    /// Path to the PEM private key matching `certfile`.
    pub keyfile: String,

    /// Listen address shared by the TCP and UDP listeners (e.g. ":8080").
    pub listen: String,

    /// Bind address of the `/metrics` endpoint. Empty disables it.
    pub metric_listen_addr: String,

    /// Access log file. Empty writes to stdout.
    pub access_log_path: String,

    /// Directory served by the default application handler.
    pub root: String,

    /// Log level used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            certfile: String::new(),
            keyfile: String::new(),
            listen: ":8080".to_string(),
            metric_listen_addr: String::new(),
            access_log_path: "access.log".to_string(),
            root: "public".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Certificate and key paths, if both are configured.
    pub fn tls_paths(&self) -> Option<(&Path, &Path)> {
        if self.certfile.is_empty() || self.keyfile.is_empty() {
            return None;
        }
        Some((Path::new(&self.certfile), Path::new(&self.keyfile)))
    }

    /// Whether the TLS and QUIC listeners will be started.
    pub fn tls_enabled(&self) -> bool {
        self.tls_paths().is_some()
    }

    pub fn access_log_path(&self) -> Option<&Path> {
        non_empty(&self.access_log_path).map(Path::new)
    }

    pub fn metric_listen_addr(&self) -> Option<&str> {
        non_empty(&self.metric_listen_addr)
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}
