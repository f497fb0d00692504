//! dualgate: serve one application over HTTPS and HTTP/3.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌───────────────────────────────────────────────┐
//!                         │                   DUALGATE                    │
//!                         │                                               │
//!   TCP :port  ───────────┼─▶ axum-server (TLS or plain) ──┐              │
//!   (primary, fatal)      │                                │              │
//!                         │                                ▼              │
//!                         │                        instrumentation ──▶ app│
//!                         │                                ▲   │          │
//!   UDP :port  ───────────┼─▶ quinn + h3 ──────────────────┘   │          │
//!   (secondary, best      │                                    ▼          │
//!    effort)              │                   access log + /metrics       │
//!                         │                                               │
//!                         │  CertificateStore ◀── notify watcher, SIGHUP  │
//!                         └───────────────────────────────────────────────┘
//! ```
//!
//! The process runs for exactly as long as the primary listener does.

use std::path::PathBuf;

use clap::Parser;

use dualgate::config::load_config;
use dualgate::lifecycle::signals;
use dualgate::observability::logging;
use dualgate::{app, DualServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "dualgate", version, about = "HTTPS and HTTP/3 front door")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "dualgate.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            tracing::error!(path = %cli.config.display(), error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    logging::init(&config.log_level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.listen,
        tls = config.tls_enabled(),
        "dualgate starting"
    );

    let handler = app::build_handler(&config);
    let server = DualServer::new(config, handler)?;

    let shutdown = Shutdown::new();
    signals::spawn_shutdown_listener(shutdown.clone());

    server.run(shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
