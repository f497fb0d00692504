//! Listen address parsing and primary TCP bind.
//!
//! # Responsibilities
//! - Resolve configured addresses, including the `:port` shorthand
//! - Bind the primary TCP socket before any secondary listener starts
//!
//! The socket is bound synchronously so the actual local address (and with
//! it the UDP port the QUIC listener must share) is known up front.

use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

use thiserror::Error;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum AddrError {
    /// The address could not be parsed or resolved.
    #[error("cannot resolve {addr:?}: {source}")]
    Resolve {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Resolution succeeded but produced no address.
    #[error("{0:?} resolved to no addresses")]
    Empty(String),

    /// Failed to bind to address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Parse a listen address.
///
/// A leading `:` (e.g. `:8080`) binds every IPv4 interface. Host names are
/// resolved and the first result is used.
pub fn parse_listen_addr(addr: &str) -> Result<SocketAddr, AddrError> {
    let addr = addr.trim();
    let full = if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    };

    if let Ok(parsed) = full.parse::<SocketAddr>() {
        return Ok(parsed);
    }

    full.to_socket_addrs()
        .map_err(|source| AddrError::Resolve {
            addr: addr.to_string(),
            source,
        })?
        .next()
        .ok_or_else(|| AddrError::Empty(addr.to_string()))
}

/// Bind the primary TCP listener in non-blocking mode, ready to be handed
/// to the async server.
pub fn bind_tcp(addr: SocketAddr) -> Result<TcpListener, AddrError> {
    let bind_err = |source| AddrError::Bind { addr, source };

    let listener = TcpListener::bind(addr).map_err(bind_err)?;
    listener.set_nonblocking(true).map_err(bind_err)?;

    tracing::info!(
        address = %listener.local_addr().map_err(bind_err)?,
        "Primary listener bound"
    );
    Ok(listener)
}
