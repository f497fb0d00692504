//! QUIC/HTTP3 listener.
//!
//! Accepts QUIC connections on the UDP side of the listen address,
//! negotiates HTTP/3 and dispatches every request stream into the same
//! instrumented router the TCP listener serves.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use axum::body::{Body, HttpBody};
use axum::extract::ConnectInfo;
use axum::http::{Request, Response};
use axum::Router;
use bytes::{Buf, Bytes};
use h3::error::StreamError;
use h3::server::RequestStream;
use http_body::{Frame, SizeHint};
use http_body_util::BodyExt;
use quinn::Endpoint;
use thiserror::Error;
use tokio::sync::broadcast;
use tower::ServiceExt;
use tracing::{debug, info, warn};

use crate::net::tls::{CertificateStore, TlsError};

/// Error type for the QUIC listener.
#[derive(Debug, Error)]
pub enum QuicError {
    #[error("tls setup: {0}")]
    Tls(#[from] TlsError),

    #[error("failed to bind udp {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("connection: {0}")]
    Connection(#[from] quinn::ConnectionError),

    #[error("http/3: {0}")]
    Http3(String),

    #[error("response body: {0}")]
    Body(#[from] axum::Error),

    #[error("endpoint closed without a shutdown signal")]
    EndpointClosed,
}

fn h3_err(e: impl std::fmt::Display) -> QuicError {
    QuicError::Http3(e.to_string())
}

/// The secondary, best-effort HTTP/3 listener.
pub struct QuicListener {
    endpoint: Endpoint,
    service: Router,
}

impl QuicListener {
    /// Bind the UDP socket and build the QUIC endpoint.
    pub fn bind(
        addr: SocketAddr,
        certs: &Arc<CertificateStore>,
        service: Router,
    ) -> Result<Self, QuicError> {
        let server_config = certs.quic_server_config()?;
        let endpoint = Endpoint::server(server_config, addr)
            .map_err(|source| QuicError::Bind { addr, source })?;

        info!(address = %addr, "QUIC listener bound");
        Ok(Self { endpoint, service })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.endpoint.local_addr()
    }

    /// Accept connections until shutdown. An endpoint that closes on its own
    /// is reported as [`QuicError::EndpointClosed`].
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<(), QuicError> {
        loop {
            tokio::select! {
                incoming = self.endpoint.accept() => {
                    let Some(incoming) = incoming else {
                        return Err(QuicError::EndpointClosed);
                    };
                    let service = self.service.clone();
                    tokio::spawn(async move {
                        let remote = incoming.remote_address();
                        if let Err(e) = handle_connection(incoming, service).await {
                            debug!(peer_addr = %remote, error = %e, "QUIC connection ended with error");
                        }
                    });
                }
                _ = shutdown.recv() => {
                    info!("Shutdown signal received, closing QUIC listener");
                    self.endpoint.close(0u32.into(), b"shutdown");
                    break;
                }
            }
        }

        self.endpoint.wait_idle().await;
        info!("QUIC listener stopped");
        Ok(())
    }
}

async fn handle_connection(incoming: quinn::Incoming, service: Router) -> Result<(), QuicError> {
    let remote = incoming.remote_address();
    let connection = incoming.await?;
    debug!(peer_addr = %remote, "QUIC connection established");

    let mut h3: h3::server::Connection<h3_quinn::Connection, Bytes> =
        h3::server::Connection::new(h3_quinn::Connection::new(connection))
            .await
            .map_err(h3_err)?;

    loop {
        match h3.accept().await {
            Ok(Some(resolver)) => {
                let service = service.clone();
                tokio::spawn(async move {
                    let result = match resolver.resolve_request().await {
                        Ok((request, stream)) => serve_request(request, stream, remote, service).await,
                        Err(e) => Err(h3_err(e)),
                    };
                    if let Err(e) = result {
                        warn!(peer_addr = %remote, error = %e, "HTTP/3 request failed");
                    }
                });
            }
            Ok(None) => break,
            Err(e) => {
                debug!(peer_addr = %remote, error = %e, "HTTP/3 connection closed");
                break;
            }
        }
    }

    Ok(())
}

type QuicRequestStream = RequestStream<h3_quinn::BidiStream<Bytes>, Bytes>;

async fn serve_request(
    request: Request<()>,
    stream: QuicRequestStream,
    remote: SocketAddr,
    service: Router,
) -> Result<(), QuicError> {
    let (mut send, recv) = stream.split();

    let (mut parts, ()) = request.into_parts();
    parts.extensions.insert(ConnectInfo(remote));
    let request = Request::from_parts(parts, Body::new(RequestBody::new(recv)));

    let response = service
        .oneshot(request)
        .await
        .unwrap_or_else(|never: Infallible| match never {});

    let (parts, mut body) = response.into_parts();
    send.send_response(Response::from_parts(parts, ()))
        .await
        .map_err(h3_err)?;

    while let Some(frame) = body.frame().await {
        if let Ok(data) = frame?.into_data() {
            send.send_data(data).await.map_err(h3_err)?;
        }
    }

    send.finish().await.map_err(h3_err)?;
    Ok(())
}

/// Request body read from the HTTP/3 stream as the handler polls it.
///
/// Nothing is buffered ahead of the handler, so body size limits are
/// enforced by whatever consumes the body, and QUIC flow control throttles
/// the client in the meantime.
struct RequestBody {
    recv: Box<RequestStream<h3_quinn::RecvStream, Bytes>>,
    finished: bool,
}

impl RequestBody {
    fn new(recv: RequestStream<h3_quinn::RecvStream, Bytes>) -> Self {
        Self {
            recv: Box::new(recv),
            finished: false,
        }
    }
}

impl HttpBody for RequestBody {
    type Data = Bytes;
    type Error = StreamError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, StreamError>>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        match ready!(this.recv.poll_recv_data(cx)) {
            Ok(Some(mut chunk)) => {
                let data = chunk.copy_to_bytes(chunk.remaining());
                Poll::Ready(Some(Ok(Frame::data(data))))
            }
            Ok(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Err(e) => {
                this.finished = true;
                Poll::Ready(Some(Err(e)))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.finished
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::default()
    }
}
