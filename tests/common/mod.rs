//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::fs;
use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use bytes::{BufMut, Bytes, BytesMut};
use dualgate::http::ServerContext;
use dualgate::lifecycle::{ServerState, StateHandle};
use dualgate::{DualServer, ServerConfig, ServerError, Shutdown};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tokio::task::JoinHandle;

/// A port that was free on loopback a moment ago.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub struct Pair {
    pub cert: PathBuf,
    pub key: PathBuf,
    pub der: Vec<u8>,
}

/// Write a self-signed localhost certificate pair into `dir`.
pub fn write_self_signed(dir: &Path, name: &str) -> Pair {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let pair = Pair {
        cert: dir.join(format!("{name}.crt")),
        key: dir.join(format!("{name}.key")),
        der: cert.der().to_vec(),
    };
    fs::write(&pair.cert, cert.pem()).unwrap();
    fs::write(&pair.key, key_pair.serialize_pem()).unwrap();
    pair
}

pub fn client() -> reqwest::Client {
    let _ = rustls::crypto::ring::default_provider().install_default();
    reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

pub struct Running {
    pub addr: SocketAddr,
    pub state: StateHandle,
    pub context: Arc<ServerContext>,
    pub shutdown: Shutdown,
    pub task: JoinHandle<Result<(), ServerError>>,
}

impl Running {
    pub async fn stop(self) -> Result<(), ServerError> {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(15), self.task)
            .await
            .unwrap()
            .unwrap()
    }
}

/// Start a server on `config.listen` and wait until it is up.
pub async fn start(config: ServerConfig, handler: Router) -> Running {
    let addr: SocketAddr = config.listen.parse().unwrap();
    let server = DualServer::new(config, handler).unwrap();
    let state = server.state();
    let context = server.context().clone();
    let shutdown = Shutdown::new();
    let task = tokio::spawn(server.run(shutdown.clone()));

    within(state.wait_for(|s| {
        matches!(s, ServerState::Serving | ServerState::Degraded | ServerState::Stopped)
    }))
    .await;

    Running {
        addr,
        state,
        context,
        shutdown,
        task,
    }
}

pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(10), future)
        .await
        .unwrap()
}

/// GET `url`, retrying while the listener is still coming up.
pub async fn get_eventually(client: &reqwest::Client, url: &str) -> reqwest::Response {
    for _ in 0..50 {
        if let Ok(response) = client.get(url).send().await {
            return response;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("{url} never answered");
}

pub fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

/// Read the access log until it has `count` lines. Lines are written once
/// the server finishes a response body, which can trail the client.
pub async fn wait_for_lines(path: &Path, count: usize) -> Vec<String> {
    for _ in 0..50 {
        let lines = read_lines(path);
        if lines.len() >= count {
            return lines;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    read_lines(path)
}

/// Accepts any server certificate; test servers are self-signed.
#[derive(Debug)]
struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

pub struct H3Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Send one HTTP/3 request to `addr` over a fresh QUIC connection.
pub async fn h3_request(addr: SocketAddr, method: Method, path: &str, body: Bytes) -> H3Response {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut tls = rustls::ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .unwrap()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
        .with_no_client_auth();
    tls.alpn_protocols = vec![b"h3".to_vec()];

    let crypto = quinn::crypto::rustls::QuicClientConfig::try_from(tls).unwrap();
    let endpoint = quinn::Endpoint::client("127.0.0.1:0".parse().unwrap()).unwrap();
    let connection = endpoint
        .connect_with(quinn::ClientConfig::new(Arc::new(crypto)), addr, "localhost")
        .unwrap()
        .await
        .unwrap();

    let (mut driver, mut sender) = h3::client::new(h3_quinn::Connection::new(connection))
        .await
        .unwrap();
    let drive = tokio::spawn(async move {
        let _ = std::future::poll_fn(|cx| driver.poll_close(cx)).await;
    });

    let request = Request::builder()
        .method(method)
        .uri(format!("https://localhost:{}{path}", addr.port()))
        .header(header::USER_AGENT, "dualgate-h3-test")
        .body(())
        .unwrap();
    let (mut upload, mut download) = sender.send_request(request).await.unwrap().split();

    // The server may answer before reading the whole body.
    let uploader = tokio::spawn(async move {
        if !body.is_empty() {
            let _ = upload.send_data(body).await;
        }
        let _ = upload.finish().await;
    });

    let response = download.recv_response().await.unwrap();
    let mut data = BytesMut::new();
    while let Some(chunk) = download.recv_data().await.unwrap() {
        data.put(chunk);
    }

    uploader.abort();
    drop(sender);
    endpoint.close(0u32.into(), b"done");
    drive.abort();

    let (parts, ()) = response.into_parts();
    H3Response {
        status: parts.status,
        headers: parts.headers,
        body: data.freeze(),
    }
}
