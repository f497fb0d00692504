//! TLS configuration and the hot-swappable certificate store.
//!
//! Both transports resolve their certificate through the same
//! [`CertificateStore`], so a reload is picked up by the next TCP/TLS
//! handshake and the next QUIC handshake alike.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;
use thiserror::Error;

/// ALPN protocols offered on the TCP listener.
const TCP_ALPN: &[&[u8]] = &[b"h2", b"http/1.1"];

/// ALPN protocol offered on the QUIC listener.
const QUIC_ALPN: &[u8] = b"h3";

/// Error type for certificate loading and TLS setup.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("cannot read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates found in {0:?}")]
    NoCertificates(PathBuf),

    #[error("no private key found in {0:?}")]
    NoPrivateKey(PathBuf),

    #[error("rustls: {0}")]
    Rustls(#[from] rustls::Error),

    #[error("quic: {0}")]
    Quic(#[from] quinn::crypto::rustls::NoInitialCipherSuite),
}

/// Holds the active certificate pair.
///
/// Reads are a single atomic pointer load; writes replace the whole
/// [`CertifiedKey`], so a handshake sees either the old pair or the new
/// one, never a mix.
pub struct CertificateStore {
    current: ArcSwapOption<CertifiedKey>,
    provider: Arc<CryptoProvider>,
}

impl CertificateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            current: ArcSwapOption::empty(),
            provider: Arc::new(rustls::crypto::ring::default_provider()),
        }
    }

    /// Load a PEM chain and key from disk and install them.
    ///
    /// On failure the previously installed pair stays in place.
    pub fn load(&self, cert_path: &Path, key_path: &Path) -> Result<(), TlsError> {
        tracing::info!(cert = ?cert_path, key = ?key_path, "Loading certificate");

        match self.read_pair(cert_path, key_path) {
            Ok(pair) => {
                let chain_len = pair.cert.len();
                self.current.store(Some(Arc::new(pair)));
                tracing::info!(chain_len, "Certificate installed");
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    keeping_previous = self.current.load().is_some(),
                    "Certificate load failed"
                );
                Err(e)
            }
        }
    }

    /// The currently installed pair, if any.
    pub fn current(&self) -> Option<Arc<CertifiedKey>> {
        self.current.load_full()
    }

    fn read_pair(&self, cert_path: &Path, key_path: &Path) -> Result<CertifiedKey, TlsError> {
        let chain = load_certificates(cert_path)?;
        let key = load_private_key(key_path)?;
        let signing_key = self.provider.key_provider.load_private_key(key)?;
        Ok(CertifiedKey::new(chain, signing_key))
    }

    /// rustls config for the TCP listener, resolving through this store.
    pub fn tcp_server_config(self: &Arc<Self>) -> Result<ServerConfig, TlsError> {
        let mut config = ServerConfig::builder_with_provider(self.provider.clone())
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_cert_resolver(self.clone());
        config.alpn_protocols = TCP_ALPN.iter().map(|p| p.to_vec()).collect();
        Ok(config)
    }

    /// quinn server config for the QUIC listener, resolving through this store.
    pub fn quic_server_config(self: &Arc<Self>) -> Result<quinn::ServerConfig, TlsError> {
        let mut config = ServerConfig::builder_with_provider(self.provider.clone())
            .with_protocol_versions(&[&rustls::version::TLS13])?
            .with_no_client_auth()
            .with_cert_resolver(self.clone());
        config.alpn_protocols = vec![QUIC_ALPN.to_vec()];

        let crypto = quinn::crypto::rustls::QuicServerConfig::try_from(config)?;
        Ok(quinn::ServerConfig::with_crypto(Arc::new(crypto)))
    }
}

impl Default for CertificateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CertificateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateStore")
            .field("loaded", &self.current.load().is_some())
            .finish()
    }
}

impl ResolvesServerCert for CertificateStore {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        self.current()
    }
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Load certificates from PEM file
fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

/// Load the first private key (PKCS#8, PKCS#1 or SEC1) from PEM file
fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::thread;

    struct Pair {
        cert: PathBuf,
        key: PathBuf,
        der: CertificateDer<'static>,
    }

    fn write_pair(dir: &Path, name: &str) -> Pair {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec![format!("{name}.test")]).unwrap();
        let cert_path = dir.join(format!("{name}.crt"));
        let key_path = dir.join(format!("{name}.key"));
        fs::write(&cert_path, cert.pem()).unwrap();
        fs::write(&key_path, key_pair.serialize_pem()).unwrap();
        Pair {
            cert: cert_path,
            key: key_path,
            der: cert.der().clone(),
        }
    }

    #[test]
    fn empty_until_loaded() {
        let store = CertificateStore::new();
        assert!(store.current().is_none());
    }

    #[test]
    fn load_installs_pair() {
        let dir = tempfile::tempdir().unwrap();
        let pair = write_pair(dir.path(), "alpha");

        let store = CertificateStore::new();
        store.load(&pair.cert, &pair.key).unwrap();

        let current = store.current().unwrap();
        assert_eq!(current.cert, vec![pair.der]);
    }

    #[test]
    fn failed_load_keeps_previous_pair() {
        let dir = tempfile::tempdir().unwrap();
        let pair = write_pair(dir.path(), "alpha");
        let store = CertificateStore::new();
        store.load(&pair.cert, &pair.key).unwrap();

        let missing = dir.path().join("missing.crt");
        assert!(matches!(
            store.load(&missing, &pair.key),
            Err(TlsError::Io { .. })
        ));

        let garbage = dir.path().join("garbage.key");
        fs::write(&garbage, "not a key").unwrap();
        assert!(matches!(
            store.load(&pair.cert, &garbage),
            Err(TlsError::NoPrivateKey(_))
        ));

        assert_eq!(store.current().unwrap().cert, vec![pair.der]);
    }

    #[test]
    fn key_file_without_certificates_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let pair = write_pair(dir.path(), "alpha");
        let store = CertificateStore::new();

        assert!(matches!(
            store.load(&pair.key, &pair.key),
            Err(TlsError::NoCertificates(_))
        ));
        assert!(store.current().is_none());
    }

    #[test]
    fn readers_never_see_torn_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let alpha = write_pair(dir.path(), "alpha");
        let beta = write_pair(dir.path(), "beta");

        let store = Arc::new(CertificateStore::new());
        store.load(&alpha.cert, &alpha.key).unwrap();

        let known = [alpha.der.clone(), beta.der.clone()];
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                let known = known.clone();
                thread::spawn(move || {
                    for _ in 0..2_000 {
                        let pair = store.current().expect("store never empties");
                        assert_eq!(pair.cert.len(), 1);
                        assert!(known.contains(&pair.cert[0]));
                    }
                })
            })
            .collect();

        for i in 0..50 {
            let pair = if i % 2 == 0 { &beta } else { &alpha };
            store.load(&pair.cert, &pair.key).unwrap();
        }

        for reader in readers {
            reader.join().unwrap();
        }
    }

    #[test]
    fn both_transports_share_the_resolver() {
        let dir = tempfile::tempdir().unwrap();
        let pair = write_pair(dir.path(), "alpha");
        let store = Arc::new(CertificateStore::new());
        store.load(&pair.cert, &pair.key).unwrap();

        let tcp = store.tcp_server_config().unwrap();
        assert_eq!(tcp.alpn_protocols, vec![b"h2".to_vec(), b"http/1.1".to_vec()]);
        assert!(store.quic_server_config().is_ok());
    }
}
