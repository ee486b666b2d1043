//! TLS support using rustls
//!
//! Provides secure HTTPS sessions with:
//! - Modern TLS 1.2/1.3 only (ring provider)
//! - Certificate and key loading from PEM files or in-memory PEM
//! - ALPN advertising HTTP/1.1

use crate::{Error, Result};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

#[derive(Clone, Debug)]
enum PemSource {
    File(PathBuf),
    Inline(String),
}

impl PemSource {
    fn reader(&self, what: &str) -> Result<Box<dyn BufRead + '_>> {
        match self {
            PemSource::File(path) => {
                let file = File::open(path).map_err(|e| {
                    Error::Tls(format!("Failed to open {} file {}: {}", what, path.display(), e))
                })?;
                Ok(Box::new(BufReader::new(file)))
            }
            PemSource::Inline(pem) => Ok(Box::new(pem.as_bytes())),
        }
    }
}

/// Certificate material for an HTTPS server
#[derive(Clone, Debug)]
pub struct TlsConfig {
    cert: PemSource,
    key: PemSource,
    /// ALPN protocols (default: ["http/1.1"])
    pub alpn_protocols: Vec<Vec<u8>>,
}

impl TlsConfig {
    /// Load certificate chain and private key from PEM files
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert: PemSource::File(cert_path.into()),
            key: PemSource::File(key_path.into()),
            alpn_protocols: vec![b"http/1.1".to_vec()],
        }
    }

    /// Use in-memory PEM certificate chain and private key
    pub fn from_pem(cert_pem: impl Into<String>, key_pem: impl Into<String>) -> Self {
        Self {
            cert: PemSource::Inline(cert_pem.into()),
            key: PemSource::Inline(key_pem.into()),
            alpn_protocols: vec![b"http/1.1".to_vec()],
        }
    }

    /// Build rustls ServerConfig
    pub fn build_server_config(&self) -> Result<Arc<rustls::ServerConfig>> {
        let mut cert_reader = self.cert.reader("certificate")?;
        let certs = read_certs(&mut cert_reader)?;
        let mut key_reader = self.key.reader("key")?;
        let key = read_private_key(&mut key_reader)?;

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = rustls::ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::Tls(e.to_string()))?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| Error::Tls(e.to_string()))?;

        config.alpn_protocols = self.alpn_protocols.clone();

        Ok(Arc::new(config))
    }

    /// Build the acceptor used to perform server-side handshakes
    pub fn acceptor(&self) -> Result<TlsAcceptor> {
        Ok(TlsAcceptor::from(self.build_server_config()?))
    }
}

/// Load certificates from PEM file
pub fn load_certs(path: impl AsRef<Path>) -> Result<Vec<CertificateDer<'static>>> {
    let source = PemSource::File(path.as_ref().to_path_buf());
    let mut reader = source.reader("certificate")?;
    read_certs(&mut reader)
}

/// Load private key from PEM file
pub fn load_private_key(path: impl AsRef<Path>) -> Result<PrivateKeyDer<'static>> {
    let source = PemSource::File(path.as_ref().to_path_buf());
    let mut reader = source.reader("key")?;
    read_private_key(&mut reader)
}

fn read_certs(reader: &mut dyn BufRead) -> Result<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Tls(format!("Failed to parse certs: {}", e)))?;

    if certs.is_empty() {
        return Err(Error::Tls("No certificates found".to_string()));
    }

    Ok(certs)
}

fn read_private_key(reader: &mut dyn BufRead) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(reader)
        .map_err(|e| Error::Tls(format!("Failed to parse key: {}", e)))?
        .ok_or_else(|| Error::Tls("No private key found".to_string()))
}
