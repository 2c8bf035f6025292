//! Server-side TLS setup.
//!
//! The certificate chain and key are read once, when the relay starts.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ServerConfig, SupportedProtocolVersion};
use tracing::info;

use crate::config::TlsConfig;
use crate::error::TlsError;

static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinVersion {
    Tls12,
    Tls13,
}

impl MinVersion {
    pub fn parse(value: &str) -> Result<Self, TlsError> {
        match value.trim() {
            "1.2" | "TLS1.2" | "tls12" => Ok(MinVersion::Tls12),
            "1.3" | "TLS1.3" | "tls13" => Ok(MinVersion::Tls13),
            other => Err(TlsError::UnsupportedVersion(other.to_string())),
        }
    }

    fn protocol_versions(self) -> &'static [&'static SupportedProtocolVersion] {
        match self {
            MinVersion::Tls12 => rustls::ALL_VERSIONS,
            MinVersion::Tls13 => TLS13_ONLY,
        }
    }
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Io {
            path: path.display().to_string(),
            source,
        })
}

pub fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: path.display().to_string(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::EmptyCertificateChain(path.display().to_string()));
    }
    Ok(certs)
}

pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Io {
            path: path.display().to_string(),
            source,
        })?
        .ok_or_else(|| TlsError::MissingPrivateKey(path.display().to_string()))
}

/// Builds the rustls config used by the listener. Any failure here is fatal
/// for startup.
pub fn load_server_config(config: &TlsConfig) -> Result<ServerConfig, TlsError> {
    let min_version = MinVersion::parse(&config.min_version)?;
    let certs = load_certificates(&config.cert_path)?;
    let key = load_private_key(&config.key_path)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let server_config = ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(min_version.protocol_versions())?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    info!(
        cert = %config.cert_path.display(),
        min_version = ?min_version,
        "Loaded TLS certificate pair"
    );
    Ok(server_config)
}
