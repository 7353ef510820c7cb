// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Optional (mutual) TLS for the coordinator transport.
//!
//! Unconfigured, the transport is plaintext. With cert/key files the server
//! terminates TLS; a CA file turns on mutual auth (peer identity is the TLS
//! subject). `skip_tls_verify` disables server-certificate validation on
//! the client and is meant for lab setups only.

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio_rustls::{TlsAcceptor, TlsConnector};

/// Errors from TLS setup
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no certificates found in {0}")]
    NoCerts(PathBuf),
    #[error("no private key found in {0}")]
    NoKey(PathBuf),
    #[error("TLS configuration error: {0}")]
    Rustls(#[from] rustls::Error),
    #[error("client certificate verifier error: {0}")]
    Verifier(String),
    #[error("invalid server name: {0}")]
    ServerName(String),
}

/// File-based TLS configuration, as carried in `config.toml` or flags.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct TlsConfig {
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub ca_file: Option<PathBuf>,
    #[serde(default)]
    pub skip_tls_verify: bool,
}

impl TlsConfig {
    /// True when the server side should terminate TLS.
    pub fn server_enabled(&self) -> bool {
        self.cert_file.is_some() && self.key_file.is_some()
    }

    /// True when the client side should dial TLS.
    pub fn client_enabled(&self) -> bool {
        self.server_enabled() || self.ca_file.is_some() || self.skip_tls_verify
    }

    /// Build the server-side acceptor. `None` when TLS is unconfigured.
    pub fn acceptor(&self) -> Result<Option<TlsAcceptor>, TlsError> {
        let (Some(cert_file), Some(key_file)) = (&self.cert_file, &self.key_file) else {
            return Ok(None);
        };
        let certs = load_certs(cert_file)?;
        let key = load_key(key_file)?;

        let builder = rustls::ServerConfig::builder();
        let config = match &self.ca_file {
            Some(ca_file) => {
                let mut roots = rustls::RootCertStore::empty();
                for cert in load_certs(ca_file)? {
                    roots.add(cert)?;
                }
                let verifier = rustls::server::WebPkiClientVerifier::builder(Arc::new(roots))
                    .build()
                    .map_err(|e| TlsError::Verifier(e.to_string()))?;
                builder
                    .with_client_cert_verifier(verifier)
                    .with_single_cert(certs, key)?
            }
            None => builder
                .with_no_client_auth()
                .with_single_cert(certs, key)?,
        };
        Ok(Some(TlsAcceptor::from(Arc::new(config))))
    }

    /// Build the client-side connector. `None` when TLS is unconfigured.
    pub fn connector(&self) -> Result<Option<TlsConnector>, TlsError> {
        if !self.client_enabled() {
            return Ok(None);
        }

        let builder = rustls::ClientConfig::builder();
        let builder = if self.skip_tls_verify {
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerify::new()))
        } else {
            let mut roots = rustls::RootCertStore::empty();
            if let Some(ca_file) = &self.ca_file {
                for cert in load_certs(ca_file)? {
                    roots.add(cert)?;
                }
            }
            builder.with_root_certificates(roots)
        };

        let config = match (&self.cert_file, &self.key_file) {
            (Some(cert_file), Some(key_file)) => {
                builder.with_client_auth_cert(load_certs(cert_file)?, load_key(key_file)?)?
            }
            _ => builder.with_no_client_auth(),
        };
        Ok(Some(TlsConnector::from(Arc::new(config))))
    }
}

/// Parse the DNS name clients present for SNI.
pub fn server_name(host: &str) -> Result<ServerName<'static>, TlsError> {
    ServerName::try_from(host.to_string()).map_err(|e| TlsError::ServerName(e.to_string()))
}

fn load_certs(path: &PathBuf) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = std::fs::File::open(path).map_err(|source| TlsError::Io {
        path: path.clone(),
        source,
    })?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<_, _>>()
        .map_err(|source| TlsError::Io {
            path: path.clone(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCerts(path.clone()));
    }
    Ok(certs)
}

fn load_key(path: &PathBuf) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = std::fs::File::open(path).map_err(|source| TlsError::Io {
        path: path.clone(),
        source,
    })?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|source| TlsError::Io {
            path: path.clone(),
            source,
        })?
        .ok_or_else(|| TlsError::NoKey(path.clone()))
}

/// Certificate verifier that accepts anything. Signatures are still checked
/// so a mismatched key fails the handshake.
#[derive(Debug)]
struct NoVerify(rustls::crypto::CryptoProvider);

impl NoVerify {
    fn new() -> Self {
        Self(
            rustls::crypto::CryptoProvider::get_default()
                .cloned()
                .map(|p| Arc::unwrap_or_clone(p))
                .unwrap_or_else(rustls::crypto::aws_lc_rs::default_provider),
        )
    }
}

impl rustls::client::danger::ServerCertVerifier for NoVerify {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.0
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
#[path = "tls_tests.rs"]
mod tests;
