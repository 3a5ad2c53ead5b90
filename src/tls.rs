//! Client side TLS configuration, used to upgrade a socket once the server agreed to it.

use super::config::Host;
use super::error::{DriverError, DriverResult};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rustls::TlsConnector;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsOptions {
  accept_invalid_certs: bool,
  ca_file: Option<PathBuf>,
  server_name: Option<String>,
}

impl TlsOptions {
  pub fn accept_invalid_certs(&self) -> bool {
    self.accept_invalid_certs
  }

  pub fn ca_file(&self) -> Option<&Path> {
    self.ca_file.as_deref()
  }

  /// Skips certificate verification entirely. Only meant for servers using self-signed
  /// certificates, such as the ones generated by a default MYSQL installation.
  pub fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
    self.accept_invalid_certs = accept;
    self
  }

  /// Trusts the certificates found in this PEM file instead of the webpki roots.
  pub fn with_ca_file(mut self, path: impl Into<PathBuf>) -> Self {
    self.ca_file = Some(path.into());
    self
  }

  /// Overrides the name used for SNI and certificate verification.
  pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
    self.server_name = Some(name.into());
    self
  }

  pub fn connector(&self) -> DriverResult<TlsConnector> {
    let provider = rustls::crypto::ring::default_provider();
    let builder = ClientConfig::builder_with_provider(Arc::new(provider))
      .with_safe_default_protocol_versions()
      .map_err(|e| DriverError::Tls(format!("failed to set protocol versions: {}", e)))?;

    let config = if self.accept_invalid_certs {
      builder
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoCertificateVerification))
        .with_no_client_auth()
    } else {
      builder
        .with_root_certificates(self.root_store()?)
        .with_no_client_auth()
    };

    Ok(TlsConnector::from(Arc::new(config)))
  }

  pub fn server_name(&self, host: &Host) -> DriverResult<ServerName<'static>> {
    let name = match (&self.server_name, host) {
      (Some(name), _) => name.clone(),
      (None, Host::V4(ipv4)) => return Ok(ServerName::from(std::net::IpAddr::V4(*ipv4))),
      (None, Host::V6(ipv6)) => return Ok(ServerName::from(std::net::IpAddr::V6(*ipv6))),
      (None, Host::Domain(domain)) => domain.clone(),
    };

    ServerName::try_from(name.clone())
      .map_err(|_| DriverError::Tls(format!("invalid server name `{}`", name)))
  }

  fn root_store(&self) -> DriverResult<RootCertStore> {
    let mut root_store = RootCertStore::empty();
    match self.ca_file {
      Some(ref path) => {
        for cert in load_certificates(path)? {
          root_store
            .add(cert)
            .map_err(|e| DriverError::Tls(format!("{}: {}", path.display(), e)))?;
        }
      }
      None => root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }
    Ok(root_store)
  }
}

fn load_certificates(path: &Path) -> DriverResult<Vec<CertificateDer<'static>>> {
  let cert_error = |e: std::io::Error| DriverError::Tls(format!("{}: {}", path.display(), e));
  let mut reader = BufReader::new(File::open(path).map_err(cert_error)?);
  let certs = rustls_pemfile::certs(&mut reader)
    .collect::<Result<Vec<_>, _>>()
    .map_err(cert_error)?;

  if certs.is_empty() {
    return Err(DriverError::Tls(format!(
      "{}: no certificates found",
      path.display()
    )));
  }
  Ok(certs)
}

#[derive(Debug)]
struct NoCertificateVerification;

impl ServerCertVerifier for NoCertificateVerification {
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

#[cfg(test)]
mod tests {
  use super::*;
  use std::net::Ipv4Addr;

  #[test]
  fn builds_connectors() {
    assert!(TlsOptions::default().connector().is_ok());
    assert!(TlsOptions::default()
      .with_accept_invalid_certs(true)
      .connector()
      .is_ok());
  }

  #[test]
  fn missing_ca_file_is_a_configuration_error() {
    let opts = TlsOptions::default().with_ca_file("/nonexistent/ca.pem");
    assert_eq!(opts.ca_file(), Some(Path::new("/nonexistent/ca.pem")));
    assert!(matches!(opts.connector(), Err(DriverError::Tls(_))));
  }

  #[test]
  fn picks_server_names() {
    let opts = TlsOptions::default();
    assert_eq!(
      opts
        .server_name(&Host::Domain("db.internal".into()))
        .unwrap()
        .to_str(),
      "db.internal"
    );
    assert!(matches!(
      opts.server_name(&Host::V4(Ipv4Addr::LOCALHOST)).unwrap(),
      ServerName::IpAddress(_)
    ));

    let opts = opts.with_server_name("mysql.example.com");
    assert_eq!(
      opts
        .server_name(&Host::V4(Ipv4Addr::LOCALHOST))
        .unwrap()
        .to_str(),
      "mysql.example.com"
    );
    assert!(TlsOptions::default()
      .with_server_name("not a host name")
      .server_name(&Host::V4(Ipv4Addr::LOCALHOST))
      .is_err());
  }
}
