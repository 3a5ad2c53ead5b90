use std::io;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
  #[error("Failed due to IO error")]
  Io(#[from] io::Error),
  #[error("Unable to resolve address, host `{0}` is unreachable")]
  UnreachableHost(String),
  #[error("The message read was incomplete (not enough bytes to fully decode it)")]
  IncompleteMessage,
  #[error("Packets sequence_id are out of sync with MYSQL (expected {expected}, got {actual})")]
  SequenceMismatch { expected: u8, actual: u8 },
  #[error("Unexpected packet: {0}")]
  UnexpectedPacket(String),
  #[error("Malformed packet: {0}")]
  MalformedPacket(String),
  #[error("Unsupported protocol version {0}, only protocol 10 is supported")]
  UnsupportedProtocol(u8),
  #[error("Connection was closed by the server")]
  ConnectionClosed,
  #[error("Connection is not usable (closed, not authenticated or broken by a previous error)")]
  ConnectionNotUsable,
  #[error("A resultset is still open on this connection, read it until completion first")]
  ResultsetPending,
  #[error("Statement was closed or belongs to another connection")]
  StatementClosed,
  #[error("Statement expects {expected} parameters, got {actual}")]
  ValueCountMismatch { expected: usize, actual: usize },
  #[error("Unknown authentication plugin `{0}`")]
  UnknownAuthPlugin(String),
  #[error("Authentication plugin `{0}` requires a TLS connection to continue")]
  AuthPluginRequiresTls(String),
  #[error("Authentication did not complete after {0} rounds")]
  TooManyAuthRounds(usize),
  #[error("TLS is required but the server does not support it")]
  TlsNotSupported,
  #[error("TLS handshake failed")]
  TlsHandshake(#[source] io::Error),
  #[error("Invalid TLS configuration: {0}")]
  Tls(String),
  #[error("Server error: {0}")]
  Upstream(#[from] UpstreamError),
}

impl DriverError {
  /// Whether the connection can no longer be trusted to be in sync with the server.
  pub fn is_fatal(&self) -> bool {
    !matches!(
      self,
      DriverError::Upstream(_)
        | DriverError::ResultsetPending
        | DriverError::StatementClosed
        | DriverError::ValueCountMismatch { .. }
        | DriverError::ConnectionNotUsable
    )
  }

  /// Returns the server error, if this error was reported by MYSQL.
  pub fn upstream(&self) -> Option<&UpstreamError> {
    match self {
      DriverError::Upstream(err) => Some(err),
      _ => None,
    }
  }
}

pub type DriverResult<T> = Result<T, DriverError>;

/// An error reported by the server through an ERR packet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (error {code}, state {sql_state})")]
pub struct UpstreamError {
  pub code: u16,
  pub sql_state: String,
  pub message: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn upstream_error_is_displayed_verbatim() {
    let err = UpstreamError {
      code: 1049,
      sql_state: "42000".into(),
      message: "Unknown database 'a'".into(),
    };
    assert_eq!(err.to_string(), "Unknown database 'a' (error 1049, state 42000)");
  }

  #[test]
  fn classifies_fatal_errors() {
    assert!(DriverError::IncompleteMessage.is_fatal());
    assert!(DriverError::SequenceMismatch {
      expected: 1,
      actual: 3
    }
    .is_fatal());
    assert!(!DriverError::ValueCountMismatch {
      expected: 1,
      actual: 2
    }
    .is_fatal());
    let upstream = DriverError::from(UpstreamError {
      code: 1064,
      sql_state: "42000".into(),
      message: "syntax".into(),
    });
    assert!(!upstream.is_fatal());
    assert_eq!(upstream.upstream().map(|e| e.code), Some(1064));
  }
}
