//! Connection phase: greeting, optional TLS upgrade, authentication.
//!
//! https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_connection_phase.html

use super::auth::{AuthPlugin, AuthStep, MYSQL_NATIVE_PASSWORD_PLUGIN_NAME};
use super::channel::Channel;
use super::config::{ConnectionOptions, TlsMode};
use super::error::{DriverError, DriverResult};
use super::protocol::{
  ssl_request, AuthResponse, CapabilityFlags, Handshake, HandshakeResponse, Payload, ServerOk,
};
use super::stream::Transport;
use tracing::debug;

/// Upper bound on auth switch and more data round trips.
pub const MAX_AUTH_ROUNDS: usize = 8;

/// What the connection keeps from a successful handshake.
#[derive(Debug)]
pub struct Session {
  pub server_version: String,
  pub connection_id: u32,
  pub capabilities: CapabilityFlags,
  pub ok: ServerOk,
}

/// Capabilities this client is able to speak, before intersecting them with the server's.
pub fn client_capabilities(opts: &ConnectionOptions, use_tls: bool) -> CapabilityFlags {
  let mut capabilities = CapabilityFlags::CLIENT_PROTOCOL_41
    | CapabilityFlags::CLIENT_SECURE_CONNECTION
    | CapabilityFlags::CLIENT_LONG_PASSWORD
    | CapabilityFlags::CLIENT_PLUGIN_AUTH
    | CapabilityFlags::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA
    | CapabilityFlags::CLIENT_LONG_FLAG
    | CapabilityFlags::CLIENT_TRANSACTIONS
    | CapabilityFlags::CLIENT_DEPRECATE_EOF;

  if opts.database().is_some() {
    capabilities.insert(CapabilityFlags::CLIENT_CONNECT_WITH_DB);
  }

  if use_tls {
    capabilities.insert(CapabilityFlags::CLIENT_SSL);
  }

  capabilities
}

/// Whether to upgrade to TLS. Both ends must be able to, and `Require` fails when either can't.
pub fn negotiate_tls(
  mode: TlsMode,
  server: CapabilityFlags,
  transport_supports_tls: bool,
) -> DriverResult<bool> {
  let possible = transport_supports_tls && server.contains(CapabilityFlags::CLIENT_SSL);
  match mode {
    TlsMode::Disable => Ok(false),
    TlsMode::Enable => Ok(possible),
    TlsMode::Require if possible => Ok(true),
    TlsMode::Require => Err(DriverError::TlsNotSupported),
  }
}

/// Both plugins scramble the password with a 20 bytes challenge.
fn check_nonce(nonce: &[u8]) -> DriverResult<()> {
  if nonce.len() < 20 {
    return Err(DriverError::MalformedPacket(format!(
      "authentication challenge is {} bytes long",
      nonce.len()
    )));
  }
  Ok(())
}

pub async fn handshake<T: Transport>(
  channel: &mut Channel<T>,
  opts: &ConnectionOptions,
) -> DriverResult<Session> {
  let greeting = Payload::new(channel.read_message().await?).as_handshake()?;
  debug!(
    server_version = greeting.server_version(),
    connection_id = greeting.connection_id(),
    auth_plugin = greeting.auth_plugin_name(),
    "received server greeting"
  );

  if !greeting
    .capabilities()
    .contains(CapabilityFlags::CLIENT_PROTOCOL_41)
  {
    return Err(DriverError::UnexpectedPacket(
      "server does not support CLIENT_PROTOCOL_41".into(),
    ));
  }

  check_nonce(greeting.nonce())?;

  let use_tls = negotiate_tls(
    opts.tls_mode(),
    greeting.capabilities(),
    channel.get_ref().supports_tls(),
  )?;

  // Intersection between what the server supports, and what our client supports.
  let capabilities = greeting.capabilities() & client_capabilities(opts, use_tls);
  let collation = opts.collation() as u8;

  if use_tls {
    debug!("upgrading connection to TLS");
    channel
      .write_message(&ssl_request(capabilities, collation))
      .await?;
    if channel.buffered_len() > 0 {
      return Err(DriverError::UnexpectedPacket(
        "server sent data before the TLS handshake".into(),
      ));
    }
    channel.get_mut().start_tls().await?;
    channel.reset_sequence_id();
  }

  let plugin_name = greeting
    .auth_plugin_name()
    .unwrap_or(MYSQL_NATIVE_PASSWORD_PLUGIN_NAME);
  let plugin = AuthPlugin::from_name(plugin_name)?;
  debug!(auth_plugin = plugin.name(), "authenticating");

  let auth_response = plugin.scramble(opts.password(), greeting.nonce());
  let response = HandshakeResponse {
    capabilities,
    collation,
    user: opts.user(),
    auth_response: &auth_response,
    database: opts.database(),
    auth_plugin_name: plugin.name(),
  };
  channel.write_message(&response.serialize()).await?;

  let ok = authenticate(channel, opts, plugin, capabilities).await?;
  debug!(tls = channel.get_ref().is_tls(), "handshake completed");

  Ok(Session {
    server_version: greeting.server_version().to_string(),
    connection_id: greeting.connection_id(),
    capabilities,
    ok,
  })
}

async fn authenticate<T: Transport>(
  channel: &mut Channel<T>,
  opts: &ConnectionOptions,
  mut plugin: AuthPlugin,
  capabilities: CapabilityFlags,
) -> DriverResult<ServerOk> {
  for _ in 0..MAX_AUTH_ROUNDS {
    let payload = Payload::new(channel.read_message().await?);
    match payload.as_auth_response(capabilities)? {
      AuthResponse::Success(ok) => return Ok(ok),
      AuthResponse::Failure(err) => return Err(err.into()),
      AuthResponse::AuthSwitch(switch) => {
        plugin = AuthPlugin::from_name(switch.auth_plugin_name())?;
        debug!(auth_plugin = plugin.name(), "server requested an auth switch");
        check_nonce(switch.nonce())?;
        let response = plugin.scramble(opts.password(), switch.nonce());
        channel.write_message(&response).await?;
      }
      AuthResponse::AuthMoreData(data) => {
        let is_tls = channel.get_ref().is_tls();
        match plugin.more_data(data.data(), opts.password(), is_tls)? {
          AuthStep::Wait => debug!("fast authentication succeeded"),
          AuthStep::Respond(response) => {
            debug!("performing full authentication");
            channel.write_message(&response).await?;
          }
        }
      }
    }
  }

  Err(DriverError::TooManyAuthRounds(MAX_AUTH_ROUNDS))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tls_negotiation() {
    let with_ssl = CapabilityFlags::CLIENT_PROTOCOL_41 | CapabilityFlags::CLIENT_SSL;
    let without_ssl = CapabilityFlags::CLIENT_PROTOCOL_41;

    assert!(!negotiate_tls(TlsMode::Disable, with_ssl, true).unwrap());
    assert!(negotiate_tls(TlsMode::Enable, with_ssl, true).unwrap());
    assert!(!negotiate_tls(TlsMode::Enable, without_ssl, true).unwrap());
    assert!(negotiate_tls(TlsMode::Require, with_ssl, true).unwrap());
    assert!(matches!(
      negotiate_tls(TlsMode::Require, without_ssl, true),
      Err(DriverError::TlsNotSupported)
    ));

    // Streams unable to carry TLS.
    assert!(!negotiate_tls(TlsMode::Disable, with_ssl, false).unwrap());
    assert!(!negotiate_tls(TlsMode::Enable, with_ssl, false).unwrap());
    assert!(matches!(
      negotiate_tls(TlsMode::Require, with_ssl, false),
      Err(DriverError::TlsNotSupported)
    ));
  }

  #[test]
  fn short_challenges_are_rejected() {
    assert!(check_nonce(&[0x2A; 20]).is_ok());
    assert!(matches!(
      check_nonce(&[0x2A; 8]),
      Err(DriverError::MalformedPacket(_))
    ));
  }

  #[test]
  fn capabilities_follow_options() {
    let opts = ConnectionOptions::default();
    let capabilities = client_capabilities(&opts, false);
    assert!(capabilities.contains(
      CapabilityFlags::CLIENT_PROTOCOL_41
        | CapabilityFlags::CLIENT_PLUGIN_AUTH
        | CapabilityFlags::CLIENT_DEPRECATE_EOF
    ));
    assert!(!capabilities.contains(CapabilityFlags::CLIENT_CONNECT_WITH_DB));
    assert!(!capabilities.contains(CapabilityFlags::CLIENT_SSL));

    let capabilities = client_capabilities(&opts.with_database("shop"), true);
    assert!(capabilities.contains(CapabilityFlags::CLIENT_CONNECT_WITH_DB | CapabilityFlags::CLIENT_SSL));
  }
}
