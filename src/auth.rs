//! Authentication plugins supported during the connection phase.
//!
//! https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_connection_phase_authentication_methods.html

use super::error::{DriverError, DriverResult};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tracing::debug;

pub const MYSQL_NATIVE_PASSWORD_PLUGIN_NAME: &str = "mysql_native_password";
pub const CACHING_SHA2_PASSWORD_PLUGIN_NAME: &str = "caching_sha2_password";

const CACHING_SHA2_FAST_AUTH_SUCCESS: u8 = 0x03;
const CACHING_SHA2_PERFORM_FULL_AUTH: u8 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPlugin {
  MysqlNativePassword,
  CachingSha2Password,
}

/// What to do after the server sent plugin specific data.
#[derive(Debug, PartialEq, Eq)]
pub enum AuthStep {
  /// Nothing to send, the server follows up with OK or ERR.
  Wait,
  /// Send these bytes as is.
  Respond(Vec<u8>),
}

impl AuthPlugin {
  pub fn from_name(name: &str) -> DriverResult<Self> {
    match name {
      MYSQL_NATIVE_PASSWORD_PLUGIN_NAME => Ok(AuthPlugin::MysqlNativePassword),
      CACHING_SHA2_PASSWORD_PLUGIN_NAME => Ok(AuthPlugin::CachingSha2Password),
      other => Err(DriverError::UnknownAuthPlugin(other.to_string())),
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      AuthPlugin::MysqlNativePassword => MYSQL_NATIVE_PASSWORD_PLUGIN_NAME,
      AuthPlugin::CachingSha2Password => CACHING_SHA2_PASSWORD_PLUGIN_NAME,
    }
  }

  /// Initial auth response for this plugin. An empty password yields an empty response.
  pub fn scramble(&self, password: Option<&str>, nonce: &[u8]) -> Vec<u8> {
    let password = match password {
      Some(password) if !password.is_empty() => password.as_bytes(),
      _ => return Vec::new(),
    };

    match self {
      AuthPlugin::MysqlNativePassword => scramble_native(nonce, password).to_vec(),
      AuthPlugin::CachingSha2Password => scramble_sha256(nonce, password).to_vec(),
    }
  }

  /// Interprets an AuthMoreData payload.
  pub fn more_data(&self, data: &[u8], password: Option<&str>, is_tls: bool) -> DriverResult<AuthStep> {
    match self {
      AuthPlugin::MysqlNativePassword => Err(DriverError::UnexpectedPacket(format!(
        "{} does not exchange extra authentication data",
        self.name()
      ))),
      AuthPlugin::CachingSha2Password => match data {
        [CACHING_SHA2_FAST_AUTH_SUCCESS] => Ok(AuthStep::Wait),
        _ if is_tls => {
          if data != [CACHING_SHA2_PERFORM_FULL_AUTH] {
            debug!(len = data.len(), "treating auth data as a full authentication request");
          }
          let mut response = password.unwrap_or("").as_bytes().to_vec();
          response.push(0);
          Ok(AuthStep::Respond(response))
        }
        _ => Err(DriverError::AuthPluginRequiresTls(self.name().to_string())),
      },
    }
  }
}

fn xor<const N: usize>(mut left: [u8; N], right: &[u8; N]) -> [u8; N] {
  for (l, r) in left.iter_mut().zip(right.iter()) {
    *l ^= r;
  }
  left
}

/// SHA1(password) XOR SHA1(nonce <concat> SHA1(SHA1(password)))
pub fn scramble_native(nonce: &[u8], password: &[u8]) -> [u8; 20] {
  let stage1: [u8; 20] = Sha1::digest(password).into();
  let stage2 = Sha1::digest(stage1);
  let mut hasher = Sha1::new();
  hasher.update(nonce);
  hasher.update(stage2);
  let stage3: [u8; 20] = hasher.finalize().into();
  xor(stage1, &stage3)
}

/// SHA256(password) XOR SHA256(SHA256(SHA256(password)) <concat> nonce)
pub fn scramble_sha256(nonce: &[u8], password: &[u8]) -> [u8; 32] {
  let stage1: [u8; 32] = Sha256::digest(password).into();
  let stage2 = Sha256::digest(stage1);
  let mut hasher = Sha256::new();
  hasher.update(stage2);
  hasher.update(nonce);
  let stage3: [u8; 32] = hasher.finalize().into();
  xor(stage1, &stage3)
}

#[cfg(test)]
mod tests {
  use super::*;

  const NONCE: [u8; 20] = [
    0x1A, 0x2B, 0x3C, 0x4D, 0x5E, 0x6F, 0x70, 0x01, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x08,
    0x19, 0x2A, 0x3B, 0x4C,
  ];

  #[test]
  fn native_password_scramble() {
    assert_eq!(
      scramble_native(&NONCE, b"secret"),
      [
        0x38, 0x44, 0x1D, 0x48, 0xA8, 0x4A, 0x52, 0xE7, 0xA8, 0x83, 0x62, 0x1A, 0x96, 0xF8, 0xF1,
        0x13, 0x8E, 0xC7, 0xE7, 0x90
      ]
    );
  }

  #[test]
  fn caching_sha2_scramble() {
    assert_eq!(
      scramble_sha256(&NONCE, b"secret"),
      [
        0x6D, 0x4B, 0xB4, 0x63, 0x04, 0x5F, 0x64, 0x14, 0xAE, 0xC0, 0x15, 0xDF, 0x40, 0xCC, 0xD5,
        0x36, 0x27, 0x05, 0x61, 0xD5, 0x1F, 0x1F, 0xC7, 0xEF, 0x7D, 0x7E, 0xBB, 0x78, 0xD8, 0x4C,
        0x7B, 0x99
      ]
    );
  }

  #[test]
  fn empty_passwords_send_nothing() {
    for plugin in [AuthPlugin::MysqlNativePassword, AuthPlugin::CachingSha2Password] {
      assert!(plugin.scramble(None, &NONCE).is_empty());
      assert!(plugin.scramble(Some(""), &NONCE).is_empty());
    }
    assert_eq!(
      AuthPlugin::MysqlNativePassword.scramble(Some("secret"), &NONCE),
      scramble_native(&NONCE, b"secret").to_vec()
    );
  }

  #[test]
  fn resolves_plugins_by_name() {
    assert_eq!(
      AuthPlugin::from_name("caching_sha2_password").unwrap(),
      AuthPlugin::CachingSha2Password
    );
    assert_eq!(
      AuthPlugin::from_name(MYSQL_NATIVE_PASSWORD_PLUGIN_NAME)
        .unwrap()
        .name(),
      MYSQL_NATIVE_PASSWORD_PLUGIN_NAME
    );
    match AuthPlugin::from_name("sha256_password") {
      Err(DriverError::UnknownAuthPlugin(name)) => assert_eq!(name, "sha256_password"),
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn caching_sha2_more_data() {
    let plugin = AuthPlugin::CachingSha2Password;
    assert_eq!(
      plugin.more_data(&[0x03], Some("secret"), false).unwrap(),
      AuthStep::Wait
    );
    assert_eq!(
      plugin.more_data(&[0x04], Some("secret"), true).unwrap(),
      AuthStep::Respond(b"secret\0".to_vec())
    );
    assert!(matches!(
      plugin.more_data(&[0x04], Some("secret"), false),
      Err(DriverError::AuthPluginRequiresTls(_))
    ));
    assert!(matches!(
      AuthPlugin::MysqlNativePassword.more_data(&[0x03], None, true),
      Err(DriverError::UnexpectedPacket(_))
    ));
  }
}
