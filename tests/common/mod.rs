//! Scripted MYSQL server over an in-memory duplex stream.
#![allow(dead_code)]

use bytes::{Buf, BufMut, BytesMut};
use futures::future::BoxFuture;
use mysql_client::protocol::CapabilityFlags;
use mysql_client::{Connection, ConnectionOptions, DriverResult, Transport};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{duplex, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};

pub const NONCE: [u8; 20] = [
  0x1A, 0x2B, 0x3C, 0x4D, 0x5E, 0x6F, 0x70, 0x01, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x08,
  0x19, 0x2A, 0x3B, 0x4C,
];

pub const TYPE_LONGLONG: u8 = 0x08;
pub const TYPE_VAR_STRING: u8 = 0xFD;

pub fn server_capabilities() -> CapabilityFlags {
  CapabilityFlags::CLIENT_PROTOCOL_41
    | CapabilityFlags::CLIENT_SECURE_CONNECTION
    | CapabilityFlags::CLIENT_LONG_PASSWORD
    | CapabilityFlags::CLIENT_LONG_FLAG
    | CapabilityFlags::CLIENT_PLUGIN_AUTH
    | CapabilityFlags::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA
    | CapabilityFlags::CLIENT_TRANSACTIONS
    | CapabilityFlags::CLIENT_CONNECT_WITH_DB
    | CapabilityFlags::CLIENT_DEPRECATE_EOF
    | CapabilityFlags::CLIENT_SSL
}

pub fn pair(opts: ConnectionOptions) -> (Connection<DuplexStream>, MockServer) {
  let (client, server) = duplex(1 << 16);
  (
    Connection::from_transport(client, opts),
    MockServer { stream: server },
  )
}

/// In-memory stream whose TLS upgrade only flips a flag, bytes keep flowing in plain text.
pub struct FakeTlsStream {
  stream: DuplexStream,
  tls: bool,
}

impl AsyncRead for FakeTlsStream {
  fn poll_read(
    mut self: Pin<&mut Self>,
    cx: &mut Context<'_>,
    buf: &mut ReadBuf<'_>,
  ) -> Poll<io::Result<()>> {
    Pin::new(&mut self.stream).poll_read(cx, buf)
  }
}

impl AsyncWrite for FakeTlsStream {
  fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
    Pin::new(&mut self.stream).poll_write(cx, buf)
  }

  fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    Pin::new(&mut self.stream).poll_flush(cx)
  }

  fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    Pin::new(&mut self.stream).poll_shutdown(cx)
  }
}

impl Transport for FakeTlsStream {
  fn supports_tls(&self) -> bool {
    !self.tls
  }

  fn is_tls(&self) -> bool {
    self.tls
  }

  fn start_tls(&mut self) -> BoxFuture<'_, DriverResult<()>> {
    Box::pin(async move {
      self.tls = true;
      Ok(())
    })
  }
}

pub fn tls_pair(opts: ConnectionOptions) -> (Connection<FakeTlsStream>, MockServer) {
  let (client, server) = duplex(1 << 16);
  let stream = FakeTlsStream {
    stream: client,
    tls: false,
  };
  (
    Connection::from_transport(stream, opts),
    MockServer { stream: server },
  )
}

/// Handshake v10 for server 8.0.36, connection id 42.
pub fn greeting(capabilities: CapabilityFlags, plugin: &str) -> Vec<u8> {
  let capabilities = capabilities.bits();
  let mut b = Vec::new();
  b.push(10);
  b.extend_from_slice(b"8.0.36\0");
  b.extend_from_slice(&42u32.to_le_bytes());
  b.extend_from_slice(&NONCE[..8]);
  b.push(0);
  b.extend_from_slice(&(capabilities as u16).to_le_bytes());
  b.push(33);
  b.extend_from_slice(&2u16.to_le_bytes());
  b.extend_from_slice(&((capabilities >> 16) as u16).to_le_bytes());
  b.push(21);
  b.extend_from_slice(&[0; 10]);
  b.extend_from_slice(&NONCE[8..]);
  b.push(0);
  b.extend_from_slice(plugin.as_bytes());
  b.push(0);
  b
}

fn put_lenc_str(b: &mut Vec<u8>, s: &str) {
  b.push(s.len() as u8);
  b.extend_from_slice(s.as_bytes());
}

pub fn column(name: &str, column_type: u8, flags: u16) -> Vec<u8> {
  let mut b = Vec::new();
  put_lenc_str(&mut b, "def");
  put_lenc_str(&mut b, "shop");
  put_lenc_str(&mut b, "t");
  put_lenc_str(&mut b, "t");
  put_lenc_str(&mut b, name);
  put_lenc_str(&mut b, name);
  b.push(0x0C);
  b.extend_from_slice(&63u16.to_le_bytes());
  b.extend_from_slice(&20u32.to_le_bytes());
  b.push(column_type);
  b.extend_from_slice(&flags.to_le_bytes());
  b.push(0);
  b.extend_from_slice(&[0, 0]);
  b
}

pub fn ok(affected_rows: u8, last_insert_id: u8) -> Vec<u8> {
  vec![0x00, affected_rows, last_insert_id, 0x02, 0x00, 0x00, 0x00]
}

/// OK packet with the 0xFE header, ending a resultset under CLIENT_DEPRECATE_EOF.
pub fn eof_ok() -> Vec<u8> {
  vec![0xFE, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00]
}

/// Pre 5.7.5 EOF packet.
pub fn legacy_eof() -> Vec<u8> {
  vec![0xFE, 0x00, 0x00, 0x02, 0x00]
}

pub fn err(code: u16, state: &str, message: &str) -> Vec<u8> {
  let mut b = vec![0xFF];
  b.extend_from_slice(&code.to_le_bytes());
  b.push(b'#');
  b.extend_from_slice(state.as_bytes());
  b.extend_from_slice(message.as_bytes());
  b
}

pub fn auth_switch(plugin: &str, nonce: &[u8]) -> Vec<u8> {
  let mut b = vec![0xFE];
  b.extend_from_slice(plugin.as_bytes());
  b.push(0);
  b.extend_from_slice(nonce);
  b.push(0);
  b
}

pub fn prepare_ok(statement_id: u32, columns: u16, params: u16) -> Vec<u8> {
  let mut b = vec![0x00];
  b.extend_from_slice(&statement_id.to_le_bytes());
  b.extend_from_slice(&columns.to_le_bytes());
  b.extend_from_slice(&params.to_le_bytes());
  b.push(0);
  b.extend_from_slice(&0u16.to_le_bytes());
  b
}

/// HandshakeResponse41 as decoded by the server.
#[derive(Debug)]
pub struct ClientHello {
  pub capabilities: CapabilityFlags,
  pub collation: u8,
  pub user: String,
  pub auth_response: Vec<u8>,
  pub database: Option<String>,
  pub auth_plugin_name: String,
}

fn get_cstr(b: &mut &[u8]) -> String {
  let pos = b.iter().position(|x| *x == 0).expect("missing NUL terminator");
  let s = String::from_utf8(b[..pos].to_vec()).unwrap();
  b.advance(pos + 1);
  s
}

impl ClientHello {
  pub fn parse(mut b: &[u8]) -> Self {
    let capabilities = CapabilityFlags::from_bits_truncate(b.get_u32_le());
    let _max_packet_size = b.get_u32_le();
    let collation = b.get_u8();
    assert_eq!(&b[..23], &[0; 23][..]);
    b.advance(23);
    let user = get_cstr(&mut b);
    let len = b.get_u8() as usize;
    assert!(len < 251);
    let auth_response = b[..len].to_vec();
    b.advance(len);
    let database = if capabilities.contains(CapabilityFlags::CLIENT_CONNECT_WITH_DB) {
      Some(get_cstr(&mut b))
    } else {
      None
    };
    let auth_plugin_name = get_cstr(&mut b);
    assert!(b.is_empty());

    Self {
      capabilities,
      collation,
      user,
      auth_response,
      database,
      auth_plugin_name,
    }
  }
}

pub struct MockServer {
  stream: DuplexStream,
}

impl MockServer {
  pub async fn write_packet(&mut self, sequence_id: u8, payload: &[u8]) {
    let mut b = BytesMut::with_capacity(4 + payload.len());
    b.put_uint_le(payload.len() as u64, 3);
    b.put_u8(sequence_id);
    b.put_slice(payload);
    self.stream.write_all(&b).await.unwrap();
  }

  pub async fn read_packet(&mut self) -> (u8, Vec<u8>) {
    let mut header = [0u8; 4];
    self.stream.read_exact(&mut header).await.unwrap();
    let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
    let mut payload = vec![0u8; len];
    self.stream.read_exact(&mut payload).await.unwrap();
    (header[3], payload)
  }

  pub async fn expect_packet(&mut self, sequence_id: u8, payload: &[u8]) {
    let (actual_sequence_id, actual) = self.read_packet().await;
    assert_eq!(actual, payload);
    assert_eq!(actual_sequence_id, sequence_id);
  }

  /// Waits for the client to close its end of the stream.
  pub async fn expect_eof(&mut self) {
    let mut buf = [0u8; 16];
    assert_eq!(self.stream.read(&mut buf).await.unwrap(), 0);
  }

  /// Sends the greeting and reads the handshake response.
  pub async fn greet(&mut self, capabilities: CapabilityFlags, plugin: &str) -> ClientHello {
    self.write_packet(0, &greeting(capabilities, plugin)).await;
    let (sequence_id, payload) = self.read_packet().await;
    assert_eq!(sequence_id, 1);
    ClientHello::parse(&payload)
  }

  /// Full handshake accepting whatever credentials were sent.
  pub async fn accept(&mut self, capabilities: CapabilityFlags, plugin: &str) -> ClientHello {
    let hello = self.greet(capabilities, plugin).await;
    self.write_packet(2, &ok(0, 0)).await;
    hello
  }
}
