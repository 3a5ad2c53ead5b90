use super::codec::{lenc_uint_len, BufExt, BufMutExt, LENC_NULL};
use super::error::{DriverError, DriverResult, UpstreamError};
use super::value::Value;
use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::convert::TryFrom;
use std::ops::Index;

pub const MAX_PACKET_SIZE: u32 = 16_777_216;

const OK_HEADER: u8 = 0x00;
const AUTH_MORE_DATA_HEADER: u8 = 0x01;
const LOCAL_INFILE_HEADER: u8 = 0xFB;
const EOF_HEADER: u8 = 0xFE;
const ERR_HEADER: u8 = 0xFF;

// https://dev.mysql.com/doc/dev/mysql-server/latest/group__group__cs__column__definition__flags.html
bitflags! {
  pub struct ColumnFlags: u16 {
    const NOT_NULL = 0x0001;
    const PRIMARY_KEY = 0x0002;
    const UNIQUE_KEY = 0x0004;
    const MULTIPLE_KEY = 0x0008;
    const BLOB = 0x0010;
    const UNSIGNED = 0x0020;
    const ZEROFILL = 0x0040;
    const BINARY = 0x0080;
    const ENUM = 0x0100;
    const AUTO_INCREMENT = 0x0200;
    const TIMESTAMP = 0x0400;
    const SET = 0x0800;
    const NO_DEFAULT_VALUE = 0x1000;
    const ON_UPDATE_NOW = 0x2000;
  }
}

// https://dev.mysql.com/doc/dev/mysql-server/latest/group__group__cs__capabilities__flags.html
bitflags! {
  pub struct CapabilityFlags: u32 {
    const CLIENT_LONG_PASSWORD = 0x00000001;
    const CLIENT_FOUND_ROWS = 0x00000002;
    const CLIENT_LONG_FLAG = 0x00000004;
    const CLIENT_CONNECT_WITH_DB = 0x00000008;
    const CLIENT_NO_SCHEMA = 0x00000010;
    const CLIENT_COMPRESS = 0x00000020;
    const CLIENT_ODBC = 0x00000040;
    const CLIENT_LOCAL_FILES = 0x00000080;
    const CLIENT_IGNORE_SPACE = 0x00000100;
    const CLIENT_PROTOCOL_41 = 0x00000200;
    const CLIENT_INTERACTIVE = 0x00000400;
    const CLIENT_SSL = 0x00000800;
    const CLIENT_IGNORE_SIGPIPE = 0x00001000;
    const CLIENT_TRANSACTIONS = 0x00002000;
    const CLIENT_RESERVED = 0x00004000;
    const CLIENT_SECURE_CONNECTION = 0x00008000;
    const CLIENT_MULTI_STATEMENTS = 0x00010000;
    const CLIENT_MULTI_RESULTS = 0x00020000;
    const CLIENT_PS_MULTI_RESULTS = 0x00040000;
    const CLIENT_PLUGIN_AUTH = 0x00080000;
    const CLIENT_CONNECT_ATTRS = 0x00100000;
    const CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA = 0x00200000;
    const CLIENT_CAN_HANDLE_EXPIRED_PASSWORDS = 0x00400000;
    const CLIENT_SESSION_TRACK = 0x00800000;
    const CLIENT_DEPRECATE_EOF = 0x01000000;
    const CLIENT_SSL_VERIFY_SERVER_CERT = 0x40000000;
    const CLIENT_REMEMBER_OPTIONS = 0x80000000;
  }
}

bitflags! {
  pub struct StatusFlags: u16 {
    const SERVER_STATUS_IN_TRANS = 0x0001;
    const SERVER_STATUS_AUTOCOMMIT = 0x0002;
    const SERVER_MORE_RESULTS_EXISTS = 0x0008;
    const SERVER_STATUS_NO_GOOD_INDEX_USED = 0x0010;
    const SERVER_STATUS_NO_INDEX_USED = 0x0020;
    const SERVER_STATUS_CURSOR_EXISTS = 0x0040;
    const SERVER_STATUS_LAST_ROW_SENT = 0x0080;
    const SERVER_STATUS_DB_DROPPED = 0x0100;
    const SERVER_STATUS_NO_BACKSLASH_ESCAPES = 0x0200;
    const SERVER_STATUS_METADATA_CHANGED = 0x0400;
    const SERVER_QUERY_WAS_SLOW = 0x0800;
    const SERVER_PS_OUT_PARAMS = 0x1000;
    const SERVER_STATUS_IN_TRANS_READONLY = 0x2000;
    const SERVER_SESSION_STATE_CHANGED = 0x4000;
  }
}

macro_rules! collations {
  ($($name:ident = $id:literal),+ $(,)?) => {
    /// Connection collations, sent as a single byte during the handshake.
    /// https://dev.mysql.com/doc/refman/8.0/en/charset-mysql.html
    #[allow(non_camel_case_types)]
    #[repr(u8)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Collation {
      $($name = $id),+
    }

    impl Collation {
      pub fn from_id(id: u16) -> Option<Self> {
        match id {
          $($id => Some(Collation::$name),)+
          _ => None,
        }
      }
    }
  };
}

collations! {
  BIG5_CHINESE_CI = 1,
  DEC8_SWEDISH_CI = 3,
  CP850_GENERAL_CI = 4,
  KOI8R_GENERAL_CI = 7,
  LATIN1_SWEDISH_CI = 8,
  LATIN2_GENERAL_CI = 9,
  ASCII_GENERAL_CI = 11,
  UJIS_JAPANESE_CI = 12,
  SJIS_JAPANESE_CI = 13,
  HEBREW_GENERAL_CI = 16,
  EUCKR_KOREAN_CI = 19,
  GB2312_CHINESE_CI = 24,
  GREEK_GENERAL_CI = 25,
  CP1250_GENERAL_CI = 26,
  GBK_CHINESE_CI = 28,
  LATIN5_TURKISH_CI = 30,
  UTF8_GENERAL_CI = 33,
  UCS2_GENERAL_CI = 35,
  UTF8MB4_GENERAL_CI = 45,
  UTF8MB4_BIN = 46,
  LATIN1_BIN = 47,
  CP1251_GENERAL_CI = 51,
  UTF16_GENERAL_CI = 54,
  UTF32_GENERAL_CI = 60,
  BINARY = 63,
  UTF8_BIN = 83,
  UTF8MB4_UNICODE_CI = 224,
  GB18030_CHINESE_CI = 248,
  UTF8MB4_0900_AI_CI = 255,
}

#[allow(non_camel_case_types)]
#[derive(Clone, Eq, PartialEq, Copy, Debug)]
#[repr(u8)]
pub enum Command {
  COM_QUIT = 0x01_u8,
  COM_QUERY = 0x03_u8,
  COM_PING = 0x0e_u8,
  COM_STMT_PREPARE = 0x16_u8,
  COM_STMT_EXECUTE = 0x17_u8,
  COM_STMT_CLOSE = 0x19_u8,
}

/// Type of MySql column field
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum ColumnType {
  MYSQL_TYPE_DECIMAL = 0x00,
  MYSQL_TYPE_TINY = 0x01,
  MYSQL_TYPE_SHORT = 0x02,
  MYSQL_TYPE_LONG = 0x03,
  MYSQL_TYPE_FLOAT = 0x04,
  MYSQL_TYPE_DOUBLE = 0x05,
  MYSQL_TYPE_NULL = 0x06,
  MYSQL_TYPE_TIMESTAMP = 0x07,
  MYSQL_TYPE_LONGLONG = 0x08,
  MYSQL_TYPE_INT24 = 0x09,
  MYSQL_TYPE_DATE = 0x0a,
  MYSQL_TYPE_TIME = 0x0b,
  MYSQL_TYPE_DATETIME = 0x0c,
  MYSQL_TYPE_YEAR = 0x0d,
  MYSQL_TYPE_NEWDATE = 0x0e,
  MYSQL_TYPE_VARCHAR = 0x0f,
  MYSQL_TYPE_BIT = 0x10,
  MYSQL_TYPE_TIMESTAMP2 = 0x11,
  MYSQL_TYPE_DATETIME2 = 0x12,
  MYSQL_TYPE_TIME2 = 0x13,
  MYSQL_TYPE_JSON = 0xf5,
  MYSQL_TYPE_NEWDECIMAL = 0xf6,
  MYSQL_TYPE_ENUM = 0xf7,
  MYSQL_TYPE_SET = 0xf8,
  MYSQL_TYPE_TINY_BLOB = 0xf9,
  MYSQL_TYPE_MEDIUM_BLOB = 0xfa,
  MYSQL_TYPE_LONG_BLOB = 0xfb,
  MYSQL_TYPE_BLOB = 0xfc,
  MYSQL_TYPE_VAR_STRING = 0xfd,
  MYSQL_TYPE_STRING = 0xfe,
  MYSQL_TYPE_GEOMETRY = 0xff,
}

impl TryFrom<u8> for ColumnType {
  type Error = DriverError;

  fn try_from(x: u8) -> DriverResult<ColumnType> {
    match x {
      0x00_u8 => Ok(ColumnType::MYSQL_TYPE_DECIMAL),
      0x01_u8 => Ok(ColumnType::MYSQL_TYPE_TINY),
      0x02_u8 => Ok(ColumnType::MYSQL_TYPE_SHORT),
      0x03_u8 => Ok(ColumnType::MYSQL_TYPE_LONG),
      0x04_u8 => Ok(ColumnType::MYSQL_TYPE_FLOAT),
      0x05_u8 => Ok(ColumnType::MYSQL_TYPE_DOUBLE),
      0x06_u8 => Ok(ColumnType::MYSQL_TYPE_NULL),
      0x07_u8 => Ok(ColumnType::MYSQL_TYPE_TIMESTAMP),
      0x08_u8 => Ok(ColumnType::MYSQL_TYPE_LONGLONG),
      0x09_u8 => Ok(ColumnType::MYSQL_TYPE_INT24),
      0x0a_u8 => Ok(ColumnType::MYSQL_TYPE_DATE),
      0x0b_u8 => Ok(ColumnType::MYSQL_TYPE_TIME),
      0x0c_u8 => Ok(ColumnType::MYSQL_TYPE_DATETIME),
      0x0d_u8 => Ok(ColumnType::MYSQL_TYPE_YEAR),
      0x0e_u8 => Ok(ColumnType::MYSQL_TYPE_NEWDATE),
      0x0f_u8 => Ok(ColumnType::MYSQL_TYPE_VARCHAR),
      0x10_u8 => Ok(ColumnType::MYSQL_TYPE_BIT),
      0x11_u8 => Ok(ColumnType::MYSQL_TYPE_TIMESTAMP2),
      0x12_u8 => Ok(ColumnType::MYSQL_TYPE_DATETIME2),
      0x13_u8 => Ok(ColumnType::MYSQL_TYPE_TIME2),
      0xf5_u8 => Ok(ColumnType::MYSQL_TYPE_JSON),
      0xf6_u8 => Ok(ColumnType::MYSQL_TYPE_NEWDECIMAL),
      0xf7_u8 => Ok(ColumnType::MYSQL_TYPE_ENUM),
      0xf8_u8 => Ok(ColumnType::MYSQL_TYPE_SET),
      0xf9_u8 => Ok(ColumnType::MYSQL_TYPE_TINY_BLOB),
      0xfa_u8 => Ok(ColumnType::MYSQL_TYPE_MEDIUM_BLOB),
      0xfb_u8 => Ok(ColumnType::MYSQL_TYPE_LONG_BLOB),
      0xfc_u8 => Ok(ColumnType::MYSQL_TYPE_BLOB),
      0xfd_u8 => Ok(ColumnType::MYSQL_TYPE_VAR_STRING),
      0xfe_u8 => Ok(ColumnType::MYSQL_TYPE_STRING),
      0xff_u8 => Ok(ColumnType::MYSQL_TYPE_GEOMETRY),
      _ => Err(DriverError::MalformedPacket(format!(
        "unknown column type {:#04X}",
        x
      ))),
    }
  }
}

fn lossy(bytes: Bytes) -> String {
  String::from_utf8_lossy(&bytes).into_owned()
}

// Server side payloads sometimes end with a \0 that is not part of the data.
fn strip_trailing_nul(mut data: Vec<u8>) -> Vec<u8> {
  if data.last() == Some(&0) {
    data.pop();
  }
  data
}

/// Initial handshake sent by the server as soon as the socket is opened.
/// https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_connection_phase_packets_protocol_handshake_v10.html
#[derive(Debug)]
pub struct Handshake {
  protocol_version: u8,
  server_version: String,
  connection_id: u32,
  capabilities: CapabilityFlags,
  collation: u8,
  status_flags: StatusFlags,
  nonce: Vec<u8>,
  auth_plugin_name: Option<String>,
}

impl Handshake {
  pub fn parse(mut b: &[u8]) -> DriverResult<Self> {
    let protocol_version = b.safe_get_u8()?;
    if protocol_version != 10 {
      return Err(DriverError::UnsupportedProtocol(protocol_version));
    }

    let server_version = lossy(b.safe_get_null_terminated_bytes()?);
    let connection_id = b.safe_get_u32_le()?;
    let mut nonce = b.safe_get_fixed_bytes(8)?.to_vec();
    b.safe_get_u8()?;
    let capabilities_1 = b.safe_get_u16_le()?;
    let collation = b.safe_get_u8()?;
    let status_flags = StatusFlags::from_bits_truncate(b.safe_get_u16_le()?);
    let capabilities_2 = b.safe_get_u16_le()?;
    let auth_plugin_data_len = b.safe_get_u8()?;
    b.safe_get_fixed_bytes(10)?;

    let capabilities =
      CapabilityFlags::from_bits_truncate(capabilities_1 as u32 | ((capabilities_2 as u32) << 16));

    if capabilities.contains(CapabilityFlags::CLIENT_SECURE_CONNECTION) {
      // Includes a trailing \0 which is not part of the nonce.
      let len = (auth_plugin_data_len as usize).saturating_sub(8).max(13);
      let scramble_2 = b.safe_get_fixed_bytes(len)?;
      nonce = strip_trailing_nul([nonce, scramble_2.to_vec()].concat());
    }

    let mut auth_plugin_name = None;
    if capabilities.contains(CapabilityFlags::CLIENT_PLUGIN_AUTH) && b.has_remaining() {
      // Some server versions omit the terminating \0.
      let name = if b.contains(&0) {
        b.safe_get_null_terminated_bytes()?
      } else {
        b.safe_get_eof_bytes()?
      };
      auth_plugin_name = Some(lossy(name));
    }

    Ok(Self {
      protocol_version,
      server_version,
      connection_id,
      capabilities,
      collation,
      status_flags,
      nonce,
      auth_plugin_name,
    })
  }

  pub fn protocol_version(&self) -> u8 {
    self.protocol_version
  }

  pub fn server_version(&self) -> &str {
    &self.server_version
  }

  pub fn connection_id(&self) -> u32 {
    self.connection_id
  }

  pub fn capabilities(&self) -> CapabilityFlags {
    self.capabilities
  }

  pub fn collation(&self) -> u8 {
    self.collation
  }

  pub fn status_flags(&self) -> StatusFlags {
    self.status_flags
  }

  /// Challenge used by the authentication plugins, 20 bytes for every supported server.
  pub fn nonce(&self) -> &[u8] {
    &self.nonce
  }

  pub fn auth_plugin_name(&self) -> Option<&str> {
    self.auth_plugin_name.as_deref()
  }
}

/// Fixed prefix shared by the SSL request and the full handshake response.
fn write_client_capabilities(b: &mut BytesMut, capabilities: CapabilityFlags, collation: u8) {
  b.put_u32_le(capabilities.bits());
  b.put_u32_le(MAX_PACKET_SIZE);
  b.put_u8(collation);
  b.put_slice(&[0; 23]);
}

/// Abbreviated handshake response asking the server to switch to TLS.
/// https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_connection_phase_packets_protocol_ssl_request.html
pub fn ssl_request(capabilities: CapabilityFlags, collation: u8) -> BytesMut {
  let mut b = BytesMut::with_capacity(32);
  write_client_capabilities(&mut b, capabilities, collation);
  b
}

/// https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_connection_phase_packets_protocol_handshake_response.html
#[derive(Debug)]
pub struct HandshakeResponse<'a> {
  pub capabilities: CapabilityFlags,
  pub collation: u8,
  pub user: &'a str,
  pub auth_response: &'a [u8],
  pub database: Option<&'a str>,
  pub auth_plugin_name: &'a str,
}

impl HandshakeResponse<'_> {
  pub fn serialize(&self) -> BytesMut {
    let auth_response_len = self.auth_response.len();
    let mut b = BytesMut::with_capacity(
      32 + self.user.len()
        + lenc_uint_len(auth_response_len as u64)
        + auth_response_len
        + self.database.map(str::len).unwrap_or(0)
        + self.auth_plugin_name.len()
        + 3,
    );
    write_client_capabilities(&mut b, self.capabilities, self.collation);
    b.put_null_terminated(self.user.as_bytes());

    if self
      .capabilities
      .contains(CapabilityFlags::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA)
    {
      b.put_lenc_bytes(self.auth_response);
    } else if self
      .capabilities
      .contains(CapabilityFlags::CLIENT_SECURE_CONNECTION)
    {
      b.put_u8(self.auth_response.len() as u8);
      b.put_slice(self.auth_response);
    } else {
      b.put_null_terminated(self.auth_response);
    }

    if self
      .capabilities
      .contains(CapabilityFlags::CLIENT_CONNECT_WITH_DB)
    {
      b.put_null_terminated(self.database.unwrap_or("").as_bytes());
    }

    if self.capabilities.contains(CapabilityFlags::CLIENT_PLUGIN_AUTH) {
      b.put_null_terminated(self.auth_plugin_name.as_bytes());
    }
    b
  }
}

/// Sent by the server to make the client authenticate with another plugin.
#[derive(Debug, PartialEq, Eq)]
pub struct AuthSwitchRequest {
  auth_plugin_name: String,
  nonce: Vec<u8>,
}

impl AuthSwitchRequest {
  pub fn parse(mut b: &[u8]) -> DriverResult<Self> {
    let _header = b.safe_get_u8()?;
    let auth_plugin_name = lossy(b.safe_get_null_terminated_bytes()?);
    let nonce = strip_trailing_nul(b.safe_get_eof_bytes()?.to_vec());
    Ok(Self {
      auth_plugin_name,
      nonce,
    })
  }

  pub fn auth_plugin_name(&self) -> &str {
    &self.auth_plugin_name
  }

  pub fn nonce(&self) -> &[u8] {
    &self.nonce
  }
}

/// Plugin specific data exchanged during authentication.
#[derive(Debug, PartialEq, Eq)]
pub struct AuthMoreData(Bytes);

impl AuthMoreData {
  pub fn parse(mut b: &[u8]) -> DriverResult<Self> {
    let _header = b.safe_get_u8()?;
    Ok(Self(b.safe_get_eof_bytes()?))
  }

  pub fn data(&self) -> &[u8] {
    &self.0
  }
}

// https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_basic_err_packet.html
#[derive(Debug)]
pub struct ServerError {
  error_code: u16,
  state: String,
  error_message: String,
}

impl ServerError {
  pub fn parse(mut b: &[u8]) -> DriverResult<Self> {
    let _header = b.safe_get_u8()?;
    let error_code = b.safe_get_u16_le()?;

    let mut state = String::new();
    if b.first() == Some(&b'#') {
      b.advance(1);
      state = lossy(b.safe_get_fixed_bytes(5)?);
    }

    let error_message = lossy(b.safe_get_eof_bytes()?);
    Ok(Self {
      error_code,
      state,
      error_message,
    })
  }

  pub fn error_code(&self) -> u16 {
    self.error_code
  }
}

impl From<ServerError> for UpstreamError {
  fn from(err: ServerError) -> Self {
    UpstreamError {
      code: err.error_code,
      sql_state: err.state,
      message: err.error_message,
    }
  }
}

impl From<ServerError> for DriverError {
  fn from(err: ServerError) -> Self {
    DriverError::Upstream(err.into())
  }
}

// https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_basic_ok_packet.html
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerOk {
  affected_rows: u64,
  last_inserted_id: u64,
  status_flags: StatusFlags,
  warnings: u16,
  info: String,
}

impl ServerOk {
  pub fn parse(mut b: &[u8], capability_flags: CapabilityFlags) -> DriverResult<Self> {
    let _header = b.safe_get_u8()?;
    let affected_rows = b.safe_get_lenc_uint()?;
    let last_inserted_id = b.safe_get_lenc_uint()?;
    let status_flags = StatusFlags::from_bits_truncate(b.safe_get_u16_le()?);
    let warnings = b.safe_get_u16_le()?;

    let info = if capability_flags.contains(CapabilityFlags::CLIENT_SESSION_TRACK) {
      if b.has_remaining() {
        lossy(b.safe_get_lenc_bytes()?)
      } else {
        String::new()
      }
    } else {
      lossy(b.safe_get_eof_bytes()?)
    };

    Ok(Self {
      affected_rows,
      last_inserted_id,
      status_flags,
      warnings,
      info,
    })
  }

  /// Legacy EOF packet, used instead of OK when CLIENT_DEPRECATE_EOF was not negotiated.
  /// https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_basic_eof_packet.html
  pub fn parse_eof(mut b: &[u8]) -> DriverResult<Self> {
    let _header = b.safe_get_u8()?;
    let warnings = b.safe_get_u16_le()?;
    let status_flags = StatusFlags::from_bits_truncate(b.safe_get_u16_le()?);
    Ok(Self {
      status_flags,
      warnings,
      ..Default::default()
    })
  }

  pub fn affected_rows(&self) -> u64 {
    self.affected_rows
  }
  pub fn last_inserted_id(&self) -> u64 {
    self.last_inserted_id
  }
  pub fn status_flags(&self) -> StatusFlags {
    self.status_flags
  }
  pub fn warnings(&self) -> u16 {
    self.warnings
  }
  pub fn info(&self) -> &str {
    &self.info
  }
}

impl Default for StatusFlags {
  fn default() -> Self {
    StatusFlags::empty()
  }
}

/// Column definition, one per column of a resultset and one per prepared statement parameter.
/// https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_com_query_response_text_resultset_column_definition.html
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
  schema: String,
  table: String,
  org_table: String,
  name: String,
  org_name: String,
  collation: u16,
  column_length: u32,
  column_type: ColumnType,
  flags: ColumnFlags,
  decimals: u8,
}

impl Column {
  pub fn parse(mut b: &[u8]) -> DriverResult<Self> {
    let _catalog = b.safe_get_lenc_bytes()?;
    let schema = lossy(b.safe_get_lenc_bytes()?);
    let table = lossy(b.safe_get_lenc_bytes()?);
    let org_table = lossy(b.safe_get_lenc_bytes()?);
    let name = lossy(b.safe_get_lenc_bytes()?);
    let org_name = lossy(b.safe_get_lenc_bytes()?);
    let _fixed_len = b.safe_get_lenc_uint()?;
    let collation = b.safe_get_u16_le()?;
    let column_length = b.safe_get_u32_le()?;
    let column_type = ColumnType::try_from(b.safe_get_u8()?)?;
    let flags = ColumnFlags::from_bits_truncate(b.safe_get_u16_le()?);
    let decimals = b.safe_get_u8()?;

    Ok(Self {
      schema,
      table,
      org_table,
      name,
      org_name,
      collation,
      column_length,
      column_type,
      flags,
      decimals,
    })
  }

  pub fn database(&self) -> &str {
    &self.schema
  }

  /// Table name, or its alias.
  pub fn table(&self) -> &str {
    &self.table
  }

  pub fn original_table(&self) -> &str {
    &self.org_table
  }

  /// Column name, or its alias.
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn original_name(&self) -> &str {
    &self.org_name
  }

  pub fn column_type(&self) -> ColumnType {
    self.column_type
  }

  pub fn collation_id(&self) -> u16 {
    self.collation
  }

  pub fn collation(&self) -> Option<Collation> {
    Collation::from_id(self.collation)
  }

  /// Maximum length of the column, in bytes.
  pub fn column_length(&self) -> u32 {
    self.column_length
  }

  pub fn decimals(&self) -> u8 {
    self.decimals
  }

  pub fn flags(&self) -> ColumnFlags {
    self.flags
  }

  pub fn is_not_null(&self) -> bool {
    self.flags.contains(ColumnFlags::NOT_NULL)
  }

  pub fn is_primary_key(&self) -> bool {
    self.flags.contains(ColumnFlags::PRIMARY_KEY)
  }

  pub fn is_auto_increment(&self) -> bool {
    self.flags.contains(ColumnFlags::AUTO_INCREMENT)
  }

  pub fn is_unsigned(&self) -> bool {
    self.flags.contains(ColumnFlags::UNSIGNED)
  }

  pub fn is_zerofill(&self) -> bool {
    self.flags.contains(ColumnFlags::ZEROFILL)
  }
}

/// First reply to COM_STMT_PREPARE.
/// https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_com_stmt_prepare.html
#[derive(Debug, PartialEq, Eq)]
pub struct StmtPrepareOk {
  statement_id: u32,
  column_count: u16,
  param_count: u16,
  warnings: u16,
}

impl StmtPrepareOk {
  pub fn parse(mut b: &[u8]) -> DriverResult<Self> {
    let _header = b.safe_get_u8()?;
    let statement_id = b.safe_get_u32_le()?;
    let column_count = b.safe_get_u16_le()?;
    let param_count = b.safe_get_u16_le()?;
    let mut warnings = 0;
    if b.has_remaining() {
      let _filler = b.safe_get_u8()?;
      warnings = b.safe_get_u16_le()?;
    }

    Ok(Self {
      statement_id,
      column_count,
      param_count,
      warnings,
    })
  }

  pub fn statement_id(&self) -> u32 {
    self.statement_id
  }

  pub fn column_count(&self) -> u16 {
    self.column_count
  }

  pub fn param_count(&self) -> u16 {
    self.param_count
  }

  pub fn warnings(&self) -> u16 {
    self.warnings
  }
}

pub fn command(cmd: Command, body: &[u8]) -> BytesMut {
  let mut b = BytesMut::with_capacity(1 + body.len());
  b.put_u8(cmd as u8);
  b.put_slice(body);
  b
}

pub fn com_stmt_close(statement_id: u32) -> BytesMut {
  command(Command::COM_STMT_CLOSE, &statement_id.to_le_bytes())
}

/// https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_com_stmt_execute.html
pub fn com_stmt_execute(statement_id: u32, params: &[Value]) -> BytesMut {
  let mut b = BytesMut::with_capacity(1 + 4 + 1 + 4 + params.len() * 10);
  b.put_u8(Command::COM_STMT_EXECUTE as u8);
  b.put_u32_le(statement_id);
  b.put_u8(0x00); // CURSOR_TYPE_NO_CURSOR
  b.put_u32_le(1); // iteration count

  if params.is_empty() {
    return b;
  }

  let mut null_bitmap = vec![0u8; (params.len() + 7) / 8];
  for (i, param) in params.iter().enumerate() {
    if param.is_null() {
      null_bitmap[i / 8] |= 1 << (i % 8);
    }
  }
  b.put_slice(&null_bitmap);

  b.put_u8(1); // new_params_bound_flag
  for param in params {
    let (column_type, unsigned) = param.binary_type();
    b.put_u8(column_type as u8);
    b.put_u8(if unsigned { 0x80 } else { 0x00 });
  }

  for param in params {
    param.write_binary(&mut b);
  }
  b
}

/// A decoded resultset row, one value per column.
#[derive(Debug, Clone, PartialEq)]
pub struct Row(Vec<Value>);

impl Row {
  /// Decodes a row of a COM_QUERY resultset, where every field is a length encoded string.
  pub fn parse_text(mut b: &[u8], columns: &[Column]) -> DriverResult<Self> {
    let mut values = Vec::with_capacity(columns.len());
    for column in columns {
      if b.first() == Some(&LENC_NULL) {
        b.advance(1);
        values.push(Value::Null);
        continue;
      }

      let field = b.safe_get_lenc_bytes()?;
      values.push(Value::parse_text(
        &field,
        column.column_type(),
        column.is_unsigned(),
      )?);
    }
    Ok(Row(values))
  }

  /// Decodes a row of a COM_STMT_EXECUTE resultset.
  pub fn parse_binary(mut b: &[u8], columns: &[Column]) -> DriverResult<Self> {
    let header = b.safe_get_u8()?;
    if header != OK_HEADER {
      return Err(DriverError::MalformedPacket(format!(
        "invalid binary row header {:#04X}",
        header
      )));
    }

    // The first two bits of the bitmap are reserved.
    let null_bitmap = b.safe_get_fixed_bytes((columns.len() + 7 + 2) / 8)?;
    let mut values = Vec::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
      let bit = i + 2;
      if null_bitmap[bit / 8] & (1 << (bit % 8)) != 0 {
        values.push(Value::Null);
      } else {
        values.push(Value::parse_binary(
          &mut b,
          column.column_type(),
          column.is_unsigned(),
        )?);
      }
    }
    Ok(Row(values))
  }

  pub fn values(&self) -> &[Value] {
    &self.0
  }

  pub fn get(&self, i: usize) -> Option<&Value> {
    self.0.get(i)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn into_values(self) -> Vec<Value> {
    self.0
  }
}

impl Index<usize> for Row {
  type Output = Value;

  fn index(&self, i: usize) -> &Value {
    &self.0[i]
  }
}

#[derive(Debug)]
pub enum AuthResponse {
  Success(ServerOk),
  Failure(ServerError),
  AuthSwitch(AuthSwitchRequest),
  AuthMoreData(AuthMoreData),
}

#[derive(Debug)]
pub enum GenericResponse {
  ServerOk(ServerOk),
  ServerError(ServerError),
}

// https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_com_query_response.html
#[derive(Debug)]
pub enum QueryResponse {
  Success(ServerOk),
  Failure(ServerError),
  ResultSet(u64),
  LocalInfile,
}

#[derive(Debug)]
pub enum PrepareResponse {
  Success(StmtPrepareOk),
  Failure(ServerError),
}

#[derive(Debug)]
pub enum RowResponse {
  Success(ServerOk),
  Failure(ServerError),
  Row(Row),
}

/// A complete message received from the server, interpreted according to what was asked for.
#[derive(Debug, Clone)]
pub struct Payload(Bytes);

impl Payload {
  pub fn new(b: Bytes) -> Self {
    Self(b)
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.0
  }

  fn header(&self) -> DriverResult<u8> {
    self
      .0
      .first()
      .copied()
      .ok_or(DriverError::IncompleteMessage)
  }

  fn unexpected(&self, expected: &str) -> DriverError {
    DriverError::UnexpectedPacket(format!(
      "expected {}, got packet starting with {:#04X?}",
      expected,
      self.0.first()
    ))
  }

  // A 0xFE header is an OK packet when CLIENT_DEPRECATE_EOF is in use, otherwise a legacy EOF.
  fn is_eof(&self) -> bool {
    self.0.first() == Some(&EOF_HEADER) && self.0.len() < 0xFF_FFFF
  }

  fn parse_eof(&self, capabilities: CapabilityFlags) -> DriverResult<ServerOk> {
    if capabilities.contains(CapabilityFlags::CLIENT_DEPRECATE_EOF) {
      ServerOk::parse(&self.0, capabilities)
    } else {
      ServerOk::parse_eof(&self.0)
    }
  }

  pub fn as_handshake(&self) -> DriverResult<Handshake> {
    match self.header()? {
      ERR_HEADER => Err(ServerError::parse(&self.0)?.into()),
      _ => Handshake::parse(&self.0),
    }
  }

  pub fn as_auth_response(&self, capabilities: CapabilityFlags) -> DriverResult<AuthResponse> {
    match self.header()? {
      OK_HEADER => Ok(AuthResponse::Success(ServerOk::parse(
        &self.0,
        capabilities,
      )?)),
      ERR_HEADER => Ok(AuthResponse::Failure(ServerError::parse(&self.0)?)),
      EOF_HEADER => Ok(AuthResponse::AuthSwitch(AuthSwitchRequest::parse(&self.0)?)),
      AUTH_MORE_DATA_HEADER => Ok(AuthResponse::AuthMoreData(AuthMoreData::parse(&self.0)?)),
      _ => Err(self.unexpected("an authentication response")),
    }
  }

  pub fn as_generic_response(&self, capabilities: CapabilityFlags) -> DriverResult<GenericResponse> {
    match self.header()? {
      OK_HEADER => Ok(GenericResponse::ServerOk(ServerOk::parse(
        &self.0,
        capabilities,
      )?)),
      ERR_HEADER => Ok(GenericResponse::ServerError(ServerError::parse(&self.0)?)),
      _ => Err(self.unexpected("OK or ERR")),
    }
  }

  pub fn as_query_response(&self, capabilities: CapabilityFlags) -> DriverResult<QueryResponse> {
    match self.header()? {
      OK_HEADER => Ok(QueryResponse::Success(ServerOk::parse(
        &self.0,
        capabilities,
      )?)),
      ERR_HEADER => Ok(QueryResponse::Failure(ServerError::parse(&self.0)?)),
      LOCAL_INFILE_HEADER => Ok(QueryResponse::LocalInfile),
      _ => {
        let column_count = (&self.0[..]).safe_get_lenc_uint()?;
        Ok(QueryResponse::ResultSet(column_count))
      }
    }
  }

  pub fn as_prepare_response(&self) -> DriverResult<PrepareResponse> {
    match self.header()? {
      OK_HEADER => Ok(PrepareResponse::Success(StmtPrepareOk::parse(&self.0)?)),
      ERR_HEADER => Ok(PrepareResponse::Failure(ServerError::parse(&self.0)?)),
      _ => Err(self.unexpected("a COM_STMT_PREPARE response")),
    }
  }

  pub fn as_column_definition(&self) -> DriverResult<Column> {
    match self.header()? {
      ERR_HEADER => Err(ServerError::parse(&self.0)?.into()),
      _ => Column::parse(&self.0),
    }
  }

  /// EOF marking the end of column definitions on servers without CLIENT_DEPRECATE_EOF.
  pub fn as_metadata_eof(&self) -> DriverResult<ServerOk> {
    if self.is_eof() {
      ServerOk::parse_eof(&self.0)
    } else {
      Err(self.unexpected("EOF"))
    }
  }

  pub fn as_row_response(
    &self,
    capabilities: CapabilityFlags,
    columns: &[Column],
    binary: bool,
  ) -> DriverResult<RowResponse> {
    match self.header()? {
      ERR_HEADER => Ok(RowResponse::Failure(ServerError::parse(&self.0)?)),
      // A text row starting with 0xFE is a length encoded string of more than 2^24 bytes, which
      // never fits in a packet shorter than 0xFFFFFF.
      EOF_HEADER if self.is_eof() => Ok(RowResponse::Success(self.parse_eof(capabilities)?)),
      _ if binary => Ok(RowResponse::Row(Row::parse_binary(&self.0, columns)?)),
      _ => Ok(RowResponse::Row(Row::parse_text(&self.0, columns)?)),
    }
  }
}
