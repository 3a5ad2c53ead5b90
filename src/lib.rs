//! Asynchronous MYSQL client speaking the client/server protocol over TCP, Unix sockets and TLS.

pub mod auth;
pub mod channel;
pub mod codec;
pub mod config;
pub mod conn;
pub mod error;
pub mod handshake;
pub mod protocol;
pub mod stream;
pub mod tls;
pub mod value;

pub use config::{ConnectionOptions, Host, TlsMode};
pub use conn::{Connection, Resultset, Statement};
pub use error::{DriverError, DriverResult, UpstreamError};
pub use protocol::{Collation, Column, ColumnType, Row};
pub use stream::{Socket, Transport};
pub use tls::TlsOptions;
pub use value::{Date, DateTime, Time, Value};
