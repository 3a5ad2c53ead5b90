//! Byte streams a connection can run on.

use super::config::{ConnectionOptions, Host, TlsMode};
use super::error::{DriverError, DriverResult};
use futures::future::BoxFuture;
use pin_project::pin_project;
use rustls::pki_types::ServerName;
use std::io;
use std::mem;
use std::net::{SocketAddrV4, SocketAddrV6};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::net::{lookup_host, TcpStream};
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

/// A duplex byte stream, optionally able to switch to TLS in place.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {
  /// Whether `start_tls` can be attempted on this stream.
  fn supports_tls(&self) -> bool {
    false
  }

  /// Whether bytes currently travel encrypted.
  fn is_tls(&self) -> bool {
    false
  }

  /// Performs the TLS handshake over the current stream. Every byte written or read afterwards is
  /// TLS application data.
  fn start_tls(&mut self) -> BoxFuture<'_, DriverResult<()>> {
    Box::pin(async { Err(DriverError::TlsNotSupported) })
  }
}

impl Transport for TcpStream {}

#[cfg(unix)]
impl Transport for UnixStream {}

impl Transport for DuplexStream {}

#[derive(Debug)]
pub enum PlainStream {
  Tcp(TcpStream),
  #[cfg(unix)]
  Unix(UnixStream),
}

impl AsyncRead for PlainStream {
  fn poll_read(
    self: Pin<&mut Self>,
    cx: &mut Context<'_>,
    buf: &mut ReadBuf<'_>,
  ) -> Poll<io::Result<()>> {
    match self.get_mut() {
      PlainStream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
      #[cfg(unix)]
      PlainStream::Unix(s) => Pin::new(s).poll_read(cx, buf),
    }
  }
}

impl AsyncWrite for PlainStream {
  fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
    match self.get_mut() {
      PlainStream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
      #[cfg(unix)]
      PlainStream::Unix(s) => Pin::new(s).poll_write(cx, buf),
    }
  }

  fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    match self.get_mut() {
      PlainStream::Tcp(s) => Pin::new(s).poll_flush(cx),
      #[cfg(unix)]
      PlainStream::Unix(s) => Pin::new(s).poll_flush(cx),
    }
  }

  fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    match self.get_mut() {
      PlainStream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
      #[cfg(unix)]
      PlainStream::Unix(s) => Pin::new(s).poll_shutdown(cx),
    }
  }
}

#[pin_project(project = InnerProj)]
enum Inner {
  Plain(#[pin] PlainStream),
  Tls(#[pin] Box<TlsStream<PlainStream>>),
  // Only observable if a TLS handshake failed midway.
  Detached,
}

struct TlsContext {
  connector: TlsConnector,
  server_name: ServerName<'static>,
}

/// TCP or Unix domain socket, upgradable to TLS when it was opened with a TLS context.
#[pin_project]
pub struct Socket {
  #[pin]
  inner: Inner,
  tls: Option<TlsContext>,
}

impl Socket {
  /// Opens the socket described by `opts`, without exchanging any protocol message.
  pub async fn connect(opts: &ConnectionOptions) -> DriverResult<Self> {
    #[cfg(unix)]
    if let Some(path) = opts.socket() {
      debug!(path = %path.display(), "connecting to unix socket");
      let stream = UnixStream::connect(path).await?;
      return Self::with_tls_context(PlainStream::Unix(stream), opts);
    }

    let port = opts.port();
    let addr = match opts.host() {
      Host::Domain(domain) => {
        let mut hosts = lookup_host(format!("{}:{}", domain, port)).await?;
        hosts
          .next()
          .ok_or_else(|| DriverError::UnreachableHost(domain.clone()))
      }
      Host::V4(ipv4) => Ok(SocketAddrV4::new(*ipv4, port).into()),
      Host::V6(ipv6) => Ok(SocketAddrV6::new(*ipv6, port, 0, 0).into()),
    }?;

    debug!(%addr, "connecting to tcp socket");
    let stream = TcpStream::connect(&addr).await?;
    stream.set_nodelay(true)?;

    Self::with_tls_context(PlainStream::Tcp(stream), opts)
  }

  // Unix sockets verify the certificate against the configured host, unless a server name is set.
  fn with_tls_context(stream: PlainStream, opts: &ConnectionOptions) -> DriverResult<Self> {
    let mut socket = Self::plain(stream);
    if opts.tls_mode() != TlsMode::Disable {
      socket.tls = Some(TlsContext {
        connector: opts.tls().connector()?,
        server_name: opts.tls().server_name(opts.host())?,
      });
    }
    Ok(socket)
  }

  pub fn plain(stream: PlainStream) -> Self {
    Self {
      inner: Inner::Plain(stream),
      tls: None,
    }
  }
}

impl Transport for Socket {
  fn supports_tls(&self) -> bool {
    self.tls.is_some() && matches!(self.inner, Inner::Plain(_))
  }

  fn is_tls(&self) -> bool {
    matches!(self.inner, Inner::Tls(_))
  }

  fn start_tls(&mut self) -> BoxFuture<'_, DriverResult<()>> {
    Box::pin(async move {
      let (connector, server_name) = match self.tls {
        Some(ref ctx) => (ctx.connector.clone(), ctx.server_name.clone()),
        None => return Err(DriverError::TlsNotSupported),
      };

      let plain = match mem::replace(&mut self.inner, Inner::Detached) {
        Inner::Plain(stream) => stream,
        other => {
          self.inner = other;
          return Err(DriverError::Tls("socket is not in plain text mode".into()));
        }
      };

      let stream = connector
        .connect(server_name, plain)
        .await
        .map_err(DriverError::TlsHandshake)?;
      self.inner = Inner::Tls(Box::new(stream));
      Ok(())
    })
  }
}

fn detached() -> io::Error {
  io::Error::new(io::ErrorKind::NotConnected, "socket was lost during a TLS handshake")
}

impl AsyncRead for Socket {
  fn poll_read(
    self: Pin<&mut Self>,
    cx: &mut Context<'_>,
    buf: &mut ReadBuf<'_>,
  ) -> Poll<io::Result<()>> {
    match self.project().inner.project() {
      InnerProj::Plain(s) => s.poll_read(cx, buf),
      InnerProj::Tls(s) => s.poll_read(cx, buf),
      InnerProj::Detached => Poll::Ready(Err(detached())),
    }
  }
}

impl AsyncWrite for Socket {
  fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
    match self.project().inner.project() {
      InnerProj::Plain(s) => s.poll_write(cx, buf),
      InnerProj::Tls(s) => s.poll_write(cx, buf),
      InnerProj::Detached => Poll::Ready(Err(detached())),
    }
  }

  fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    match self.project().inner.project() {
      InnerProj::Plain(s) => s.poll_flush(cx),
      InnerProj::Tls(s) => s.poll_flush(cx),
      InnerProj::Detached => Poll::Ready(Err(detached())),
    }
  }

  // For TLS this sends close_notify before shutting down the socket.
  fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    match self.project().inner.project() {
      InnerProj::Plain(s) => s.poll_shutdown(cx),
      InnerProj::Tls(s) => s.poll_shutdown(cx),
      InnerProj::Detached => Poll::Ready(Ok(())),
    }
  }
}
