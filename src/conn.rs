use super::channel::Channel;
use super::config::ConnectionOptions;
use super::error::{DriverError, DriverResult};
use super::handshake;
use super::protocol::{
  com_stmt_close, com_stmt_execute, command, CapabilityFlags, Column, Command, GenericResponse,
  Payload, PrepareResponse, QueryResponse, Row, RowResponse, ServerOk, StatusFlags,
};
use super::stream::{Socket, Transport};
use super::value::Value;
use futures::stream::{self, Stream};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Upper bound on the column count announced by a resultset header.
const MAX_COLUMNS: u64 = u16::MAX as u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
  /// Transport is established, no protocol message was exchanged.
  Connected,
  /// Authenticated and ready for commands.
  Ready,
  /// An operation is waiting on the server. A connection left here had its operation cancelled
  /// midway and is out of sync.
  Busy,
  /// COM_QUIT was sent, only `close` remains.
  Quit,
  /// A fatal error happened, nothing else can be sent.
  Broken,
  Closed,
}

/// A single MYSQL session over a transport.
///
/// Commands are strictly sequential: a resultset mutably borrows the connection until it is
/// dropped, and a resultset dropped before being fully read leaves the connection unusable.
pub struct Connection<T: Transport = Socket> {
  channel: Channel<T>,
  opts: ConnectionOptions,
  state: State,
  capabilities: CapabilityFlags,
  server_version: String,
  connection_id: u32,
  last_ok: ServerOk,
  statements: HashSet<u32>,
  pending_resultset: bool,
}

impl Connection<Socket> {
  /// Opens the transport described by `opts`, without performing the handshake.
  pub async fn physical_connect(opts: impl Into<ConnectionOptions>) -> DriverResult<Self> {
    let opts = opts.into();
    let socket = Socket::connect(&opts).await?;
    Ok(Self::from_transport(socket, opts))
  }

  /// Establish an authenticated connection to MYSQL.
  pub async fn connect(opts: impl Into<ConnectionOptions>) -> DriverResult<Self> {
    let mut connection = Self::physical_connect(opts).await?;
    connection.handshake().await?;
    Ok(connection)
  }
}

impl<T: Transport> Connection<T> {
  /// Wraps an already established transport. The server greeting is expected to be the first
  /// thing read from it.
  pub fn from_transport(transport: T, opts: ConnectionOptions) -> Self {
    Self {
      channel: Channel::new(transport),
      opts,
      state: State::Connected,
      capabilities: CapabilityFlags::empty(),
      server_version: String::new(),
      connection_id: 0,
      last_ok: ServerOk::default(),
      statements: HashSet::new(),
      pending_resultset: false,
    }
  }

  pub async fn handshake(&mut self) -> DriverResult<()> {
    if self.state != State::Connected {
      return Err(DriverError::ConnectionNotUsable);
    }

    self.state = State::Busy;
    match handshake::handshake(&mut self.channel, &self.opts).await {
      Ok(session) => {
        self.capabilities = session.capabilities;
        self.server_version = session.server_version;
        self.connection_id = session.connection_id;
        self.last_ok = session.ok;
        self.state = State::Ready;
        Ok(())
      }
      Err(err) => {
        // Every handshake failure is final for this transport.
        self.state = State::Broken;
        Err(err)
      }
    }
  }

  /// Sends a text query. Statements that produce no rows yield a resultset which is already
  /// complete.
  pub async fn query(&mut self, sql: impl AsRef<str>) -> DriverResult<Resultset<'_, T>> {
    self.check_ready()?;
    let sql = sql.as_ref();
    debug!(sql, "query");

    self.state = State::Busy;
    let head = self.send_and_read_head(command(Command::COM_QUERY, sql.as_bytes()).as_ref()).await;
    let head = self.track(head)?;
    Ok(Resultset::new(self, head, false))
  }

  pub async fn prepare(&mut self, sql: impl AsRef<str>) -> DriverResult<Statement> {
    self.check_ready()?;
    let sql = sql.as_ref();
    debug!(sql, "prepare");

    self.state = State::Busy;
    let result = self.prepare_inner(sql).await;
    let statement = self.track(result)?;
    self.statements.insert(statement.id);
    Ok(statement)
  }

  /// Executes a prepared statement with exactly as many values as it has parameters.
  pub async fn execute(
    &mut self,
    statement: &Statement,
    params: &[Value],
  ) -> DriverResult<Resultset<'_, T>> {
    self.check_ready()?;
    self.check_statement(statement)?;
    if params.len() != statement.param_count() {
      return Err(DriverError::ValueCountMismatch {
        expected: statement.param_count(),
        actual: params.len(),
      });
    }
    debug!(statement_id = statement.id, params = params.len(), "execute");

    self.state = State::Busy;
    let head = self
      .send_and_read_head(com_stmt_execute(statement.id, params).as_ref())
      .await;
    let head = self.track(head)?;
    Ok(Resultset::new(self, head, true))
  }

  /// Deallocates a prepared statement. The server sends no reply, and the statement can't be
  /// used anymore even if sending failed.
  pub async fn close_statement(&mut self, statement: &Statement) -> DriverResult<()> {
    self.check_statement(statement)?;
    self.statements.remove(&statement.id);
    self.check_ready()?;
    debug!(statement_id = statement.id, "close statement");

    self.state = State::Busy;
    let result = self.write_command(com_stmt_close(statement.id).as_ref()).await;
    self.track(result)
  }

  pub async fn ping(&mut self) -> DriverResult<()> {
    self.check_ready()?;
    self.state = State::Busy;
    let result = self.ping_inner().await;
    self.track(result)
  }

  /// Asks the server to end the session. The transport stays open until `close`.
  pub async fn quit(&mut self) -> DriverResult<()> {
    self.check_ready()?;
    debug!("quit");
    self.state = State::Busy;
    let result = self.write_command(command(Command::COM_QUIT, &[]).as_ref()).await;
    self.statements.clear();
    self.state = State::Quit;
    self.track(result)
  }

  /// Quits if possible, then shuts the transport down. Failures along the way are logged and
  /// ignored, and closing twice is fine.
  pub async fn close(&mut self) -> DriverResult<()> {
    match self.state {
      State::Closed => return Ok(()),
      State::Ready if !self.pending_resultset => {
        if let Err(err) = self.quit().await {
          warn!("failed to quit: {}", err);
        }
      }
      _ => {}
    }

    if let Err(err) = self.channel.get_mut().shutdown().await {
      warn!("failed to shutdown transport: {}", err);
    }

    self.statements.clear();
    self.state = State::Closed;
    debug!("connection closed");
    Ok(())
  }

  pub fn uses_tls(&self) -> bool {
    self.channel.get_ref().is_tls()
  }

  /// Whether commands can be sent.
  pub fn is_open(&self) -> bool {
    self.state == State::Ready && !self.pending_resultset
  }

  pub fn options(&self) -> &ConnectionOptions {
    &self.opts
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

  pub fn affected_rows(&self) -> u64 {
    self.last_ok.affected_rows()
  }

  pub fn last_insert_id(&self) -> u64 {
    self.last_ok.last_inserted_id()
  }

  pub fn warning_count(&self) -> u16 {
    self.last_ok.warnings()
  }

  pub fn info(&self) -> &str {
    self.last_ok.info()
  }

  pub fn status_flags(&self) -> StatusFlags {
    self.last_ok.status_flags()
  }

  fn check_ready(&self) -> DriverResult<()> {
    match self.state {
      State::Ready if self.pending_resultset => Err(DriverError::ResultsetPending),
      State::Ready => Ok(()),
      _ => Err(DriverError::ConnectionNotUsable),
    }
  }

  fn check_statement(&self, statement: &Statement) -> DriverResult<()> {
    if statement.connection_id != self.connection_id || !self.statements.contains(&statement.id) {
      return Err(DriverError::StatementClosed);
    }
    Ok(())
  }

  /// Leaves the busy state once an operation ran to completion.
  fn track<R>(&mut self, result: DriverResult<R>) -> DriverResult<R> {
    match result {
      Ok(value) => {
        self.done();
        Ok(value)
      }
      Err(err) => Err(self.track_err(err)),
    }
  }

  fn track_err(&mut self, err: DriverError) -> DriverError {
    if err.is_fatal() && self.state != State::Closed {
      debug!("connection is no longer usable: {}", err);
      self.state = State::Broken;
    } else {
      self.done();
    }
    err
  }

  fn done(&mut self) {
    if self.state == State::Busy {
      self.state = State::Ready;
    }
  }

  // https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_command_phase.html
  async fn write_command(&mut self, payload: &[u8]) -> DriverResult<()> {
    self.channel.reset_sequence_id();
    self.channel.write_message(payload).await
  }

  async fn read_payload(&mut self) -> DriverResult<Payload> {
    Ok(Payload::new(self.channel.read_message().await?))
  }

  async fn send_and_read_head(&mut self, payload: &[u8]) -> DriverResult<ResultsetHead> {
    self.write_command(payload).await?;
    let capabilities = self.capabilities;

    match self.read_payload().await?.as_query_response(capabilities)? {
      QueryResponse::Success(ok) => {
        self.last_ok = ok.clone();
        Ok(ResultsetHead::Done(ok))
      }
      QueryResponse::Failure(err) => Err(err.into()),
      QueryResponse::ResultSet(column_count) => {
        if column_count > MAX_COLUMNS {
          return Err(DriverError::MalformedPacket(format!(
            "resultset announces {} columns",
            column_count
          )));
        }
        let columns = self.read_columns(column_count as usize).await?;
        Ok(ResultsetHead::Columns(columns))
      }
      QueryResponse::LocalInfile => Err(DriverError::UnexpectedPacket(
        "LOCAL INFILE requests are not supported".into(),
      )),
    }
  }

  async fn read_columns(&mut self, count: usize) -> DriverResult<Vec<Column>> {
    let mut columns = Vec::with_capacity(count.min(256));
    for _ in 0..count {
      columns.push(self.read_payload().await?.as_column_definition()?);
    }

    if count > 0 && !self.capabilities.contains(CapabilityFlags::CLIENT_DEPRECATE_EOF) {
      self.read_payload().await?.as_metadata_eof()?;
    }
    Ok(columns)
  }

  async fn prepare_inner(&mut self, sql: &str) -> DriverResult<Statement> {
    self
      .write_command(command(Command::COM_STMT_PREPARE, sql.as_bytes()).as_ref())
      .await?;

    let ok = match self.read_payload().await?.as_prepare_response()? {
      PrepareResponse::Success(ok) => ok,
      PrepareResponse::Failure(err) => return Err(err.into()),
    };

    let params = self.read_columns(ok.param_count() as usize).await?;
    let columns = self.read_columns(ok.column_count() as usize).await?;
    Ok(Statement {
      id: ok.statement_id(),
      connection_id: self.connection_id,
      sql: sql.to_string(),
      params,
      columns,
    })
  }

  async fn ping_inner(&mut self) -> DriverResult<()> {
    self
      .write_command(command(Command::COM_PING, &[]).as_ref())
      .await?;
    let capabilities = self.capabilities;
    match self.read_payload().await?.as_generic_response(capabilities)? {
      GenericResponse::ServerOk(ok) => {
        self.last_ok = ok;
        Ok(())
      }
      GenericResponse::ServerError(err) => Err(err.into()),
    }
  }
}

/// Server side prepared statement. Only valid on the connection that prepared it, until closed.
#[derive(Debug, Clone)]
pub struct Statement {
  id: u32,
  connection_id: u32,
  sql: String,
  params: Vec<Column>,
  columns: Vec<Column>,
}

impl Statement {
  pub fn id(&self) -> u32 {
    self.id
  }

  pub fn sql(&self) -> &str {
    &self.sql
  }

  pub fn param_count(&self) -> usize {
    self.params.len()
  }

  pub fn params(&self) -> &[Column] {
    &self.params
  }

  pub fn columns(&self) -> &[Column] {
    &self.columns
  }
}

enum ResultsetHead {
  Done(ServerOk),
  Columns(Vec<Column>),
}

/// Rows produced by a query or a statement execution, read one packet at a time.
pub struct Resultset<'a, T: Transport> {
  conn: &'a mut Connection<T>,
  columns: Arc<[Column]>,
  binary: bool,
  complete: bool,
  ok: ServerOk,
}

impl<'a, T: Transport> Resultset<'a, T> {
  fn new(conn: &'a mut Connection<T>, head: ResultsetHead, binary: bool) -> Self {
    let (columns, complete, ok) = match head {
      ResultsetHead::Done(ok) => (Vec::new(), true, ok),
      ResultsetHead::Columns(columns) => (columns, false, ServerOk::default()),
    };

    Self {
      conn,
      columns: columns.into(),
      binary,
      complete,
      ok,
    }
  }

  /// Reads the next row, `None` once the resultset is complete.
  pub async fn read_one(&mut self) -> DriverResult<Option<Row>> {
    if self.complete {
      return Ok(None);
    }

    self.conn.state = State::Busy;
    match self.read_row().await {
      Ok(Some(row)) => {
        self.conn.done();
        Ok(Some(row))
      }
      Ok(None) => {
        self.complete = true;
        self.conn.done();
        Ok(None)
      }
      Err(err) => {
        self.complete = true;
        Err(self.conn.track_err(err))
      }
    }
  }

  /// Reads up to `n` rows.
  pub async fn read_many(&mut self, n: usize) -> DriverResult<Vec<Row>> {
    let mut rows = Vec::with_capacity(n.min(1024));
    while rows.len() < n {
      match self.read_one().await? {
        Some(row) => rows.push(row),
        None => break,
      }
    }
    Ok(rows)
  }

  pub async fn read_all(&mut self) -> DriverResult<Vec<Row>> {
    let mut rows = Vec::new();
    while let Some(row) = self.read_one().await? {
      rows.push(row);
    }
    Ok(rows)
  }

  pub fn into_stream(self) -> impl Stream<Item = DriverResult<Row>> + 'a {
    stream::unfold(self, |mut resultset| async move {
      match resultset.read_one().await {
        Ok(Some(row)) => Some((Ok(row), resultset)),
        Ok(None) => None,
        Err(err) => Some((Err(err), resultset)),
      }
    })
  }

  pub fn fields(&self) -> &[Column] {
    &self.columns
  }

  /// Whether rows use the binary encoding of prepared statements.
  pub fn is_binary(&self) -> bool {
    self.binary
  }

  pub fn complete(&self) -> bool {
    self.complete
  }

  pub fn affected_rows(&self) -> u64 {
    self.ok.affected_rows()
  }

  pub fn last_insert_id(&self) -> u64 {
    self.ok.last_inserted_id()
  }

  pub fn warning_count(&self) -> u16 {
    self.ok.warnings()
  }

  pub fn info(&self) -> &str {
    self.ok.info()
  }

  pub fn status_flags(&self) -> StatusFlags {
    self.ok.status_flags()
  }

  async fn read_row(&mut self) -> DriverResult<Option<Row>> {
    let payload = self.conn.read_payload().await?;
    match payload.as_row_response(self.conn.capabilities, &self.columns, self.binary)? {
      RowResponse::Row(row) => Ok(Some(row)),
      RowResponse::Success(ok) => {
        self.conn.last_ok = ok.clone();
        self.ok = ok;
        Ok(None)
      }
      RowResponse::Failure(err) => Err(err.into()),
    }
  }
}

impl<T: Transport> Drop for Resultset<'_, T> {
  fn drop(&mut self) {
    if !self.complete {
      warn!("resultset dropped before it was fully read");
      self.conn.pending_resultset = true;
    }
  }
}
