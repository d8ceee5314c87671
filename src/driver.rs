//! The boundary between the engine and a concrete database driver.
//!
//! The engine owns readiness, result shaping, streaming backpressure, and
//! transaction control flow; a driver owns the wire protocol, authentication,
//! parameter binding mechanics, and pooling internals. Implementations ship
//! behind features (`mssql`) or as test scaffolding (`test_utils`).

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{DriverError, SqlConduitError};
use crate::request::Request;
use crate::row::Row;

/// The connection pool contract the engine drives.
///
/// The pool is injected, never constructed by the engine. Checkout and
/// release follow the pool's own protocol: a checked-out value returns to
/// the pool when dropped.
#[async_trait]
pub trait DriverPool: Send + Sync + 'static {
    type Conn: DriverConnection;
    type Tx: DriverTransaction;

    /// Establish connectivity. Called (and retried) by the lifecycle
    /// manager's readiness gate; must be safe to call again after a failure.
    async fn connect(&self) -> Result<(), DriverError>;

    /// Close the pool. Later checkouts must fail with
    /// [`DriverErrorKind::Closed`](crate::DriverErrorKind::Closed).
    async fn close(&self) -> Result<(), DriverError>;

    /// Check out a connection for a single request.
    async fn checkout(&self) -> Result<Self::Conn, DriverError>;

    /// Check out a dedicated connection and begin a transaction on it.
    async fn begin(&self) -> Result<Self::Tx, DriverError>;

    /// Statement that reads the scope-local generated identity, appended to
    /// INSERT batches by [`insert`](crate::Queryable::insert). The value
    /// must come back in a single-row, single-column result.
    fn identity_clause(&self) -> &str {
        "SELECT SCOPE_IDENTITY() AS id"
    }
}

/// A checked-out connection executing one request at a time.
#[async_trait]
pub trait DriverConnection: Send + 'static {
    /// Run a request and collect its full row set.
    async fn run_select(&mut self, request: &Request) -> Result<Vec<Row>, DriverError>;

    /// Run a request and report per-statement affected-row counts.
    async fn run_dml(&mut self, request: &Request) -> Result<Vec<u64>, DriverError>;

    /// Run a request in row-streaming mode, delivering each row at the sink.
    ///
    /// [`RowSink::deliver`] suspends while the consumer's buffer is at its
    /// high-water mark; that suspension is the pause signal. When `deliver`
    /// returns `false` the consumer is gone: the driver must drain or abort
    /// the in-flight request promptly so the connection comes back clean,
    /// then return `Ok(())`.
    async fn run_streaming(
        &mut self,
        request: &Request,
        sink: &mut RowSink,
    ) -> Result<(), DriverError>;
}

/// A driver transaction owning its dedicated connection.
///
/// Dropping an open transaction discards it: the driver must release the
/// connection without surfacing errors. Whether the drop path issues a
/// defensive ROLLBACK is the driver's decision; the engine deliberately
/// skips explicit rollback after a deadlock, where the server has already
/// terminated the transaction.
#[async_trait]
pub trait DriverTransaction: Send + 'static {
    type Conn: DriverConnection;

    /// The live connection, for statements issued inside the transaction.
    fn conn(&mut self) -> &mut Self::Conn;

    async fn commit(self) -> Result<(), DriverError>;

    async fn rollback(self) -> Result<(), DriverError>;
}

/// Push side of the stream bridge, handed to
/// [`DriverConnection::run_streaming`].
///
/// Wraps a bounded channel sized to the stream's high-water mark plus the
/// bridge's cancellation token. Sending into a full channel suspends the
/// driver; the consumer draining below the mark resumes it.
pub struct RowSink {
    tx: mpsc::Sender<Result<Row, SqlConduitError>>,
    cancel: CancellationToken,
}

impl RowSink {
    pub(crate) fn new(
        tx: mpsc::Sender<Result<Row, SqlConduitError>>,
        cancel: CancellationToken,
    ) -> Self {
        Self { tx, cancel }
    }

    /// Deliver one row to the consumer, waiting while the buffer is full.
    ///
    /// Returns `false` once the consumer has terminated the stream; rows
    /// delivered after that are discarded without further work.
    pub async fn deliver(&mut self, row: Row) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            () = self.cancel.cancelled() => false,
            sent = self.tx.send(Ok(row)) => sent.is_ok(),
        }
    }

    /// Whether the consumer has already terminated the stream.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }
}
