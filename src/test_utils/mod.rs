//! Scripted in-memory driver for exercising the engine without a server.
//!
//! [`StubPool`] implements the driver boundary with canned row sets and a
//! FIFO script of per-call outcomes, while recording everything the engine
//! does to it: executed SQL, connect attempts, streaming dispatches, and
//! transaction verbs. Checkout is bounded by a semaphore, so a leaked
//! connection hangs the test instead of passing silently.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::driver::{DriverConnection, DriverPool, DriverTransaction, RowSink};
use crate::error::DriverError;
use crate::request::Request;
use crate::row::Row;

/// One scripted answer, consumed FIFO across all statement-running calls.
pub enum ScriptedOutcome {
    /// Serve these rows (select and streaming paths).
    Rows(Vec<Row>),
    /// Report these per-statement affected counts (dml path).
    Affected(Vec<u64>),
    /// Fail the call.
    Error(DriverError),
    /// Deliver some rows, then fail mid-stream.
    RowsThenError(Vec<Row>, DriverError),
}

struct StubShared {
    default_rows: Vec<Row>,
    script: Mutex<VecDeque<ScriptedOutcome>>,
    executed: Mutex<Vec<String>>,
    permits: Arc<Semaphore>,
    remaining_connect_failures: AtomicU32,
    connect_attempts: AtomicUsize,
    connects: AtomicUsize,
    stream_dispatches: AtomicUsize,
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    closed: AtomicBool,
}

/// Scripted driver pool. Clones share state, so tests keep a handle for
/// assertions while the engine owns its own clone.
#[derive(Clone)]
pub struct StubPool {
    shared: Arc<StubShared>,
}

/// Builder mirroring the knobs tests actually vary.
pub struct StubPoolBuilder {
    default_rows: Vec<Row>,
    max_connections: usize,
    connect_failures: u32,
}

impl StubPoolBuilder {
    /// Rows served whenever no scripted outcome is queued.
    #[must_use]
    pub fn rows(mut self, rows: Vec<Row>) -> Self {
        self.default_rows = rows;
        self
    }

    /// Bound on concurrently checked-out connections. Checkout waits when
    /// the pool is exhausted, so a release bug shows up as a hang.
    #[must_use]
    pub fn max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Fail this many connect attempts before succeeding.
    #[must_use]
    pub fn connect_failures(mut self, connect_failures: u32) -> Self {
        self.connect_failures = connect_failures;
        self
    }

    #[must_use]
    pub fn build(self) -> StubPool {
        StubPool {
            shared: Arc::new(StubShared {
                default_rows: self.default_rows,
                script: Mutex::new(VecDeque::new()),
                executed: Mutex::new(Vec::new()),
                permits: Arc::new(Semaphore::new(self.max_connections)),
                remaining_connect_failures: AtomicU32::new(self.connect_failures),
                connect_attempts: AtomicUsize::new(0),
                connects: AtomicUsize::new(0),
                stream_dispatches: AtomicUsize::new(0),
                begins: AtomicUsize::new(0),
                commits: AtomicUsize::new(0),
                rollbacks: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }
}

impl StubPool {
    #[must_use]
    pub fn builder() -> StubPoolBuilder {
        StubPoolBuilder {
            default_rows: Vec::new(),
            max_connections: 8,
            connect_failures: 0,
        }
    }

    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Queue the outcome of the next statement-running call.
    pub fn script(&self, outcome: ScriptedOutcome) {
        self.shared
            .script
            .lock()
            .expect("script lock")
            .push_back(outcome);
    }

    /// Every statement the engine ran, in order (transaction verbs included).
    #[must_use]
    pub fn executed_sql(&self) -> Vec<String> {
        self.shared.executed.lock().expect("executed lock").clone()
    }

    #[must_use]
    pub fn connect_attempts(&self) -> usize {
        self.shared.connect_attempts.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn connects(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn stream_dispatches(&self) -> usize {
        self.shared.stream_dispatches.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn begins(&self) -> usize {
        self.shared.begins.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn commits(&self) -> usize {
        self.shared.commits.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn rollbacks(&self) -> usize {
        self.shared.rollbacks.load(Ordering::SeqCst)
    }

    /// Pool capacity not currently checked out.
    #[must_use]
    pub fn available_connections(&self) -> usize {
        self.shared.permits.available_permits()
    }
}

impl Default for StubPool {
    fn default() -> Self {
        Self::new()
    }
}

impl StubShared {
    fn record(&self, sql: &str) {
        self.executed
            .lock()
            .expect("executed lock")
            .push(sql.to_string());
    }

    fn next_scripted(&self) -> Option<ScriptedOutcome> {
        self.script.lock().expect("script lock").pop_front()
    }
}

/// Build `count` rows shaped like the original fixture data:
/// `{ id, name: "name {i}" }`.
#[must_use]
pub fn sample_rows(count: usize) -> Vec<Row> {
    (0..count)
        .map(|i| {
            Row::from_pairs([
                ("id", crate::RowValues::Int(i as i64 + 1)),
                ("name", crate::RowValues::Text(format!("name {i}"))),
            ])
        })
        .collect()
}

#[async_trait]
impl DriverPool for StubPool {
    type Conn = StubConnection;
    type Tx = StubTransaction;

    async fn connect(&self) -> Result<(), DriverError> {
        self.shared.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.shared.remaining_connect_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.shared
                .remaining_connect_failures
                .store(remaining - 1, Ordering::SeqCst);
            return Err(DriverError::connection("stub: connection refused"));
        }
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(DriverError::closed("stub: pool is closed"));
        }
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.shared.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn checkout(&self) -> Result<Self::Conn, DriverError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(DriverError::closed("stub: pool is closed"));
        }
        let permit = self
            .shared
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DriverError::closed("stub: pool is closed"))?;
        Ok(StubConnection {
            shared: self.shared.clone(),
            _permit: permit,
        })
    }

    async fn begin(&self) -> Result<Self::Tx, DriverError> {
        let conn = self.checkout().await?;
        conn.shared.begins.fetch_add(1, Ordering::SeqCst);
        conn.shared.record("BEGIN TRANSACTION");
        Ok(StubTransaction { conn })
    }
}

/// A checked-out stub connection holding one pool permit.
pub struct StubConnection {
    shared: Arc<StubShared>,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl DriverConnection for StubConnection {
    async fn run_select(&mut self, request: &Request) -> Result<Vec<Row>, DriverError> {
        self.shared.record(request.sql());
        match self.shared.next_scripted() {
            Some(ScriptedOutcome::Rows(rows)) => Ok(rows),
            Some(ScriptedOutcome::Affected(_)) => Ok(Vec::new()),
            Some(ScriptedOutcome::Error(e) | ScriptedOutcome::RowsThenError(_, e)) => Err(e),
            None => Ok(self.shared.default_rows.clone()),
        }
    }

    async fn run_dml(&mut self, request: &Request) -> Result<Vec<u64>, DriverError> {
        self.shared.record(request.sql());
        match self.shared.next_scripted() {
            Some(ScriptedOutcome::Affected(counts)) => Ok(counts),
            Some(ScriptedOutcome::Rows(rows)) => Ok(vec![rows.len() as u64]),
            Some(ScriptedOutcome::Error(e) | ScriptedOutcome::RowsThenError(_, e)) => Err(e),
            None => Ok(vec![1]),
        }
    }

    async fn run_streaming(
        &mut self,
        request: &Request,
        sink: &mut RowSink,
    ) -> Result<(), DriverError> {
        self.shared.record(request.sql());
        self.shared.stream_dispatches.fetch_add(1, Ordering::SeqCst);
        let (rows, trailing_error) = match self.shared.next_scripted() {
            Some(ScriptedOutcome::Rows(rows)) => (rows, None),
            Some(ScriptedOutcome::RowsThenError(rows, e)) => (rows, Some(e)),
            Some(ScriptedOutcome::Error(e)) => return Err(e),
            Some(ScriptedOutcome::Affected(_)) => (Vec::new(), None),
            None => (self.shared.default_rows.clone(), None),
        };
        for row in rows {
            if !sink.deliver(row).await {
                // Consumer gone; the in-memory "request" has nothing left to
                // drain, so the connection is already clean.
                return Ok(());
            }
        }
        match trailing_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// A stub transaction; its connection (and permit) release on drop.
pub struct StubTransaction {
    conn: StubConnection,
}

#[async_trait]
impl DriverTransaction for StubTransaction {
    type Conn = StubConnection;

    fn conn(&mut self) -> &mut Self::Conn {
        &mut self.conn
    }

    async fn commit(self) -> Result<(), DriverError> {
        self.conn.shared.commits.fetch_add(1, Ordering::SeqCst);
        self.conn.shared.record("COMMIT TRANSACTION");
        Ok(())
    }

    async fn rollback(self) -> Result<(), DriverError> {
        self.conn.shared.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.conn.shared.record("ROLLBACK TRANSACTION");
        Ok(())
    }
}
