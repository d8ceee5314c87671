//! Connection lifecycle and the caller-facing surface.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::binds::BindSet;
use crate::driver::{DriverPool, DriverTransaction};
use crate::error::SqlConduitError;
use crate::executor::Queryable;
use crate::request::Request;
use crate::results::RawResult;
use crate::row::{FromRow, FromValue};
use crate::stream::{RowIterator, RowStream, spawn_bridge};
use crate::types::{QueryOptions, StreamOptions};

const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(2);

pub(crate) struct DbInner<P: DriverPool> {
    pool: P,
    ready: OnceCell<()>,
    retry_interval: Duration,
}

impl<P: DriverPool> DbInner<P> {
    pub(crate) fn pool(&self) -> &P {
        &self.pool
    }

    /// The idempotent readiness gate every entry point awaits. The first
    /// caller runs the connect loop; everyone else (concurrent or later)
    /// observes the same memoized outcome.
    pub(crate) async fn ready(&self) {
        self.ready.get_or_init(|| self.connect_with_retry()).await;
    }

    /// Retry indefinitely at a fixed interval. Availability wins over fast
    /// failure: operations issued before the database is reachable simply
    /// wait. Repeated failure is logged, never surfaced.
    async fn connect_with_retry(&self) {
        let mut failures: u32 = 0;
        loop {
            match self.pool.connect().await {
                Ok(()) => return,
                Err(e) => {
                    failures += 1;
                    if failures > 3 {
                        error!(error = %e, "database connection failed");
                    }
                    if failures > 1 {
                        info!(
                            interval = ?self.retry_interval,
                            "unable to connect to the database, trying again"
                        );
                    }
                    tokio::time::sleep(self.retry_interval).await;
                }
            }
        }
    }
}

/// Options for one [`Db::transaction`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Re-attempts allowed when the backend reports this transaction as a
    /// deadlock victim. Zero (the default) surfaces the first deadlock.
    pub retries: u32,
}

impl TransactionOptions {
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

/// Boxed future returned by a transaction's unit of work.
pub type TxFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, SqlConduitError>> + Send + 'a>>;

/// The engine's entry point: owns the injected pool, gates everything on
/// readiness, and exposes the query, streaming, and transaction surface.
///
/// Cloning is cheap and shares the pool and its readiness state.
pub struct Db<P: DriverPool> {
    inner: Arc<DbInner<P>>,
}

impl<P: DriverPool> Clone for Db<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Builder for [`Db`] knobs that have sensible defaults.
pub struct DbBuilder<P: DriverPool> {
    pool: P,
    retry_interval: Duration,
}

impl<P: DriverPool> DbBuilder<P> {
    /// Interval between connect attempts while the database is unreachable.
    #[must_use]
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    #[must_use]
    pub fn build(self) -> Db<P> {
        Db {
            inner: Arc::new(DbInner {
                pool: self.pool,
                ready: OnceCell::new(),
                retry_interval: self.retry_interval,
            }),
        }
    }
}

impl<P: DriverPool> Db<P> {
    /// Wrap an already-configured pool with default settings.
    #[must_use]
    pub fn new(pool: P) -> Self {
        Self::builder(pool).build()
    }

    #[must_use]
    pub fn builder(pool: P) -> DbBuilder<P> {
        DbBuilder {
            pool,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    /// Wait until the database is reachable. Idempotent; the first call
    /// triggers the connect attempt and later calls share its outcome.
    pub async fn wait(&self) {
        self.inner.ready().await;
    }

    /// Close the pool. Waits for readiness first so a close cannot race an
    /// in-flight initial connect; operations issued afterwards surface the
    /// driver's closed-pool error.
    ///
    /// # Errors
    ///
    /// The driver's close failure, if any.
    pub async fn close(&self) -> Result<(), SqlConduitError> {
        self.inner.ready().await;
        self.inner.pool.close().await?;
        Ok(())
    }

    /// Readiness-gated access to the injected pool, for driver-specific
    /// escape hatches.
    pub async fn rawpool(&self) -> &P {
        self.inner.ready().await;
        &self.inner.pool
    }

    fn queryable(&self) -> Queryable<P> {
        Queryable::for_pool(self.inner.clone())
    }

    /// See [`Queryable::query`].
    ///
    /// # Errors
    ///
    /// Statement failures, enriched with the SQL text.
    pub async fn query(
        &self,
        sql: &str,
        binds: BindSet,
        options: QueryOptions,
    ) -> Result<RawResult, SqlConduitError> {
        self.queryable().query(sql, binds, options).await
    }

    /// See [`Queryable::getall`].
    ///
    /// # Errors
    ///
    /// Statement or decode failures.
    pub async fn getall<T: FromRow>(
        &self,
        sql: &str,
        binds: BindSet,
        options: QueryOptions,
    ) -> Result<Vec<T>, SqlConduitError> {
        self.queryable().getall(sql, binds, options).await
    }

    /// See [`Queryable::getrow`].
    ///
    /// # Errors
    ///
    /// Statement or decode failures.
    pub async fn getrow<T: FromRow>(
        &self,
        sql: &str,
        binds: BindSet,
        options: QueryOptions,
    ) -> Result<Option<T>, SqlConduitError> {
        self.queryable().getrow(sql, binds, options).await
    }

    /// See [`Queryable::getval`].
    ///
    /// # Errors
    ///
    /// Statement or decode failures.
    pub async fn getval<T: FromValue>(
        &self,
        sql: &str,
        binds: BindSet,
        options: QueryOptions,
    ) -> Result<Option<T>, SqlConduitError> {
        self.queryable().getval(sql, binds, options).await
    }

    /// See [`Queryable::getvals`].
    ///
    /// # Errors
    ///
    /// Statement or decode failures.
    pub async fn getvals<T: FromValue>(
        &self,
        sql: &str,
        binds: BindSet,
        options: QueryOptions,
    ) -> Result<Vec<T>, SqlConduitError> {
        self.queryable().getvals(sql, binds, options).await
    }

    /// See [`Queryable::execute`].
    ///
    /// # Errors
    ///
    /// Statement failures.
    pub async fn execute(
        &self,
        sql: &str,
        binds: BindSet,
        options: QueryOptions,
    ) -> Result<(), SqlConduitError> {
        self.queryable().execute(sql, binds, options).await
    }

    /// See [`Queryable::update`].
    ///
    /// # Errors
    ///
    /// Statement failures.
    pub async fn update(
        &self,
        sql: &str,
        binds: BindSet,
        options: QueryOptions,
    ) -> Result<u64, SqlConduitError> {
        self.queryable().update(sql, binds, options).await
    }

    /// See [`Queryable::insert`].
    ///
    /// # Errors
    ///
    /// [`SqlConduitError::NoIdentity`] or statement failures.
    pub async fn insert(
        &self,
        sql: &str,
        binds: BindSet,
        options: QueryOptions,
    ) -> Result<i64, SqlConduitError> {
        self.queryable().insert(sql, binds, options).await
    }

    /// Stream rows with backpressure. Returns immediately; readiness,
    /// checkout, and dispatch happen on the stream's own task.
    #[must_use]
    pub fn stream<T: FromRow>(
        &self,
        sql: &str,
        binds: BindSet,
        options: StreamOptions,
    ) -> RowStream<T> {
        let request = Request::new(sql, binds, options.query);
        spawn_bridge(
            self.inner.clone(),
            request,
            options.effective_high_water_mark(),
        )
    }

    /// Async-iterator view over the same bridge as [`stream`](Self::stream).
    #[must_use]
    pub fn iterator<T: FromRow>(
        &self,
        sql: &str,
        binds: BindSet,
        options: StreamOptions,
    ) -> RowIterator<T> {
        self.stream(sql, binds, options).into()
    }

    /// Run a unit of work inside a transaction.
    ///
    /// Begins a transaction on a dedicated connection, hands the unit of
    /// work an executor bound to it, commits on success, rolls back on
    /// failure. A deadlock with retry budget left discards the transaction
    /// without rollback (the server already rolled the victim back; an
    /// explicit ROLLBACK raises a secondary error on this class of driver)
    /// and re-runs the whole protocol.
    ///
    /// ```rust,no_run
    /// # use sql_conduit::{BindSet, Db, DriverPool, TransactionOptions};
    /// # async fn demo<P: DriverPool>(db: &Db<P>) -> Result<(), sql_conduit::SqlConduitError> {
    /// let id = db
    ///     .transaction(TransactionOptions::default().with_retries(2), |q| {
    ///         Box::pin(async move {
    ///             q.insert(
    ///                 "INSERT INTO test (name) VALUES (@name)",
    ///                 BindSet::new().with("name", "example"),
    ///                 Default::default(),
    ///             )
    ///             .await
    ///         })
    ///     })
    ///     .await?;
    /// # let _ = id;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// The unit of work's error after rollback, or a deadlock once the
    /// retry budget is exhausted; begin/commit failures from the driver.
    pub async fn transaction<T, F>(
        &self,
        options: TransactionOptions,
        mut work: F,
    ) -> Result<T, SqlConduitError>
    where
        F: for<'a> FnMut(&'a mut Queryable<P>) -> TxFuture<'a, T>,
    {
        let mut remaining = options.retries;
        loop {
            self.inner.ready().await;
            let tx = self.inner.pool.begin().await?;
            let mut queryable = Queryable::for_transaction(
                tx,
                self.inner.pool.identity_clause().to_string(),
            );
            let outcome = work(&mut queryable).await;
            let tx = queryable.into_transaction();
            match outcome {
                Ok(value) => {
                    tx.commit().await?;
                    return Ok(value);
                }
                Err(e) if e.is_deadlock() && remaining > 0 => {
                    remaining -= 1;
                    debug!(error = %e, remaining, "transaction chosen as deadlock victim, retrying");
                    drop(tx);
                }
                Err(e) => {
                    // The unit of work's error is what the caller needs to
                    // see, even if rollback itself fails.
                    let _ = tx.rollback().await;
                    return Err(e);
                }
            }
        }
    }
}
