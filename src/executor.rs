//! The retrieval primitives, shaped over one of two connection sources:
//! per-call pool checkout or a transaction's dedicated connection.

use std::sync::Arc;

use crate::binds::BindSet;
use crate::db::DbInner;
use crate::driver::{DriverConnection, DriverPool, DriverTransaction};
use crate::error::SqlConduitError;
use crate::request::Request;
use crate::results::RawResult;
use crate::row::{FromRow, FromValue, Row};
use crate::types::QueryOptions;

pub(crate) enum QuerySource<P: DriverPool> {
    /// Readiness-gated, one checkout per call.
    Pool(Arc<DbInner<P>>),
    /// The transaction's live connection, program order guaranteed.
    Tx(P::Tx),
}

/// The query API. One type for both connection sources, selected by
/// composition at construction.
///
/// Pool-backed executors are built (and handed out per call) by
/// [`Db`](crate::Db); transaction-bound ones are passed to the unit of work
/// inside [`Db::transaction`](crate::Db::transaction) and must not outlive
/// it.
pub struct Queryable<P: DriverPool> {
    source: QuerySource<P>,
    identity_clause: String,
}

impl<P: DriverPool> Queryable<P> {
    pub(crate) fn for_pool(inner: Arc<DbInner<P>>) -> Self {
        let identity_clause = inner.pool().identity_clause().to_string();
        Self {
            source: QuerySource::Pool(inner),
            identity_clause,
        }
    }

    pub(crate) fn for_transaction(tx: P::Tx, identity_clause: String) -> Self {
        Self {
            source: QuerySource::Tx(tx),
            identity_clause,
        }
    }

    pub(crate) fn into_transaction(self) -> P::Tx {
        match self.source {
            QuerySource::Tx(tx) => tx,
            QuerySource::Pool(_) => {
                unreachable!("into_transaction is only called on transaction-bound executors")
            }
        }
    }

    async fn run_select(&mut self, request: &Request) -> Result<Vec<Row>, SqlConduitError> {
        match &mut self.source {
            QuerySource::Pool(inner) => {
                inner.ready().await;
                let mut conn = inner.pool().checkout().await?;
                conn.run_select(request)
                    .await
                    .map_err(|e| SqlConduitError::statement(request.sql(), e))
            }
            QuerySource::Tx(tx) => tx
                .conn()
                .run_select(request)
                .await
                .map_err(|e| SqlConduitError::statement(request.sql(), e)),
        }
    }

    async fn run_dml(&mut self, request: &Request) -> Result<Vec<u64>, SqlConduitError> {
        match &mut self.source {
            QuerySource::Pool(inner) => {
                inner.ready().await;
                let mut conn = inner.pool().checkout().await?;
                conn.run_dml(request)
                    .await
                    .map_err(|e| SqlConduitError::statement(request.sql(), e))
            }
            QuerySource::Tx(tx) => tx
                .conn()
                .run_dml(request)
                .await
                .map_err(|e| SqlConduitError::statement(request.sql(), e)),
        }
    }

    /// Execute a statement and return the driver's raw result.
    ///
    /// # Errors
    ///
    /// Driver failures propagate in kind, wrapped with the statement text;
    /// the original error stays reachable through `source()`.
    pub async fn query(
        &mut self,
        sql: &str,
        binds: BindSet,
        options: QueryOptions,
    ) -> Result<RawResult, SqlConduitError> {
        let request = Request::new(sql, binds, options);
        let rows = self.run_select(&request).await?;
        Ok(RawResult::from_rows(rows))
    }

    /// All rows, decoded; empty when the statement returned none.
    ///
    /// # Errors
    ///
    /// Statement or decode failures.
    pub async fn getall<T: FromRow>(
        &mut self,
        sql: &str,
        binds: BindSet,
        options: QueryOptions,
    ) -> Result<Vec<T>, SqlConduitError> {
        let result = self.query(sql, binds, options).await?;
        result.rows.iter().map(T::from_row).collect()
    }

    /// The first row, or `None` when the statement returned none.
    ///
    /// # Errors
    ///
    /// Statement or decode failures.
    pub async fn getrow<T: FromRow>(
        &mut self,
        sql: &str,
        binds: BindSet,
        options: QueryOptions,
    ) -> Result<Option<T>, SqlConduitError> {
        let result = self.query(sql, binds, options).await?;
        result.rows.first().map(T::from_row).transpose()
    }

    /// The first column of the first row, or `None` when no row came back.
    ///
    /// # Errors
    ///
    /// Statement or decode failures.
    pub async fn getval<T: FromValue>(
        &mut self,
        sql: &str,
        binds: BindSet,
        options: QueryOptions,
    ) -> Result<Option<T>, SqlConduitError> {
        let row: Option<Row> = self.getrow(sql, binds, options).await?;
        match row {
            Some(row) => match row.get_by_index(0) {
                Some(value) => T::from_value(value).map(Some),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// The first column of every row.
    ///
    /// # Errors
    ///
    /// Statement or decode failures.
    pub async fn getvals<T: FromValue>(
        &mut self,
        sql: &str,
        binds: BindSet,
        options: QueryOptions,
    ) -> Result<Vec<T>, SqlConduitError> {
        let result = self.query(sql, binds, options).await?;
        result
            .rows
            .iter()
            .filter_map(|row| row.get_by_index(0))
            .map(T::from_value)
            .collect()
    }

    /// Run a statement and discard its result. Succeeds or errors; there is
    /// no false return.
    ///
    /// # Errors
    ///
    /// Statement failures.
    pub async fn execute(
        &mut self,
        sql: &str,
        binds: BindSet,
        options: QueryOptions,
    ) -> Result<(), SqlConduitError> {
        let request = Request::new(sql, binds, options);
        self.run_dml(&request).await?;
        Ok(())
    }

    /// Rows affected by the first statement in the batch.
    ///
    /// # Errors
    ///
    /// Statement failures.
    pub async fn update(
        &mut self,
        sql: &str,
        binds: BindSet,
        options: QueryOptions,
    ) -> Result<u64, SqlConduitError> {
        let request = Request::new(sql, binds, options);
        let affected = self.run_dml(&request).await?;
        Ok(RawResult::from_affected(affected).first_affected())
    }

    /// Run an INSERT and return the identity value it generated.
    ///
    /// Appends the driver's scope-local identity retrieval clause to the
    /// batch and reads the value back.
    ///
    /// # Errors
    ///
    /// [`SqlConduitError::NoIdentity`] when the statement generated no
    /// identity value; statement failures otherwise.
    pub async fn insert(
        &mut self,
        sql: &str,
        binds: BindSet,
        options: QueryOptions,
    ) -> Result<i64, SqlConduitError> {
        let sql = format!("{sql}; {}", self.identity_clause);
        let id: Option<Option<i64>> = self.getval(&sql, binds, options).await?;
        id.flatten().ok_or(SqlConduitError::NoIdentity)
    }
}
