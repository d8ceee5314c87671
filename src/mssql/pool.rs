//! Driver-boundary implementation over bb8 + tiberius.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use bb8_tiberius::ConnectionManager;
use tiberius::Query;

use super::query;
use crate::driver::{DriverConnection, DriverPool, DriverTransaction, RowSink};
use crate::error::DriverError;
use crate::request::Request;
use crate::row::Row;

/// SQL Server pool implementing the engine's driver boundary.
pub struct MssqlPool {
    pool: Pool<ConnectionManager>,
    closed: AtomicBool,
}

impl MssqlPool {
    #[must_use]
    pub fn new(pool: Pool<ConnectionManager>) -> Self {
        Self {
            pool,
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), DriverError> {
        if self.closed.load(Ordering::Acquire) {
            Err(DriverError::closed("the connection pool has been closed"))
        } else {
            Ok(())
        }
    }

    async fn get(&self) -> Result<PooledConnection<'static, ConnectionManager>, DriverError> {
        self.ensure_open()?;
        self.pool
            .get_owned()
            .await
            .map_err(|e| DriverError::connection(format!("SQL Server checkout failed: {e}")))
    }
}

#[async_trait]
impl DriverPool for MssqlPool {
    type Conn = MssqlConnection;
    type Tx = MssqlTransaction;

    async fn connect(&self) -> Result<(), DriverError> {
        // bb8 connects lazily; a checkout proves the server is reachable.
        let _conn = self.get().await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    async fn checkout(&self) -> Result<Self::Conn, DriverError> {
        Ok(MssqlConnection { conn: self.get().await? })
    }

    async fn begin(&self) -> Result<Self::Tx, DriverError> {
        let mut conn = self.checkout().await?;
        Query::new("BEGIN TRANSACTION")
            .execute(&mut *conn.conn)
            .await
            .map_err(query::map_tiberius_error)?;
        Ok(MssqlTransaction { conn })
    }
}

/// A checked-out SQL Server connection; dropping it returns it to the pool.
pub struct MssqlConnection {
    conn: PooledConnection<'static, ConnectionManager>,
}

#[async_trait]
impl DriverConnection for MssqlConnection {
    async fn run_select(&mut self, request: &Request) -> Result<Vec<Row>, DriverError> {
        query::run_select(&mut self.conn, request).await
    }

    async fn run_dml(&mut self, request: &Request) -> Result<Vec<u64>, DriverError> {
        query::run_dml(&mut self.conn, request).await
    }

    async fn run_streaming(
        &mut self,
        request: &Request,
        sink: &mut RowSink,
    ) -> Result<(), DriverError> {
        query::run_streaming(&mut self.conn, request, sink).await
    }
}

/// A transaction holding its dedicated connection for its whole lifetime.
///
/// Dropping without commit or rollback releases the connection with no
/// ROLLBACK round trip: the engine only drops an open transaction after the
/// server reported it as a deadlock victim, and the server has already
/// rolled those back.
pub struct MssqlTransaction {
    conn: MssqlConnection,
}

#[async_trait]
impl DriverTransaction for MssqlTransaction {
    type Conn = MssqlConnection;

    fn conn(&mut self) -> &mut Self::Conn {
        &mut self.conn
    }

    async fn commit(mut self) -> Result<(), DriverError> {
        Query::new("COMMIT TRANSACTION")
            .execute(&mut *self.conn.conn)
            .await
            .map_err(query::map_tiberius_error)?;
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), DriverError> {
        Query::new("ROLLBACK TRANSACTION")
            .execute(&mut *self.conn.conn)
            .await
            .map_err(query::map_tiberius_error)?;
        Ok(())
    }
}
