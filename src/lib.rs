//! Query-execution and streaming layer in front of an injected SQL
//! connection pool.
//!
//! The engine turns SQL text plus a named [`BindSet`] into driver requests
//! and shapes the answers into a small set of retrieval primitives
//! ([`query`](Db::query), [`getval`](Db::getval), [`getrow`](Db::getrow),
//! [`getall`](Db::getall), [`getvals`](Db::getvals),
//! [`execute`](Db::execute), [`update`](Db::update),
//! [`insert`](Db::insert)), converts pushed row events into backpressured
//! pull streams ([`stream`](Db::stream), [`iterator`](Db::iterator)), and
//! scopes transactions with automatic rollback and bounded deadlock retry
//! ([`transaction`](Db::transaction)). The wire protocol, authentication,
//! and pooling internals live behind the [`driver`] boundary; a SQL Server
//! implementation ships behind the `mssql` feature.

mod binds;
mod db;
pub mod driver;
mod error;
mod executor;
mod request;
mod results;
mod row;
mod stream;
mod types;

#[cfg(feature = "mssql")]
pub mod mssql;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub mod prelude;

pub use binds::BindSet;
pub use db::{Db, DbBuilder, TransactionOptions, TxFuture};
pub use driver::{DriverConnection, DriverPool, DriverTransaction, RowSink};
pub use error::{DriverError, DriverErrorKind, SqlConduitError};
pub use executor::Queryable;
pub use request::Request;
pub use results::RawResult;
pub use row::{FromRow, FromValue, Row};
pub use stream::{RowIterator, RowStream};
pub use types::{DEFAULT_HIGH_WATER_MARK, QueryOptions, RowValues, StreamOptions};
