//! Convenient imports for common functionality.

pub use crate::binds::BindSet;
pub use crate::db::{Db, TransactionOptions};
pub use crate::driver::{DriverConnection, DriverPool, DriverTransaction};
pub use crate::error::{DriverError, DriverErrorKind, SqlConduitError};
pub use crate::executor::Queryable;
pub use crate::results::RawResult;
pub use crate::row::{FromRow, FromValue, Row};
pub use crate::stream::{RowIterator, RowStream};
pub use crate::types::{QueryOptions, RowValues, StreamOptions};

#[cfg(feature = "mssql")]
pub use crate::mssql::{MssqlOptions, MssqlPool};
