// SQL Server adapter: implements the driver boundary over tiberius + bb8.
//
// - config: connection options, env fallbacks, pool setup
// - params: named `@name` placeholders rewritten to positional `@PN`
// - query: binding, row extraction, select/dml/streaming execution
// - pool: the DriverPool/DriverConnection/DriverTransaction implementation

pub mod config;
pub mod params;
pub mod pool;
pub mod query;

pub use config::{MssqlClient, MssqlOptions};
pub use pool::{MssqlConnection, MssqlPool, MssqlTransaction};
pub use query::DEADLOCK_VICTIM_CODE;
