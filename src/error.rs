use thiserror::Error;

/// How a driver classifies a failure it reports.
///
/// The engine never reclassifies errors; the only branch it takes on kind is
/// the deadlock-vs-everything-else split used for transaction retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// The backend chose this session as a deadlock victim; the statement
    /// (and any enclosing transaction) was terminated server-side.
    Deadlock,
    /// A statement-level failure: syntax error, constraint violation, type
    /// mismatch.
    Statement,
    /// The connection could not be established or was lost mid-flight.
    Connection,
    /// The pool has been closed; no further checkouts are possible.
    Closed,
    /// Anything the driver could not classify further.
    Other,
}

/// Error surfaced by a driver implementation at the boundary traits.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DriverError {
    kind: DriverErrorKind,
    /// Backend-native error code, when the wire protocol carries one
    /// (e.g. 1205 for a SQL Server deadlock victim).
    code: Option<i64>,
    message: String,
}

impl DriverError {
    #[must_use]
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    #[must_use]
    pub fn deadlock(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Deadlock, message)
    }

    #[must_use]
    pub fn statement(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Statement, message)
    }

    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Connection, message)
    }

    #[must_use]
    pub fn closed(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Closed, message)
    }

    #[must_use]
    pub fn kind(&self) -> DriverErrorKind {
        self.kind
    }

    #[must_use]
    pub fn code(&self) -> Option<i64> {
        self.code
    }

    #[must_use]
    pub fn is_deadlock(&self) -> bool {
        self.kind == DriverErrorKind::Deadlock
    }
}

#[derive(Debug, Error)]
pub enum SqlConduitError {
    /// A driver failure outside any single statement (checkout, connect,
    /// close, transaction control).
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// A statement failed. The SQL text is attached so the failure points at
    /// the caller's query; the driver's original error is preserved as the
    /// source.
    #[error("statement failed: {sql}")]
    Statement {
        sql: String,
        #[source]
        source: DriverError,
    },

    /// An INSERT routed through [`insert`](crate::Queryable::insert) did not
    /// produce a scope-local identity value.
    #[error("statement did not generate an identity value")]
    NoIdentity,

    /// A column value could not be decoded into the requested Rust type.
    #[error("row decode error: {0}")]
    Decode(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl SqlConduitError {
    /// Attach statement context to a driver error.
    pub(crate) fn statement(sql: &str, source: DriverError) -> Self {
        SqlConduitError::Statement {
            sql: sql.to_string(),
            source,
        }
    }

    /// Whether this error is a backend-reported deadlock, at whatever depth.
    #[must_use]
    pub fn is_deadlock(&self) -> bool {
        match self {
            SqlConduitError::Driver(e) => e.is_deadlock(),
            SqlConduitError::Statement { source, .. } => source.is_deadlock(),
            _ => false,
        }
    }
}
