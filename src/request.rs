use crate::binds::BindSet;
use crate::types::QueryOptions;

/// One unit of work: this SQL text bound to this parameter set.
///
/// A request is owned by exactly one executor invocation (or by the stream
/// bridge for streaming calls) and is never reused after its terminal
/// outcome.
#[derive(Debug, Clone)]
pub struct Request {
    sql: String,
    binds: BindSet,
    options: QueryOptions,
}

impl Request {
    #[must_use]
    pub fn new(sql: impl Into<String>, binds: BindSet, options: QueryOptions) -> Self {
        Self {
            sql: sql.into(),
            binds,
            options,
        }
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn binds(&self) -> &BindSet {
        &self.binds
    }

    #[must_use]
    pub fn options(&self) -> QueryOptions {
        self.options
    }
}
