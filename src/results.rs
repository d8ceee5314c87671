use crate::row::Row;

/// The driver's raw answer to one request: the full row set plus the
/// per-statement affected-row counts the protocol reported.
#[derive(Debug, Clone, Default)]
pub struct RawResult {
    /// Rows returned by the request, in delivery order.
    pub rows: Vec<Row>,
    /// Rows affected, one entry per statement in the batch.
    pub rows_affected: Vec<u64>,
}

impl RawResult {
    /// Build a row-set result; the affected count defaults to the delivered
    /// row count, matching what drivers report on the query path.
    #[must_use]
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let affected = rows.len() as u64;
        Self {
            rows,
            rows_affected: vec![affected],
        }
    }

    /// Build a result carrying only affected-row counts (the execute path).
    #[must_use]
    pub fn from_affected(rows_affected: Vec<u64>) -> Self {
        Self {
            rows: Vec::new(),
            rows_affected,
        }
    }

    /// Affected-row count of the first statement in the batch.
    #[must_use]
    pub fn first_affected(&self) -> u64 {
        self.rows_affected.first().copied().unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }
}
