//! Statement execution against a tiberius client: parameter binding, row
//! value extraction, and the select/dml/streaming paths.

use std::sync::Arc;

use chrono::NaiveDateTime;
use futures_util::TryStreamExt;
use tiberius::Query;

use super::config::MssqlClient;
use crate::driver::RowSink;
use crate::error::{DriverError, DriverErrorKind};
use crate::mssql::params::positionalize;
use crate::request::Request;
use crate::row::Row;
use crate::types::RowValues;

/// Error a SQL Server raises for the session it chose as a deadlock victim.
pub const DEADLOCK_VICTIM_CODE: u32 = 1205;

pub(super) fn map_tiberius_error(e: tiberius::error::Error) -> DriverError {
    match &e {
        tiberius::error::Error::Server(token) if token.code() == DEADLOCK_VICTIM_CODE => {
            DriverError::deadlock(token.message().to_string())
                .with_code(i64::from(token.code()))
        }
        tiberius::error::Error::Server(token) => {
            DriverError::statement(token.message().to_string())
                .with_code(i64::from(token.code()))
        }
        tiberius::error::Error::Io { .. } | tiberius::error::Error::Routing { .. } => {
            DriverError::connection(e.to_string())
        }
        _ => DriverError::new(DriverErrorKind::Other, e.to_string()),
    }
}

/// Build a tiberius query with the request's binds rewritten positionally.
fn prepare_query(request: &Request) -> Query<'static> {
    let (sql, params) = positionalize(request.sql(), request.binds());
    let mut query = Query::new(sql);
    for param in &params {
        match param {
            RowValues::Int(i) => query.bind(*i),
            RowValues::Float(f) => query.bind(*f),
            RowValues::Text(s) => query.bind(s.clone()),
            RowValues::Bool(b) => query.bind(*b),
            RowValues::Timestamp(dt) => {
                let formatted = dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string();
                query.bind(formatted);
            }
            RowValues::Null => query.bind(Option::<String>::None),
            RowValues::JSON(jsval) => query.bind(jsval.to_string()),
            RowValues::Blob(bytes) => query.bind(bytes.clone()),
        }
    }
    query
}

fn header_of(row: &tiberius::Row) -> Arc<Vec<String>> {
    Arc::new(row.columns().iter().map(|col| col.name().to_string()).collect())
}

/// Extract a value from a row at a specific index by probing the types SQL
/// Server actually sends for this crate's value set.
fn extract_value(row: &tiberius::Row, idx: usize) -> Option<RowValues> {
    if let Ok(Some(val)) = row.try_get::<i32, _>(idx) {
        return Some(RowValues::Int(i64::from(val)));
    }

    if let Ok(Some(val)) = row.try_get::<i64, _>(idx) {
        return Some(RowValues::Int(val));
    }

    // Exact numerics: identity readbacks arrive as NUMERIC(38,0).
    if let Ok(Some(val)) = row.try_get::<tiberius::numeric::Numeric, _>(idx) {
        if val.dec_part() == 0 {
            return Some(RowValues::Int(val.int_part() as i64));
        }
        let scaled = val.value() as f64 / 10f64.powi(i32::from(val.scale()));
        return Some(RowValues::Float(scaled));
    }

    if let Ok(Some(val)) = row.try_get::<f32, _>(idx) {
        return Some(RowValues::Float(f64::from(val)));
    }

    if let Ok(Some(val)) = row.try_get::<f64, _>(idx) {
        return Some(RowValues::Float(val));
    }

    if let Ok(Some(val)) = row.try_get::<bool, _>(idx) {
        return Some(RowValues::Bool(val));
    }

    if let Ok(Some(val)) = row.try_get::<NaiveDateTime, _>(idx) {
        return Some(RowValues::Timestamp(val));
    }

    if let Ok(Some(val)) = row.try_get::<&str, _>(idx) {
        return Some(RowValues::Text(val.to_string()));
    }

    if let Ok(Some(val)) = row.try_get::<&[u8], _>(idx) {
        return Some(RowValues::Blob(val.to_vec()));
    }

    None
}

fn convert_row(row: &tiberius::Row, header: &Arc<Vec<String>>) -> Row {
    let mut values = Vec::with_capacity(header.len());
    for idx in 0..header.len() {
        values.push(extract_value(row, idx).unwrap_or(RowValues::Null));
    }
    Row::new(header.clone(), values)
}

/// Run a request and collect every delivered row.
pub(super) async fn run_select(
    client: &mut MssqlClient,
    request: &Request,
) -> Result<Vec<Row>, DriverError> {
    let stream = prepare_query(request)
        .query(client)
        .await
        .map_err(map_tiberius_error)?;

    let mut rows = Vec::new();
    let mut header: Option<Arc<Vec<String>>> = None;
    let mut row_stream = stream.into_row_stream();
    while let Some(row) = row_stream.try_next().await.map_err(map_tiberius_error)? {
        let header = header.get_or_insert_with(|| header_of(&row));
        rows.push(convert_row(&row, header));
    }
    Ok(rows)
}

/// Run a request on the execute path and report per-statement counts.
pub(super) async fn run_dml(
    client: &mut MssqlClient,
    request: &Request,
) -> Result<Vec<u64>, DriverError> {
    let result = prepare_query(request)
        .execute(client)
        .await
        .map_err(map_tiberius_error)?;
    Ok(result.rows_affected().to_vec())
}

/// Run a request in streaming mode, delivering rows at the sink.
///
/// Once the sink reports the consumer gone, the remainder of the result is
/// drained without delivery so the connection re-enters the pool clean.
pub(super) async fn run_streaming(
    client: &mut MssqlClient,
    request: &Request,
    sink: &mut RowSink,
) -> Result<(), DriverError> {
    let stream = prepare_query(request)
        .query(client)
        .await
        .map_err(map_tiberius_error)?;

    let mut header: Option<Arc<Vec<String>>> = None;
    let mut row_stream = stream.into_row_stream();
    while let Some(row) = row_stream.try_next().await.map_err(map_tiberius_error)? {
        let header = header.get_or_insert_with(|| header_of(&row));
        if !sink.deliver(convert_row(&row, header)).await {
            while row_stream
                .try_next()
                .await
                .map_err(map_tiberius_error)?
                .is_some()
            {}
            break;
        }
    }
    Ok(())
}
