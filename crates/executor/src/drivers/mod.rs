pub mod mysql;
pub mod sqlite;

use crate::commit::Completion;
use crate::error::{FetchError, QueryError};
use crate::params::Param;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::{Column, ColumnIndex, Database, Row, Transaction};

/// One result row keyed by column name.
pub type Record = Map<String, Value>;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>, // row-major
    pub completion: Completion,
}

impl QueryOutput {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }
}

/// Turn driver rows into column names plus JSON values, one decoder call per cell.
pub(crate) fn shape_rows<R: Row>(
    rows: &[R],
    decode: fn(&R, usize) -> Result<Value, FetchError>,
) -> Result<QueryOutput, FetchError> {
    let columns: Vec<String> = rows
        .first()
        .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();
    let col_len = columns.len();
    let mut out_rows: Vec<Vec<Value>> = Vec::with_capacity(rows.len());
    for r in rows {
        let mut row_vals: Vec<Value> = Vec::with_capacity(col_len);
        for i in 0..col_len {
            row_vals.push(decode(r, i)?);
        }
        out_rows.push(row_vals);
    }
    Ok(QueryOutput {
        columns,
        rows: out_rows,
        completion: Completion::default(),
    })
}

/// A fetch failure is not surfaced: log it and hand back no rows.
pub(crate) fn rows_or_empty(shaped: Result<QueryOutput, FetchError>, sql: &str) -> QueryOutput {
    shaped.unwrap_or_else(|err| {
        tracing::warn!(error = %err, query = sql, "fetch failed, returning an empty result");
        QueryOutput::default()
    })
}

pub(crate) async fn finish<DB: Database>(
    tx: Transaction<'_, DB>,
    commit: bool,
    sql: &str,
    params: &[Param],
) -> Result<(), QueryError> {
    let res = if commit {
        tx.commit().await
    } else {
        tx.rollback().await
    };
    match res {
        Ok(()) => {
            tracing::debug!(commit, query = sql, "transaction finished");
            Ok(())
        }
        Err(err) => {
            tracing::warn!(error = %err, commit, query = sql, "transaction end failed");
            Err(QueryError::execution(&err, sql, params))
        }
    }
}

/// A statement run outside any transaction failed; there is nothing to undo.
pub(crate) fn failed(err: sqlx::Error, sql: &str, params: &[Param]) -> QueryError {
    tracing::warn!(error = %err, query = sql, "statement failed");
    QueryError::execution(&err, sql, params)
}

pub(crate) async fn abort<DB: Database>(
    tx: Transaction<'_, DB>,
    err: sqlx::Error,
    sql: &str,
    params: &[Param],
) -> QueryError {
    tracing::warn!(error = %err, query = sql, "statement failed, rolling back");
    if let Err(rb) = tx.rollback().await {
        tracing::error!(error = %rb, query = sql, "rollback failed");
    }
    QueryError::execution(&err, sql, params)
}

pub(crate) fn unsupported<R>(row: &R, i: usize, type_name: &str) -> FetchError
where
    R: Row,
    usize: ColumnIndex<R>,
{
    FetchError::UnsupportedType {
        column: row.column(i).name().to_string(),
        type_name: type_name.to_string(),
    }
}
