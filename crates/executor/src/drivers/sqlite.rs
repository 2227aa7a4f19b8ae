use super::{QueryOutput, abort, failed, finish, rows_or_empty, shape_rows, unsupported};
use crate::commit::Plan;
use crate::error::{FetchError, QueryError};
use crate::params::Param;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnection, SqliteRow};
use sqlx::{Connection, Row, TypeInfo, ValueRef};

/// Run one statement on an SQLite session as `plan` says.
pub async fn execute(
    conn: &mut SqliteConnection,
    sql: &str,
    params: &[Param],
    plan: Plan,
) -> Result<QueryOutput, QueryError> {
    let rows = match plan {
        Plan::Direct => fetch(conn, sql, params)
            .await
            .map_err(|err| failed(err, sql, params))?,
        Plan::Transaction { commit } => {
            let mut tx = conn
                .begin()
                .await
                .map_err(|e| QueryError::execution(&e, sql, params))?;
            let rows = match fetch(&mut tx, sql, params).await {
                Ok(rows) => rows,
                Err(err) => return Err(abort(tx, err, sql, params).await),
            };
            finish(tx, commit, sql, params).await?;
            rows
        }
    };

    let mut out = rows_or_empty(shape_rows(&rows, decode_value), sql);
    out.completion = plan.completion();
    Ok(out)
}

async fn fetch(
    conn: &mut SqliteConnection,
    sql: &str,
    params: &[Param],
) -> Result<Vec<SqliteRow>, sqlx::Error> {
    let mut q = sqlx::query(sql);
    for p in params {
        q = bind_sqlite(q, p);
    }
    q.fetch_all(conn).await
}

fn bind_sqlite<'q>(
    q: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    p: &Param,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match p {
        Param::Int(i) => q.bind(*i),
        Param::Text(s) => q.bind(s.clone()),
    }
}

// SQLite reports the storage class of each value, so the chain below covers every case.
fn decode_value(r: &SqliteRow, i: usize) -> Result<Value, FetchError> {
    let raw = r.try_get_raw(i)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_string();

    if let Ok(v) = r.try_get::<i64, _>(i) {
        return Ok(Value::from(v));
    }
    if let Ok(v) = r.try_get::<f64, _>(i) {
        return Ok(Value::from(v));
    }
    if let Ok(v) = r.try_get::<String, _>(i) {
        return Ok(Value::from(v));
    }
    if let Ok(v) = r.try_get::<Vec<u8>, _>(i) {
        return Ok(Value::from(STANDARD.encode(v)));
    }
    Err(unsupported(r, i, &type_name))
}
