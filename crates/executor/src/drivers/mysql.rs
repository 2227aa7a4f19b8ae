use super::{QueryOutput, abort, failed, finish, rows_or_empty, shape_rows, unsupported};
use crate::commit::Plan;
use crate::error::{FetchError, QueryError};
use crate::params::Param;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnection, MySqlRow};
use sqlx::types::Json;
use sqlx::types::chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::{Connection, Row, TypeInfo, ValueRef};

/// Run one statement on a MySQL session as `plan` says.
pub async fn execute(
    conn: &mut MySqlConnection,
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
    conn: &mut MySqlConnection,
    sql: &str,
    params: &[Param],
) -> Result<Vec<MySqlRow>, sqlx::Error> {
    let mut q = sqlx::query(sql);
    for p in params {
        q = bind_mysql(q, p);
    }
    q.fetch_all(conn).await
}

/// Create the named database over a session opened without one.
///
/// `name` is interpolated into the statement as-is: it must already be sanitized.
pub async fn create_database(conn: &mut MySqlConnection, name: &str) -> Result<(), sqlx::Error> {
    let stmt = format!("CREATE DATABASE IF NOT EXISTS `{name}`");
    sqlx::raw_sql(&stmt).execute(conn).await.map(|_| ())
}

fn bind_mysql<'q>(
    q: sqlx::query::Query<'q, MySql, MySqlArguments>,
    p: &Param,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match p {
        Param::Int(i) => q.bind(*i),
        Param::Text(s) => q.bind(s.clone()),
    }
}

// Types outside this chain fall through to `unsupported`, which empties the whole result.
fn decode_value(r: &MySqlRow, i: usize) -> Result<Value, FetchError> {
    let raw = r.try_get_raw(i)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_string();

    if type_name == "DECIMAL" {
        // sent as text in both protocols; kept as a string so no digits are lost
        return Ok(Value::from(r.try_get_unchecked::<String, _>(i)?));
    }
    if let Ok(v) = r.try_get::<i64, _>(i) {
        return Ok(Value::from(v));
    }
    if let Ok(v) = r.try_get::<u64, _>(i) {
        return Ok(Value::from(v));
    }
    if let Ok(v) = r.try_get::<f64, _>(i) {
        return Ok(Value::from(v));
    }
    if let Ok(v) = r.try_get::<f32, _>(i) {
        return Ok(Value::from(v));
    }
    if let Ok(v) = r.try_get::<String, _>(i) {
        return Ok(Value::from(v));
    }
    if let Ok(v) = r.try_get::<NaiveDateTime, _>(i) {
        return Ok(Value::from(v.to_string()));
    }
    if let Ok(v) = r.try_get::<NaiveDate, _>(i) {
        return Ok(Value::from(v.to_string()));
    }
    if let Ok(v) = r.try_get::<NaiveTime, _>(i) {
        return Ok(Value::from(v.to_string()));
    }
    if let Ok(Json(v)) = r.try_get::<Json<Value>, _>(i) {
        return Ok(v);
    }
    if let Ok(v) = r.try_get::<Vec<u8>, _>(i) {
        return Ok(Value::from(STANDARD.encode(v)));
    }
    Err(unsupported(r, i, &type_name))
}
