//! Opening database sessions.
//!
//! Failures are logged here and returned as [`ConnectError`]; nothing panics.

use crate::backend::Backend;
use crate::commit::Plan;
use crate::drivers::{self, QueryOutput};
use crate::error::{ConnectError, QueryError};
use crate::params::Param;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MysqlSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub database: String,
}

impl Default for MysqlSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3306,
            username: "root".to_string(),
            password: None,
            database: "MyTestDatabase".to_string(),
        }
    }
}

impl MysqlSettings {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: Option<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password,
            database: database.into(),
        }
    }

    fn options(&self, with_database: bool) -> MySqlConnectOptions {
        let mut opts = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username);
        if let Some(password) = &self.password {
            opts = opts.password(password);
        }
        if with_database {
            opts = opts.database(&self.database);
        }
        opts
    }

    fn target(&self, with_database: bool) -> String {
        let server = format!("{}@{}:{}", self.username, self.host, self.port);
        if with_database {
            format!("{}/{}", server, self.database)
        } else {
            server
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteSettings {
    /// A file path (created if missing), `:memory:`, or a full `sqlite:` URL.
    pub path: PathBuf,
}

impl Default for SqliteSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("db.sqlite3"),
        }
    }
}

impl SqliteSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn options(&self) -> Result<SqliteConnectOptions, sqlx::Error> {
        let raw = self.path.to_string_lossy();
        if raw.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(&raw)
        } else if raw == ":memory:" {
            SqliteConnectOptions::from_str("sqlite::memory:")
        } else {
            Ok(SqliteConnectOptions::new()
                .filename(&self.path)
                .create_if_missing(true))
        }
    }
}

/// An open session. The executor worker that owns it is its only user.
pub enum Session {
    Mysql(MySqlConnection),
    Sqlite(SqliteConnection),
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Session").field(&self.backend()).finish()
    }
}

impl Session {
    pub fn backend(&self) -> Backend {
        match self {
            Session::Mysql(_) => Backend::Mysql,
            Session::Sqlite(_) => Backend::Sqlite,
        }
    }

    /// Execute `sql` with positional `params` as `plan` says.
    ///
    /// `sql` must already use the driver's `?` markers. The text itself is run
    /// as given: only the parameters are escaped, by the driver.
    pub async fn execute(
        &mut self,
        sql: &str,
        params: &[Param],
        plan: Plan,
    ) -> Result<QueryOutput, QueryError> {
        match self {
            Session::Mysql(conn) => drivers::mysql::execute(conn, sql, params, plan).await,
            Session::Sqlite(conn) => drivers::sqlite::execute(conn, sql, params, plan).await,
        }
    }

    pub async fn close(self) -> Result<(), sqlx::Error> {
        match self {
            Session::Mysql(conn) => conn.close().await,
            Session::Sqlite(conn) => conn.close().await,
        }
    }
}

/// Connect to an existing MySQL database.
pub async fn connect(settings: &MysqlSettings) -> Result<Session, ConnectError> {
    settings
        .options(true)
        .connect()
        .await
        .map(Session::Mysql)
        .map_err(|source| connect_failed(Backend::Mysql, settings.target(true), source))
}

/// Create the MySQL database if needed, then [`connect`] to it.
///
/// The database name goes into `CREATE DATABASE` verbatim and is therefore
/// injectable. Callers must validate it first.
pub async fn create_and_connect(settings: &MysqlSettings) -> Result<Session, ConnectError> {
    let mut bootstrap = settings
        .options(false)
        .connect()
        .await
        .map_err(|source| connect_failed(Backend::Mysql, settings.target(false), source))?;

    if let Err(err) = drivers::mysql::create_database(&mut bootstrap, &settings.database).await {
        tracing::error!(
            error = %err,
            database = %settings.database,
            "failed to create database"
        );
    }
    if let Err(err) = bootstrap.close().await {
        tracing::debug!(error = %err, "closing bootstrap session failed");
    }

    connect(settings).await
}

/// Open the SQLite database, creating the file if it does not exist.
pub async fn connect_sqlite(settings: &SqliteSettings) -> Result<Session, ConnectError> {
    let target = settings.path.display().to_string();
    let opts = settings
        .options()
        .map_err(|source| connect_failed(Backend::Sqlite, target.clone(), source))?;
    opts.connect()
        .await
        .map(Session::Sqlite)
        .map_err(|source| connect_failed(Backend::Sqlite, target, source))
}

fn connect_failed(backend: Backend, target: String, source: sqlx::Error) -> ConnectError {
    tracing::error!(%backend, %target, error = %source, "connection failed");
    ConnectError::Connect {
        backend,
        target,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn debug_names_the_backend_only() {
        let session = connect_sqlite(&SqliteSettings::new(":memory:")).await.unwrap();
        assert_eq!(format!("{session:?}"), "Session(Sqlite)");
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn missing_sqlite_directory_is_a_connect_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SqliteSettings::new(dir.path().join("absent").join("x.db"));
        let err = connect_sqlite(&settings).await.unwrap_err();
        assert!(err.to_string().starts_with("failed to connect to SQLITE at "), "{err}");
    }
}
