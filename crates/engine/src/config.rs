use sqlpad_executor::{CommitRule, MysqlSettings, SqliteSettings};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// MySQL's identifier length limit.
const MAX_DATABASE_NAME_LEN: usize = 64;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid MySQL database name {0:?}: use 1-64 characters from [A-Za-z0-9_$]")]
    InvalidDatabaseName(String),

    #[error("queue capacity must be at least 1")]
    ZeroQueueCapacity,

    #[error("SQLite path is empty")]
    EmptySqlitePath,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub host: String,
    pub port: u16,
    pub document_root: PathBuf,
    pub index_file: String,
    pub sqlite: SqliteSettings,
    pub mysql: MysqlSettings,
    pub commit_rule: CommitRule,
    /// Pending requests each backend's executor accepts before senders wait.
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            document_root: PathBuf::from("templates"),
            index_file: "index.html".to_string(),
            sqlite: SqliteSettings::default(),
            mysql: MysqlSettings::default(),
            commit_rule: CommitRule::default(),
            queue_capacity: 32,
        }
    }
}

impl EngineConfig {
    pub fn addr(&self) -> String {
        self.http().addr()
    }

    pub fn index_path(&self) -> PathBuf {
        self.document_root.join(&self.index_file)
    }

    pub fn set_document_root<P: AsRef<Path>>(mut self, root: P) -> Self {
        self.document_root = root.as_ref().to_path_buf();
        self
    }

    pub fn http(&self) -> HttpServerConfig {
        self.into()
    }

    /// Checks done before anything connects.
    ///
    /// The database name ends up verbatim inside `CREATE DATABASE`, so it is
    /// restricted to plain identifier characters here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = &self.mysql.database;
        let name_ok = !name.is_empty()
            && name.len() <= MAX_DATABASE_NAME_LEN
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
        if !name_ok {
            return Err(ConfigError::InvalidDatabaseName(name.clone()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.sqlite.path.as_os_str().is_empty() {
            return Err(ConfigError::EmptySqlitePath);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
}

impl HttpServerConfig {
    pub fn addr(&self) -> String {
        if self.host.contains(':') {
            // bare IPv6 literal
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl From<&EngineConfig> for HttpServerConfig {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            host: cfg.host.clone(),
            port: cfg.port,
        }
    }
}
