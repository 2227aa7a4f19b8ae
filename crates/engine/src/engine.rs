use crate::config::{ConfigError, EngineConfig};
use crate::fs::DocumentRoot;
use crate::http::HttpServer;
use crate::routes::{AppState, create_router};
use sqlpad_executor::{
    Backend, CommitRule, ExecutorHandle, QueryError, QueryRequest, QueryResult, Session,
    connect_sqlite, create_and_connect,
};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("http server error: {0}")]
    Io(#[from] std::io::Error),
}

/// One executor per connected backend. A backend that failed to connect has
/// no executor, and queries sent to it fail with [`QueryError::Unavailable`].
pub struct Backends {
    mysql: Option<ExecutorHandle>,
    sqlite: Option<ExecutorHandle>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Backends {
    /// Open both configured databases. Failures are logged and leave that backend offline.
    pub async fn connect(config: &EngineConfig) -> Self {
        let mut sessions = Vec::with_capacity(2);
        match create_and_connect(&config.mysql).await {
            Ok(session) => sessions.push(session),
            Err(err) => tracing::warn!(error = %err, "MySQL backend offline"),
        }
        match connect_sqlite(&config.sqlite).await {
            Ok(session) => sessions.push(session),
            Err(err) => tracing::warn!(error = %err, "SQLite backend offline"),
        }
        Self::from_sessions(sessions, config.commit_rule, config.queue_capacity)
    }

    /// Hand each session to its own executor task. Later sessions for the same backend are closed.
    pub fn from_sessions(
        sessions: impl IntoIterator<Item = Session>,
        rule: CommitRule,
        capacity: usize,
    ) -> Self {
        let mut backends = Self {
            mysql: None,
            sqlite: None,
            tasks: Mutex::new(Vec::new()),
        };
        let mut tasks = Vec::new();
        for session in sessions {
            let slot = match session.backend() {
                Backend::Mysql => &mut backends.mysql,
                Backend::Sqlite => &mut backends.sqlite,
            };
            if slot.is_some() {
                tracing::warn!(backend = %session.backend(), "duplicate session dropped");
                tasks.push(tokio::spawn(async move {
                    let _ = session.close().await;
                }));
                continue;
            }
            let (handle, task) = ExecutorHandle::spawn(session, rule, capacity);
            tracing::info!(backend = %handle.backend(), "executor started");
            *slot = Some(handle);
            tasks.push(task);
        }
        backends.tasks = Mutex::new(tasks);
        backends
    }

    pub fn handle(&self, backend: Backend) -> Option<&ExecutorHandle> {
        match backend {
            Backend::Mysql => self.mysql.as_ref(),
            Backend::Sqlite => self.sqlite.as_ref(),
        }
    }

    pub fn is_available(&self, backend: Backend) -> bool {
        self.handle(backend).is_some()
    }

    pub async fn dispatch(&self, backend: Backend, request: QueryRequest) -> QueryResult {
        match self.handle(backend) {
            Some(handle) => handle.query(request).await,
            None => Err(QueryError::Unavailable(backend)),
        }
    }

    /// Ask every executor to stop, then wait for them outside the lock.
    pub async fn shutdown(&self) {
        for handle in [&self.mysql, &self.sqlite].into_iter().flatten() {
            handle.shutdown().await;
        }
        let handles: Vec<JoinHandle<()>> = match self.tasks.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for h in handles {
            if let Err(err) = h.await {
                tracing::warn!(error = %err, "executor task ended abnormally");
            }
        }
    }
}

pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn new_with_config(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn run(&mut self) -> Result<(), EngineError> {
        self.config.validate()?;

        let backends = Arc::new(Backends::connect(&self.config).await);
        let state = AppState {
            backends: Arc::clone(&backends),
            document_root: DocumentRoot::new(
                self.config.document_root.clone(),
                self.config.index_file.clone(),
            ),
        };
        let server = HttpServer::new(create_router(state), self.config.http());
        let served = server.start().await;

        backends.shutdown().await;
        served.map_err(EngineError::from)
    }
}
