//! Query execution against MySQL and SQLite.
//!
//! Each backend's [`Session`] is moved into an [`Executor`] task that owns it.
//! Callers talk to that task through an [`ExecutorHandle`]. Requests are
//! therefore serialized per connection and never interleave on one session.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

pub mod backend;
pub mod commit;
pub mod connection;
pub mod drivers;
pub mod error;
pub mod params;

pub use backend::Backend;
pub use commit::{CommitIntent, CommitRule, Completion, Plan, TransactionControl};
pub use connection::{
    MysqlSettings, Session, SqliteSettings, connect, connect_sqlite, create_and_connect,
};
pub use drivers::{QueryOutput, Record};
pub use error::{ConnectError, QueryError};
pub use params::Param;

pub type QueryResult = Result<QueryOutput, QueryError>;

/// A statement to run, already translated to the driver's placeholder syntax.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub sql: String,
    pub params: Vec<Param>,
    pub intent: CommitIntent,
}

impl QueryRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            intent: CommitIntent::Auto,
        }
    }

    pub fn with_params(mut self, params: Vec<Param>) -> Self {
        self.params = params;
        self
    }

    pub fn with_intent(mut self, intent: CommitIntent) -> Self {
        self.intent = intent;
        self
    }
}

pub enum Op {
    Query {
        request: QueryRequest,
        respond_to: oneshot::Sender<QueryResult>,
    },
    Shutdown,
}

pub struct Executor {
    pub backend: Backend,
    session: Session,
    rule: CommitRule,
    receiver: mpsc::Receiver<Op>,
    /// A transaction opened by a `BEGIN` in the query text is still running.
    in_user_transaction: bool,
}

impl Executor {
    pub fn new(session: Session, rule: CommitRule, receiver: mpsc::Receiver<Op>) -> Self {
        Self {
            backend: session.backend(),
            session,
            rule,
            receiver,
            in_user_transaction: false,
        }
    }

    /// Serve queued ops until shutdown or until every handle is dropped, then close the session.
    pub async fn run(mut self) {
        while let Some(op) = self.receiver.recv().await {
            match op {
                Op::Query {
                    request,
                    respond_to,
                } => {
                    let result = self.query(&request).await;
                    // the requester may have gone away; the statement already ran
                    let _ = respond_to.send(result);
                }
                Op::Shutdown => break,
            }
        }

        tracing::info!(backend = %self.backend, "executor stopping");
        if self.in_user_transaction {
            tracing::warn!(backend = %self.backend, "discarding an unfinished user transaction");
        }
        if let Err(err) = self.session.close().await {
            tracing::warn!(backend = %self.backend, error = %err, "closing session failed");
        }
    }

    pub async fn query(&mut self, request: &QueryRequest) -> QueryResult {
        let plan = if self.in_user_transaction {
            Plan::Direct
        } else {
            request.intent.plan(self.rule, &request.sql)
        };
        tracing::debug!(
            backend = %self.backend,
            query = %request.sql,
            params = request.params.len(),
            ?plan,
            "executing"
        );
        let mut out = self
            .session
            .execute(&request.sql, &request.params, plan)
            .await?;

        match TransactionControl::detect(&request.sql) {
            Some(TransactionControl::Open) => self.in_user_transaction = true,
            Some(TransactionControl::Commit) if self.in_user_transaction => {
                self.in_user_transaction = false;
                out.completion = Completion::Committed;
            }
            Some(TransactionControl::Rollback) if self.in_user_transaction => {
                self.in_user_transaction = false;
                out.completion = Completion::RolledBack;
            }
            _ => {}
        }
        if self.in_user_transaction {
            out.completion = Completion::Pending;
        }
        Ok(out)
    }
}

/// Cloneable front door to one backend's executor task.
#[derive(Clone, Debug)]
pub struct ExecutorHandle {
    backend: Backend,
    sender: mpsc::Sender<Op>,
}

impl ExecutorHandle {
    /// Move `session` into a new executor task with a queue of `capacity` pending ops.
    pub fn spawn(session: Session, rule: CommitRule, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel::<Op>(capacity.max(1));
        let executor = Executor::new(session, rule, receiver);
        let backend = executor.backend;
        let task = tokio::spawn(executor.run());
        (Self { backend, sender }, task)
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub async fn query(&self, request: QueryRequest) -> QueryResult {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Op::Query {
                request,
                respond_to: tx,
            })
            .await
            .map_err(|_| QueryError::Unavailable(self.backend))?;
        rx.await
            .map_err(|_| QueryError::Unavailable(self.backend))?
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(Op::Shutdown).await;
    }
}
