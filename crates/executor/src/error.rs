use crate::backend::Backend;
use crate::params::Param;
use thiserror::Error;

/// Opening a session failed. Logged where it happens and handed back to the caller.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to connect to {backend} at {target}: {source}")]
    Connect {
        backend: Backend,
        target: String,
        #[source]
        source: sqlx::Error,
    },
}

/// Why a query produced no rows for the caller.
#[derive(Debug, Error)]
pub enum QueryError {
    /// No live session for the backend: it failed to connect at startup or its worker is gone.
    #[error("no connection to the {0} database")]
    Unavailable(Backend),

    /// The statement failed and its transaction was rolled back.
    ///
    /// The message repeats the raw query and parameters back to the user.
    #[error("Error: '{message}'\nParameters: query={query:?} params={}", format_params(.params))]
    Execution {
        message: String,
        query: String,
        params: Vec<Param>,
    },
}

impl QueryError {
    pub(crate) fn execution(err: &sqlx::Error, query: &str, params: &[Param]) -> Self {
        QueryError::Execution {
            message: err.to_string(),
            query: query.to_string(),
            params: params.to_vec(),
        }
    }
}

/// A row could not be turned into JSON values.
#[derive(Debug, Error)]
pub(crate) enum FetchError {
    #[error("column {column:?} has unsupported type {type_name}")]
    UnsupportedType { column: String, type_name: String },

    #[error(transparent)]
    Driver(#[from] sqlx::Error),
}

fn format_params(params: &[Param]) -> String {
    let inner: Vec<String> = params.iter().map(Param::to_string).collect();
    format!("({})", inner.join(", "))
}
