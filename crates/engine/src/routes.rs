//! The single `/` route: GET shows the form, POST runs the query and shows the result.

use crate::engine::Backends;
use crate::form::{QueryForm, parse_params};
use crate::fs::DocumentRoot;
use axum::{
    Form, Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use serde_json::Value;
use sqlpad_executor::{Backend, CommitIntent, QueryOutput, QueryRequest};
use sqlpad_template::Template;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub backends: Arc<Backends>,
    pub document_root: DocumentRoot,
}

#[derive(Serialize)]
struct SelectOption {
    value: String,
    selected: bool,
    available: bool,
}

/// Everything the page template can refer to.
#[derive(Serialize, Default)]
struct Page {
    status: Option<&'static str>,
    error: Option<String>,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    row_count: usize,
    completion: String,
    query: String,
    params: String,
    backends: Vec<SelectOption>,
    commits: Vec<SelectOption>,
}

impl Page {
    fn new(state: &AppState, form: &QueryForm) -> Self {
        let chosen_db = form.db.as_deref().unwrap_or(Backend::Sqlite.selector());
        let chosen_commit = form.commit.as_deref().unwrap_or("auto");
        Self {
            query: form.query.clone().unwrap_or_default(),
            params: form.params.clone().unwrap_or_default(),
            backends: Backend::ALL
                .into_iter()
                .map(|b| SelectOption {
                    value: b.selector().to_string(),
                    selected: b.selector() == chosen_db,
                    available: state.backends.is_available(b),
                })
                .collect(),
            commits: ["auto", "commit", "rollback"]
                .into_iter()
                .map(|c| SelectOption {
                    value: c.to_string(),
                    selected: c == chosen_commit,
                    available: true,
                })
                .collect(),
            ..Default::default()
        }
    }

    fn succeeded(mut self, output: QueryOutput) -> Self {
        self.status = Some("OK");
        self.row_count = output.row_count();
        self.completion = output.completion.to_string();
        self.columns = output.columns;
        self.rows = output.rows;
        self
    }

    fn failed(mut self, message: String) -> Self {
        self.status = Some("ERROR");
        self.error = Some(message);
        self
    }
}

/// Create the Axum router with its single route.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(show_form).post(run_query))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

async fn show_form(State(state): State<Arc<AppState>>) -> Response {
    let page = Page::new(&state, &QueryForm::default());
    render_page(&state, &page).await
}

async fn run_query(State(state): State<Arc<AppState>>, Form(form): Form<QueryForm>) -> Response {
    let page = Page::new(&state, &form);
    let page = match execute_form(&state, &form).await {
        Ok(output) => page.succeeded(output),
        Err(message) => page.failed(message),
    };
    render_page(&state, &page).await
}

async fn execute_form(state: &AppState, form: &QueryForm) -> Result<QueryOutput, String> {
    let backend: Backend = form.db.as_deref().unwrap_or_default().parse()?;
    let query = form
        .query
        .as_deref()
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| "missing query".to_string())?;
    let intent: CommitIntent = form.commit.as_deref().unwrap_or_default().parse()?;
    let params = parse_params(form.params.as_deref());

    let request = QueryRequest::new(backend.translate_placeholders(query))
        .with_params(params)
        .with_intent(intent);
    match state.backends.dispatch(backend, request).await {
        Ok(output) => {
            tracing::info!(
                %backend,
                rows = output.row_count(),
                completion = %output.completion,
                "query served"
            );
            Ok(output)
        }
        Err(err) => {
            tracing::warn!(%backend, error = %err, "query failed");
            Err(err.to_string())
        }
    }
}

async fn render_page(state: &AppState, page: &Page) -> Response {
    let source = match state.document_root.read_index().await {
        Ok(source) => source,
        Err(err) => {
            tracing::error!(
                error = %err,
                path = %state.document_root.index_path().display(),
                "template file unreadable"
            );
            return (StatusCode::INTERNAL_SERVER_ERROR, "Template file not found").into_response();
        }
    };

    let rendered = Template::compile(&source)
        .map_err(|e| e.to_string())
        .and_then(|tpl| {
            let context = serde_json::to_value(page).map_err(|e| e.to_string())?;
            tpl.render(&context).map_err(|e| e.to_string())
        });
    match rendered {
        Ok(body) => Html(body).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "template render failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
