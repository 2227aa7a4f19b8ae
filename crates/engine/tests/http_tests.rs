use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use sqlpad_engine::engine::Backends;
use sqlpad_engine::fs::DocumentRoot;
use sqlpad_engine::routes::{AppState, create_router};
use sqlpad_executor::{CommitRule, SqliteSettings, connect_sqlite};
use std::sync::Arc;
use tempfile::{TempDir, tempdir};
use tower::ServiceExt;

/// Router with a file-backed SQLite executor and no MySQL connection.
async fn create_test_app() -> (Router, TempDir) {
    let dir = tempdir().unwrap();
    let session = connect_sqlite(&SqliteSettings::new(dir.path().join("app.db")))
        .await
        .expect("open sqlite");
    let backends = Backends::from_sessions([session], CommitRule::Keyword, 4);
    let state = AppState {
        backends: Arc::new(backends),
        document_root: DocumentRoot::new(dir.path().to_path_buf(), "index.html".into()),
    };
    // return dir to keep the database and document root alive
    (create_router(state), dir)
}

async fn post(app: &Router, fields: &[(&str, &str)]) -> (StatusCode, String) {
    let body = serde_urlencoded::to_string(fields).unwrap();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

async fn run_sqlite(app: &Router, query: &str, params: &str) -> String {
    let (status, body) = post(
        app,
        &[
            ("query-input", query),
            ("db-input", "SQLITE"),
            ("params-input", params),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

#[tokio::test]
async fn get_renders_empty_form() {
    let (app, _dir) = create_test_app().await;
    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = String::from_utf8_lossy(&bytes);
    assert!(body.contains(r#"name="query-input""#));
    assert!(body.contains(r#"<option value="SQLITE" selected>SQLITE</option>"#));
    assert!(body.contains("MYSQL (offline)"));
    assert!(!body.contains("Status:"));
}

#[tokio::test]
async fn post_runs_statements_and_renders_rows() {
    let (app, _dir) = create_test_app().await;

    let create = "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT)";
    let body = run_sqlite(&app, create, "").await;
    assert!(body.contains("Status: OK"), "{body}");

    let body = run_sqlite(
        &app,
        "INSERT INTO people (id, name) VALUES (%s, %s)",
        r#"1, "<ann>""#,
    )
    .await;
    assert!(body.contains("0 row(s), committed"), "{body}");

    let body = run_sqlite(&app, "SELECT id, name FROM people WHERE id = %s", "1").await;
    assert!(body.contains("Status: OK"));
    assert!(body.contains("1 row(s), rolled back"));
    assert!(body.contains("<th>id</th><th>name</th>"));
    assert!(body.contains("<td>1</td><td>&lt;ann&gt;</td>"), "{body}");
}

#[tokio::test]
async fn absent_params_field_binds_nothing() {
    let (app, _dir) = create_test_app().await;
    let fields = [("query-input", "SELECT 5 AS five"), ("db-input", "SQLITE")];
    let (status, body) = post(&app, &fields).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<td>5</td>"), "{body}");
}

#[tokio::test]
async fn failing_query_renders_error_with_query_text() {
    let (app, _dir) = create_test_app().await;
    let body = run_sqlite(&app, "SELECT * FROM missing WHERE a = %s", "'x'").await;
    assert!(body.contains("Status: ERROR"));
    assert!(body.contains("no such table"), "{body}");
    assert!(body.contains("SELECT * FROM missing WHERE a = ?"));
    assert!(body.contains("params=(&quot;x&quot;)"), "{body}");
}

#[tokio::test]
async fn offline_backend_is_an_error_not_a_crash() {
    let (app, _dir) = create_test_app().await;
    let (status, body) = post(&app, &[("query-input", "SELECT 1"), ("db-input", "MYSQL")]).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Status: ERROR"));
    assert!(body.contains("no connection to the MYSQL database"));
}

#[tokio::test]
async fn bad_form_values_are_reported() {
    let (app, _dir) = create_test_app().await;

    let (_, body) = post(&app, &[("query-input", "SELECT 1"), ("db-input", "postgres")]).await;
    assert!(body.contains("unknown database selector"), "{body}");

    let (_, body) = post(&app, &[("query-input", "  "), ("db-input", "SQLITE")]).await;
    assert!(body.contains("missing query"));

    let (_, body) = post(
        &app,
        &[
            ("query-input", "SELECT 1"),
            ("db-input", "SQLITE"),
            ("commit-input", "maybe"),
        ],
    )
    .await;
    assert!(body.contains("unknown commit intent"));
}

#[tokio::test]
async fn rollback_intent_from_form_discards_insert() {
    let (app, _dir) = create_test_app().await;
    run_sqlite(&app, "CREATE TABLE t (id INTEGER)", "").await;

    let (_, body) = post(
        &app,
        &[
            ("query-input", "INSERT INTO t VALUES (1)"),
            ("db-input", "SQLITE"),
            ("commit-input", "rollback"),
        ],
    )
    .await;
    assert!(body.contains("rolled back"));

    let body = run_sqlite(&app, "SELECT COUNT(*) AS n FROM t", "").await;
    assert!(body.contains("<td>0</td>"), "{body}");
}

#[tokio::test]
async fn statements_outside_transactions_report_autocommit() {
    let (app, _dir) = create_test_app().await;
    let body = run_sqlite(&app, "VACUUM", "").await;
    assert!(body.contains("Status: OK"), "{body}");
    assert!(body.contains("0 row(s), autocommitted"), "{body}");
}

#[tokio::test]
async fn broken_template_is_a_server_error() {
    let (app, dir) = create_test_app().await;
    std::fs::write(dir.path().join("index.html"), "<? if status { ?>never closed").unwrap();
    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
