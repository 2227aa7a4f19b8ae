use serde_json::json;
use sqlpad_executor::{
    Backend, CommitIntent, CommitRule, Completion, ExecutorHandle, Param, Plan, QueryError,
    QueryRequest, SqliteSettings, connect_sqlite,
};
use tempfile::{TempDir, tempdir};

async fn spawn_file_executor(rule: CommitRule) -> (ExecutorHandle, TempDir) {
    let dir = tempdir().unwrap();
    let session = connect_sqlite(&SqliteSettings::new(dir.path().join("test.db")))
        .await
        .expect("open sqlite");
    let (handle, _task) = ExecutorHandle::spawn(session, rule, 8);
    // return dir to keep the file alive
    (handle, dir)
}

/// Count rows through a second, independent session so only committed data is visible.
async fn committed_count(dir: &TempDir, table: &str) -> i64 {
    let mut session = connect_sqlite(&SqliteSettings::new(dir.path().join("test.db")))
        .await
        .unwrap();
    let out = session
        .execute(&format!("SELECT COUNT(*) AS n FROM {table}"), &[], Plan::Direct)
        .await
        .unwrap();
    session.close().await.unwrap();
    out.rows[0][0].as_i64().unwrap()
}

async fn create_table(handle: &ExecutorHandle) {
    let out = handle
        .query(QueryRequest::new(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)",
        ))
        .await
        .unwrap();
    // no result set: an empty output, not an error
    assert!(out.is_empty());
    assert!(out.columns.is_empty());
    assert_eq!(out.completion, Completion::Committed);
}

#[tokio::test]
async fn select_returns_records_and_rolls_back() {
    let (handle, _dir) = spawn_file_executor(CommitRule::Keyword).await;
    let out = handle
        .query(QueryRequest::new("SELECT 1 AS one, 'x' AS two, NULL AS three, 1.5 AS four"))
        .await
        .unwrap();

    assert_eq!(out.columns, vec!["one", "two", "three", "four"]);
    assert_eq!(out.rows, vec![vec![json!(1), json!("x"), json!(null), json!(1.5)]]);
    assert_eq!(out.completion, Completion::RolledBack);

    let records = out.records();
    assert_eq!(records[0]["two"], json!("x"));
}

#[tokio::test]
async fn insert_is_committed_and_visible_elsewhere() {
    let (handle, dir) = spawn_file_executor(CommitRule::Keyword).await;
    create_table(&handle).await;

    let out = handle
        .query(
            QueryRequest::new("insert into t (id, name) values (?, ?)")
                .with_params(vec![Param::Int(1), Param::Text("alice".into())]),
        )
        .await
        .unwrap();
    assert_eq!(out.completion, Completion::Committed);
    assert_eq!(committed_count(&dir, "t").await, 1);
}

#[tokio::test]
async fn substring_rule_keeps_unmatched_ddl() {
    let (handle, dir) = spawn_file_executor(CommitRule::Substring).await;
    let out = handle
        .query(QueryRequest::new("CREATE TABLE people (id INTEGER)"))
        .await
        .unwrap();
    assert_eq!(out.completion, Completion::Autocommitted);
    assert_eq!(committed_count(&dir, "people").await, 0);

    let out = handle
        .query(QueryRequest::new("INSERT INTO people (id) VALUES (1)"))
        .await
        .unwrap();
    assert_eq!(out.completion, Completion::Committed);
    assert_eq!(committed_count(&dir, "people").await, 1);
}

#[tokio::test]
async fn substring_rule_misses_lowercase_insert() {
    let (handle, dir) = spawn_file_executor(CommitRule::Substring).await;
    handle
        .query(QueryRequest::new("CREATE TABLE t (id INTEGER PRIMARY KEY)"))
        .await
        .unwrap();

    let out = handle
        .query(QueryRequest::new("insert into t (id) values (1)"))
        .await
        .unwrap();
    assert_eq!(out.completion, Completion::RolledBack);
    assert_eq!(committed_count(&dir, "t").await, 0);
}

#[tokio::test]
async fn substring_rule_commits_reads_that_mention_update() {
    let (handle, _dir) = spawn_file_executor(CommitRule::Substring).await;
    handle
        .query(QueryRequest::new("CREATE TABLE UPDATE_LOG (id INTEGER)"))
        .await
        .unwrap();

    let out = handle
        .query(QueryRequest::new("SELECT * FROM UPDATE_LOG"))
        .await
        .unwrap();
    assert_eq!(out.completion, Completion::Committed);

    let (keyword, _dir2) = spawn_file_executor(CommitRule::Keyword).await;
    let out = keyword
        .query(QueryRequest::new("SELECT 'UPDATE' AS word"))
        .await
        .unwrap();
    assert_eq!(out.completion, Completion::RolledBack);
}

#[tokio::test]
async fn vacuum_runs_outside_a_transaction() {
    let (handle, _dir) = spawn_file_executor(CommitRule::Keyword).await;
    create_table(&handle).await;
    let out = handle.query(QueryRequest::new("VACUUM")).await.unwrap();
    assert_eq!(out.completion, Completion::Autocommitted);
}

#[tokio::test]
async fn transaction_typed_in_queries_spans_requests() {
    let (handle, dir) = spawn_file_executor(CommitRule::Keyword).await;
    create_table(&handle).await;

    let out = handle.query(QueryRequest::new("BEGIN")).await.unwrap();
    assert_eq!(out.completion, Completion::Pending);
    let out = handle
        .query(QueryRequest::new("INSERT INTO t (id) VALUES (1)"))
        .await
        .unwrap();
    assert_eq!(out.completion, Completion::Pending);
    assert_eq!(committed_count(&dir, "t").await, 0);

    let out = handle.query(QueryRequest::new("COMMIT")).await.unwrap();
    assert_eq!(out.completion, Completion::Committed);
    assert_eq!(committed_count(&dir, "t").await, 1);

    handle.query(QueryRequest::new("begin")).await.unwrap();
    handle
        .query(QueryRequest::new("DELETE FROM t"))
        .await
        .unwrap();
    let out = handle.query(QueryRequest::new("ROLLBACK")).await.unwrap();
    assert_eq!(out.completion, Completion::RolledBack);
    assert_eq!(committed_count(&dir, "t").await, 1);

    // back to one transaction per statement
    let request = QueryRequest::new("INSERT INTO t (id) VALUES (2)");
    let out = handle
        .query(request.with_intent(CommitIntent::Rollback))
        .await
        .unwrap();
    assert_eq!(out.completion, Completion::RolledBack);
    assert_eq!(committed_count(&dir, "t").await, 1);
}

#[tokio::test]
async fn rollback_intent_discards_mutation() {
    let (handle, dir) = spawn_file_executor(CommitRule::Keyword).await;
    create_table(&handle).await;

    let out = handle
        .query(
            QueryRequest::new("INSERT INTO t (id) VALUES (1)").with_intent(CommitIntent::Rollback),
        )
        .await
        .unwrap();
    assert_eq!(out.completion, Completion::RolledBack);
    assert_eq!(committed_count(&dir, "t").await, 0);
}

#[tokio::test]
async fn failing_statement_leaves_state_unchanged() {
    let (handle, dir) = spawn_file_executor(CommitRule::Keyword).await;
    create_table(&handle).await;
    handle
        .query(QueryRequest::new("INSERT INTO t (id) VALUES (1)"))
        .await
        .unwrap();

    let sql = "INSERT INTO t (id) VALUES (?), (?)";
    let params = vec![Param::Int(2), Param::Int(1)];
    let err = handle
        .query(QueryRequest::new(sql).with_params(params.clone()))
        .await
        .unwrap_err();

    match &err {
        QueryError::Execution {
            message,
            query,
            params: got,
        } => {
            assert!(message.contains("UNIQUE"), "unexpected message: {message}");
            assert_eq!(query, sql);
            assert_eq!(got, &params);
        }
        other => panic!("expected an execution error, got {other:?}"),
    }
    let text = err.to_string();
    assert!(text.contains(sql));
    assert!(text.contains("params=(2, 1)"));

    assert_eq!(committed_count(&dir, "t").await, 1);

    // the session is still usable after the rollback
    let out = handle
        .query(QueryRequest::new("SELECT id FROM t"))
        .await
        .unwrap();
    assert_eq!(out.rows, vec![vec![json!(1)]]);
}

#[tokio::test]
async fn parameters_are_bound_not_interpolated() {
    let (handle, _dir) = spawn_file_executor(CommitRule::Keyword).await;
    let hostile = "x'); DROP TABLE t; --";
    let sql = Backend::Sqlite.translate_placeholders("SELECT %s AS v, %s + %s AS s");
    let out = handle
        .query(QueryRequest::new(sql).with_params(vec![
            Param::Text(hostile.into()),
            Param::Int(1),
            Param::Int(2),
        ]))
        .await
        .unwrap();
    assert_eq!(out.rows, vec![vec![json!(hostile), json!(3)]]);
}

#[tokio::test]
async fn blobs_are_base64() {
    let (handle, _dir) = spawn_file_executor(CommitRule::Keyword).await;
    let out = handle
        .query(QueryRequest::new("SELECT x'00ff' AS b"))
        .await
        .unwrap();
    assert_eq!(out.rows, vec![vec![json!("AP8=")]]);
}

#[tokio::test]
async fn shutdown_makes_backend_unavailable() {
    let dir = tempdir().unwrap();
    let session = connect_sqlite(&SqliteSettings::new(dir.path().join("test.db")))
        .await
        .unwrap();
    let (handle, task) = ExecutorHandle::spawn(session, CommitRule::Keyword, 1);
    assert_eq!(handle.backend(), Backend::Sqlite);

    handle.shutdown().await;
    task.await.unwrap();

    let err = handle.query(QueryRequest::new("SELECT 1")).await.unwrap_err();
    assert!(matches!(err, QueryError::Unavailable(Backend::Sqlite)));
}

#[tokio::test]
async fn memory_database_is_accepted() {
    let mut session = connect_sqlite(&SqliteSettings::new(":memory:")).await.unwrap();
    let out = session
        .execute("SELECT 2 AS two", &[], Plan::Transaction { commit: false })
        .await
        .unwrap();
    assert_eq!(out.rows, vec![vec![json!(2)]]);
}
