//! Integration tests for retried execution and transactional scoping

use mtsql::prelude::*;
use mtsql::testing::{MockCall, MockDatabase, RecordingSink};
use sea_query::{Alias, Expr, Query};

mod common;

const UPDATE: &str = "UPDATE accounts SET balance = 0";

// ============================================================================
// Engine Handle Tests
// ============================================================================

#[tokio::test]
async fn test_engine_execute_commits() {
    let db = MockDatabase::new().with_rows_affected(5);
    let engine = db.engine();

    let outcome = execute(
        UPDATE,
        ExecutionHandle::Engine(&engine),
        &RetryPolicy::default(),
        None,
    )
    .await
    .unwrap();

    assert_eq!(outcome.rows_affected, 5);
    assert_eq!(outcome.statement, UPDATE);
    assert_eq!(db.begins(), 1);
    assert_eq!(db.commits(), 1);
    assert_eq!(db.rollbacks(), 0);
    assert_eq!(db.committed_statements(), vec![UPDATE]);
}

#[tokio::test]
async fn test_transient_failure_rolls_back_then_retries() {
    let db = MockDatabase::new().fail_next(MockCall::Execute, Error::connection("reset"));
    let engine = db.engine();
    let sink = RecordingSink::new();

    execute(
        UPDATE,
        ExecutionHandle::Engine(&engine),
        &RetryPolicy::default(),
        Some(&sink),
    )
    .await
    .unwrap();

    assert_eq!(db.begins(), 2);
    assert_eq!(db.rollbacks(), 1);
    assert_eq!(db.commits(), 1);
    assert_eq!(db.committed_statements(), vec![UPDATE]);
    assert_eq!(sink.transient_failures().len(), 1);
}

#[tokio::test]
async fn test_fatal_failure_commits_nothing() {
    let db = MockDatabase::new().fail_next(MockCall::Execute, Error::query("syntax error"));
    let engine = db.engine();

    let err = execute(
        UPDATE,
        ExecutionHandle::Engine(&engine),
        &RetryPolicy::default(),
        None,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Query { .. }));
    assert_eq!(db.call_count(MockCall::Execute), 1);
    assert_eq!(db.rollbacks(), 1);
    assert_eq!(db.commits(), 0);
    assert!(db.committed_statements().is_empty());
}

#[tokio::test]
async fn test_exhausted_retries_commit_nothing() {
    let db = MockDatabase::new()
        .fail_next(MockCall::Execute, Error::connection("reset"))
        .fail_next(MockCall::Execute, Error::connection("reset"))
        .fail_next(MockCall::Execute, Error::connection("reset"));
    let engine = db.engine();

    let err = execute(
        UPDATE,
        ExecutionHandle::Engine(&engine),
        &RetryPolicy::default(),
        None,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::ExhaustedRetries { trials: 3, .. }));
    assert_eq!(db.rollbacks(), 3);
    assert!(db.committed_statements().is_empty());
}

#[tokio::test]
async fn test_begin_failure_is_retried() {
    let db = MockDatabase::new().fail_next(MockCall::Begin, Error::PoolExhausted {
        message: "no idle connections".into(),
    });
    let engine = db.engine();

    execute(
        UPDATE,
        ExecutionHandle::Engine(&engine),
        &RetryPolicy::default(),
        None,
    )
    .await
    .unwrap();

    assert_eq!(db.call_count(MockCall::Begin), 2);
    assert_eq!(db.commits(), 1);
}

#[tokio::test]
async fn test_commit_failure_is_retried_without_duplicate_writes() {
    let db = MockDatabase::new().fail_next(MockCall::Commit, Error::transaction("serialization"));
    let engine = db.engine();

    execute(
        UPDATE,
        ExecutionHandle::Engine(&engine),
        &RetryPolicy::default(),
        None,
    )
    .await
    .unwrap();

    assert_eq!(db.executed_statements().len(), 2);
    assert_eq!(db.committed_statements(), vec![UPDATE]);
}

// ============================================================================
// Connection Handle Tests
// ============================================================================

#[tokio::test]
async fn test_connection_handle_never_commits_or_rolls_back() {
    let db = MockDatabase::new().fail_next(MockCall::Execute, Error::timeout("slow"));
    let conn = db.connection();

    execute(
        UPDATE,
        ExecutionHandle::Connection(&conn),
        &RetryPolicy::default(),
        None,
    )
    .await
    .unwrap();

    assert_eq!(db.begins(), 0);
    assert_eq!(db.commits(), 0);
    assert_eq!(db.rollbacks(), 0);
    assert_eq!(db.executed_statements(), vec![UPDATE]);
}

#[tokio::test]
async fn test_connection_handle_propagates_fatal_errors() {
    let db = MockDatabase::new().fail_next(
        MockCall::Execute,
        Error::Constraint {
            constraint_name: "accounts_pkey".into(),
            message: "duplicate".into(),
        },
    );
    let conn = db.connection();

    let err = execute(
        UPDATE,
        ExecutionHandle::Connection(&conn),
        &RetryPolicy::default(),
        None,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Constraint { .. }));
    assert_eq!(db.calls(), vec![MockCall::Execute]);
}

// ============================================================================
// Statement Form Tests
// ============================================================================

#[tokio::test]
async fn test_multiline_statement_is_displayed_on_one_line() {
    let db = MockDatabase::new();
    let engine = db.engine();

    let outcome = execute(
        "UPDATE accounts\n    SET balance = 0\n    WHERE id = 1",
        ExecutionHandle::Engine(&engine),
        &RetryPolicy::default(),
        None,
    )
    .await
    .unwrap();

    assert_eq!(
        outcome.statement,
        "UPDATE accounts SET balance = 0 WHERE id = 1"
    );
}

#[tokio::test]
async fn test_prebuilt_statement_is_executed_with_placeholders() {
    let db = MockDatabase::new();
    let engine = db.engine();

    let mut stmt = Query::delete();
    stmt.from_table(Alias::new("accounts"))
        .and_where(Expr::col(Alias::new("id")).eq(7));

    let outcome = execute(
        stmt,
        ExecutionHandle::Engine(&engine),
        &RetryPolicy::default(),
        None,
    )
    .await
    .unwrap();

    assert_eq!(
        db.committed_statements(),
        vec![r#"DELETE FROM "accounts" WHERE "id" = $1"#]
    );
    assert_eq!(outcome.statement, r#"DELETE FROM "accounts" WHERE "id" = 7"#);
}

// ============================================================================
// Logging Tests
// ============================================================================

#[tokio::test]
async fn test_tracing_sink_observes_without_changing_outcome() {
    common::init_test_logging();
    let db = MockDatabase::new()
        .fail_next(MockCall::Execute, Error::connection("reset"))
        .with_rows_affected(2);
    let engine = db.engine();

    let outcome = execute(
        UPDATE,
        ExecutionHandle::Engine(&engine),
        &RetryPolicy::default(),
        Some(&TracingSink),
    )
    .await
    .unwrap();

    assert_eq!(outcome.rows_affected, 2);
    assert_eq!(db.committed_statements(), vec![UPDATE]);
}
