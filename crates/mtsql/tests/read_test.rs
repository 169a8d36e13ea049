//! Integration tests for whole and chunked reads

use mtsql::prelude::*;
use mtsql::testing::{id_row, id_table, MockCall, MockDatabase, RecordingSink, SinkEvent};

mod common;

const SELECT: &str = "SELECT id FROM events";

fn ids(table: &Table) -> Vec<i64> {
    table
        .rows()
        .iter()
        .filter_map(|row| row.get(0).and_then(|v| v.as_i64()))
        .collect()
}

fn three_batches() -> Vec<Table> {
    vec![id_table(&[1, 2]), id_table(&[3, 4]), id_table(&[5])]
}

// ============================================================================
// Whole Read Tests
// ============================================================================

#[tokio::test]
async fn test_read_returns_all_rows() {
    let db = MockDatabase::new().respond_to("FROM events", (1..=4).map(id_row).collect());
    let engine = db.engine();

    let table = read(
        SELECT,
        ExecutionHandle::Engine(&engine),
        &ReadOptions::new(),
        Sinks::none(),
    )
    .await
    .unwrap();

    assert_eq!(ids(&table), vec![1, 2, 3, 4]);
    assert_eq!(table.columns(), &["id".to_string()]);
    assert_eq!(db.commits(), 1);
}

#[tokio::test]
async fn test_read_retries_inside_one_scope() {
    let db = MockDatabase::new()
        .respond_to("FROM events", vec![id_row(1)])
        .fail_next(MockCall::Query, Error::connection("reset"));
    let engine = db.engine();
    let sink = RecordingSink::new();

    let table = read(
        SELECT,
        ExecutionHandle::Engine(&engine),
        &ReadOptions::new(),
        Sinks::none().with_diagnostics(&sink),
    )
    .await
    .unwrap();

    assert_eq!(table.row_count(), 1);
    assert_eq!(db.begins(), 1);
    assert_eq!(db.call_count(MockCall::Query), 2);
    assert_eq!(sink.transient_failures().len(), 1);
}

#[tokio::test]
async fn test_read_empty_result() {
    let db = MockDatabase::new();
    let engine = db.engine();

    let table = read(
        SELECT,
        ExecutionHandle::Engine(&engine),
        &ReadOptions::new(),
        Sinks::none(),
    )
    .await
    .unwrap();

    assert!(table.is_empty());
}

#[tokio::test]
async fn test_read_table_selects_everything() {
    let db = MockDatabase::new().respond_to(r#"FROM "analytics"."events""#, vec![id_row(9)]);
    let conn = db.connection();

    let table = read_table(
        "events",
        Some("analytics"),
        ExecutionHandle::Connection(&conn),
        &ReadOptions::new(),
        Sinks::none(),
    )
    .await
    .unwrap();

    assert_eq!(ids(&table), vec![9]);
}

#[tokio::test]
async fn test_zero_batch_size_is_rejected_before_io() {
    let db = MockDatabase::new();
    let engine = db.engine();

    let err = read(
        SELECT,
        ExecutionHandle::Engine(&engine),
        &ReadOptions::new().with_batch_size(0),
        Sinks::none(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Configuration { .. }));
    assert!(db.calls().is_empty());
}

// ============================================================================
// Chunked Read Tests
// ============================================================================

#[tokio::test]
async fn test_chunked_read_concatenates_batches_in_order() {
    let db = MockDatabase::new().with_batches(three_batches());
    let engine = db.engine();
    let sink = RecordingSink::new();

    let table = read(
        "SELECT id\n  FROM events",
        ExecutionHandle::Engine(&engine),
        &ReadOptions::new().with_batch_size(2),
        Sinks::none().with_progress(&sink),
    )
    .await
    .unwrap();

    assert_eq!(ids(&table), vec![1, 2, 3, 4, 5]);
    assert_eq!(db.commits(), 1);
    assert_eq!(
        sink.events(),
        vec![
            SinkEvent::Started("SELECT id FROM events".into()),
            SinkEvent::Progress(2),
            SinkEvent::Progress(4),
            SinkEvent::Progress(5),
            SinkEvent::Succeeded(5),
        ]
    );
}

#[tokio::test]
async fn test_chunked_read_splits_query_response() {
    let db = MockDatabase::new().respond_to("FROM events", (1..=7).map(id_row).collect());
    let conn = db.connection();

    let table = read(
        SELECT,
        ExecutionHandle::Connection(&conn),
        &ReadOptions::new().with_batch_size(3),
        Sinks::none(),
    )
    .await
    .unwrap();

    assert_eq!(ids(&table), (1..=7).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_interrupted_read_raises_by_default() {
    let db = MockDatabase::new()
        .with_batches(three_batches())
        .fail_stream_after(2, Error::connection("server closed the connection"));
    let engine = db.engine();
    let sink = RecordingSink::new();

    let err = read(
        SELECT,
        ExecutionHandle::Engine(&engine),
        &ReadOptions::new().with_batch_size(2),
        Sinks::none().with_progress(&sink).with_diagnostics(&sink),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Connection { .. }));
    assert_eq!(db.commits(), 0);
    assert_eq!(db.rollbacks(), 1);
    assert_eq!(sink.events().last(), Some(&SinkEvent::Failed(4)));
    assert!(sink.warnings().is_empty());
}

#[tokio::test]
async fn test_interrupted_read_returns_partial_under_warn() {
    let db = MockDatabase::new()
        .with_batches(three_batches())
        .fail_stream_after(2, Error::connection("server closed the connection"));
    let engine = db.engine();
    let sink = RecordingSink::new();

    let table = read(
        SELECT,
        ExecutionHandle::Engine(&engine),
        &ReadOptions::new()
            .with_batch_size(2)
            .with_failure_policy("warn"),
        Sinks::none().with_progress(&sink).with_diagnostics(&sink),
    )
    .await
    .unwrap();

    assert_eq!(ids(&table), vec![1, 2, 3, 4]);
    assert_eq!(db.rollbacks(), 1);
    assert_eq!(db.commits(), 0);
    assert_eq!(sink.warnings().len(), 1);
}

#[tokio::test]
async fn test_failure_before_first_batch_returns_empty_partial() {
    let db = MockDatabase::new()
        .with_batches(three_batches())
        .fail_stream_after(0, Error::timeout("cursor timed out"));
    let conn = db.connection();

    let table = read(
        SELECT,
        ExecutionHandle::Connection(&conn),
        &ReadOptions::new()
            .with_batch_size(2)
            .with_failure_policy(PartialFailurePolicy::WarnAndReturnPartial),
        Sinks::none(),
    )
    .await
    .unwrap();

    assert!(table.is_empty());
    assert_eq!(db.rollbacks(), 0);
}

#[tokio::test]
async fn test_unknown_policy_only_fails_on_error_path() {
    let options = ReadOptions::new()
        .with_batch_size(2)
        .with_failure_policy("skip");

    let healthy = MockDatabase::new().with_batches(three_batches());
    let engine = healthy.engine();
    let table = read(SELECT, ExecutionHandle::Engine(&engine), &options, Sinks::none())
        .await
        .unwrap();
    assert_eq!(table.row_count(), 5);

    let broken = MockDatabase::new()
        .with_batches(three_batches())
        .fail_stream_after(1, Error::connection("reset"));
    let engine = broken.engine();
    let err = read(SELECT, ExecutionHandle::Engine(&engine), &options, Sinks::none())
        .await
        .unwrap_err();

    match err {
        Error::InvalidPolicy { value, source } => {
            assert_eq!(value, "skip");
            assert!(matches!(*source, Error::Connection { .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_stream_start_is_retried() {
    let db = MockDatabase::new()
        .with_batches(three_batches())
        .fail_next(MockCall::FetchBatches, Error::connection("refused"));
    let engine = db.engine();
    let sink = RecordingSink::new();

    let table = read(
        SELECT,
        ExecutionHandle::Engine(&engine),
        &ReadOptions::new().with_batch_size(2),
        Sinks::none().with_diagnostics(&sink),
    )
    .await
    .unwrap();

    assert_eq!(table.row_count(), 5);
    assert_eq!(db.call_count(MockCall::FetchBatches), 2);
    assert_eq!(sink.transient_failures().len(), 1);
}

#[tokio::test]
async fn test_stream_start_fatal_failure_reports_failed() {
    let db = MockDatabase::new().fail_next(
        MockCall::FetchBatches,
        Error::TableNotFound {
            table: "events".into(),
        },
    );
    let engine = db.engine();
    let sink = RecordingSink::new();

    let err = read(
        SELECT,
        ExecutionHandle::Engine(&engine),
        &ReadOptions::new()
            .with_batch_size(2)
            .with_failure_policy("warn"),
        Sinks::none().with_progress(&sink),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::TableNotFound { .. }));
    assert_eq!(db.rollbacks(), 1);
    assert_eq!(
        sink.events(),
        vec![SinkEvent::Started(SELECT.into()), SinkEvent::Failed(0)]
    );
}

#[tokio::test]
async fn test_begin_failure_still_reports_failed() {
    let db = MockDatabase::new().fail_next(
        MockCall::Begin,
        Error::Authentication {
            message: "password expired".into(),
        },
    );
    let engine = db.engine();
    let sink = RecordingSink::new();

    let err = read(
        SELECT,
        ExecutionHandle::Engine(&engine),
        &ReadOptions::new().with_batch_size(2),
        Sinks::none().with_progress(&sink),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Authentication { .. }));
    assert_eq!(db.call_count(MockCall::FetchBatches), 0);
    assert_eq!(
        sink.events(),
        vec![SinkEvent::Started(SELECT.into()), SinkEvent::Failed(0)]
    );
}

#[tokio::test]
async fn test_chunked_read_on_connection_handle_leaves_transaction_open() {
    let db = MockDatabase::new().respond_to("FROM events", id_table(&[1, 2, 3]).into_rows());
    let conn = db.connection();

    let table = read(
        SELECT,
        ExecutionHandle::Connection(&conn),
        &ReadOptions::new().with_batch_size(2),
        Sinks::none(),
    )
    .await
    .unwrap();

    assert_eq!(table.row_count(), 3);
    assert_eq!(db.commits(), 0);
    assert_eq!(db.rollbacks(), 0);
}

// ============================================================================
// Configuration Tests
// ============================================================================

#[tokio::test]
async fn test_config_drives_chunked_read() {
    let config = SqlConfig::from_json(
        r#"{"max_trials": 2, "chunk_size": 2, "exception_handling": "warn"}"#,
    )
    .unwrap();
    config.validate().unwrap();

    let db = MockDatabase::new()
        .with_batches(three_batches())
        .fail_stream_after(1, Error::Deadlock);
    let engine = db.engine();

    let table = read(
        SELECT,
        ExecutionHandle::Engine(&engine),
        &config.read_options(),
        Sinks::none(),
    )
    .await
    .unwrap();

    assert_eq!(ids(&table), vec![1, 2]);
}

#[tokio::test]
async fn test_tracing_sinks_on_chunked_read() {
    common::init_test_logging();
    let db = MockDatabase::new()
        .with_batches(three_batches())
        .fail_stream_after(2, Error::connection("reset"));
    let engine = db.engine();

    let table = read(
        SELECT,
        ExecutionHandle::Engine(&engine),
        &ReadOptions::new()
            .with_batch_size(2)
            .with_failure_policy("warn"),
        Sinks::tracing(),
    )
    .await
    .unwrap();

    assert_eq!(table.row_count(), 4);
}
