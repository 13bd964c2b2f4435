//! Runner tests over the scripted driver. These always run.

use pg_query_runner::config::RunnerConfig;
use pg_query_runner::db::{
    Interest, MockDriver, MockFailure, PollState, PortableType, QueryResult, RawColumn, Step,
    Value, QUERY_CANCELLED, QUERY_INTERRUPTED,
};
use pg_query_runner::error::RunnerError;
use pg_query_runner::runner::{PostgresRunner, QueryRunner};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::io;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn runner(driver: MockDriver) -> PostgresRunner<MockDriver> {
    let config = RunnerConfig {
        dbname: Some("testdb".to_string()),
        ..Default::default()
    };
    PostgresRunner::new(&config, driver).unwrap()
}

#[tokio::test]
async fn test_full_round_through_poll_states() {
    let driver = MockDriver::new(vec![
        Step::Poll(PollState::Write),
        Step::Poll(PollState::Read),
        Step::Poll(PollState::Ok),
        Step::Poll(PollState::Read),
        Step::Poll(PollState::Ok),
    ])
    .with_result(
        vec![
            RawColumn::new("id", 20),
            RawColumn::new("id", 20),
            RawColumn::new("price", 1700),
        ],
        vec![vec![
            Value::Int(7),
            Value::Int(8),
            Value::Decimal("9.99".parse().unwrap()),
        ]],
    );
    let probe = driver.probe();

    let sql = "SELECT o.id, i.id, i.price FROM o JOIN i ON true";
    let outcome = runner(driver)
        .run_query(sql, &CancellationToken::new())
        .await
        .unwrap();

    let result = QueryResult::from_json(outcome.payload().unwrap()).unwrap();
    let names: Vec<_> = result.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "id1", "price"]);
    assert_eq!(result.columns[1].friendly_name, "id1");
    assert_eq!(result.columns[2].column_type, PortableType::Float);
    assert_eq!(
        serde_json::Value::Object(result.rows[0].clone()),
        json!({"id": 7, "id1": 8, "price": "9.99"})
    );
    assert_eq!(
        probe.waits(),
        vec![Interest::Writable, Interest::Readable, Interest::Readable]
    );
    assert_eq!(probe.closes(), 1);
}

#[tokio::test]
async fn test_unknown_poll_state_is_interrupted() {
    let driver = MockDriver::new(vec![Step::Poll(PollState::Unknown(9))]);
    let probe = driver.probe();

    let outcome = runner(driver)
        .run_query("SELECT 1", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.error(), Some(QUERY_INTERRUPTED));
    assert_eq!(probe.closes(), 1);
}

#[tokio::test]
async fn test_wait_failure_is_interrupted() {
    let driver = MockDriver::new(vec![
        Step::Poll(PollState::Read),
        Step::WaitFails(io::ErrorKind::Interrupted),
    ]);

    let outcome = runner(driver)
        .run_query("SELECT 1", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.error(), Some(QUERY_INTERRUPTED));
}

#[tokio::test]
async fn test_cancel_while_waiting_on_result() {
    let driver = MockDriver::new(vec![
        Step::Poll(PollState::Ok),
        Step::Poll(PollState::Read),
        Step::Hang,
    ]);
    let probe = driver.probe();
    let runner = runner(driver);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let outcome = runner.run_query("SELECT pg_sleep(60)", &cancel).await.unwrap();

    assert_eq!(outcome.error(), Some(QUERY_CANCELLED));
    assert_eq!(outcome.payload(), None);
    assert_eq!(probe.cancels(), 1);
    assert_eq!(probe.closes(), 1);
}

#[tokio::test]
async fn test_unexpected_driver_error_propagates() {
    let driver = MockDriver::default().with_cursor_failure(MockFailure::Other(
        "unsupported result format".into(),
    ));
    let probe = driver.probe();

    let err = runner(driver)
        .run_query("SELECT 1", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RunnerError::Unexpected(_)));
    assert_eq!(err.category(), "Internal Error");
    assert_eq!(probe.closes(), 1);
}

#[tokio::test]
async fn test_schema_from_scripted_rows() {
    let driver = MockDriver::default().with_result(
        vec![
            RawColumn::new("table_schema", 25),
            RawColumn::new("table_name", 25),
            RawColumn::new("column_name", 25),
        ],
        vec![
            vec!["public".into(), "users".into(), "id".into()],
            vec!["public".into(), "users".into(), "email".into()],
            vec!["billing".into(), "invoices".into(), "total".into()],
        ],
    );

    let schema = runner(driver).get_schema().await.unwrap();

    let tables: Vec<_> = schema.values().map(|t| t.name.as_str()).collect();
    assert_eq!(tables, vec!["billing.invoices", "users"]);
    assert_eq!(schema["users"].columns, vec!["id", "email"]);
}
