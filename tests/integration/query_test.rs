//! Query execution integration tests.
//!
//! Runs statements against a live database and checks the result payload.

use super::get_test_runner;
use pg_query_runner::db::{PortableType, QueryResult, QUERY_CANCELLED};
use pg_query_runner::error::RunnerError;
use pg_query_runner::runner::QueryRunner;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

async fn run(sql: &str) -> Option<QueryResult> {
    let runner = get_test_runner()?;
    let outcome = runner
        .run_query(sql, &CancellationToken::new())
        .await
        .unwrap();
    let payload = outcome.payload().expect("query should succeed");
    Some(QueryResult::from_json(payload).unwrap())
}

#[tokio::test]
async fn test_execute_simple_select() {
    let Some(result) = run("SELECT 1 AS num, 'hello' AS greeting").await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    assert_eq!(result.columns.len(), 2);
    assert_eq!(result.columns[0].name, "num");
    assert_eq!(result.columns[0].column_type, PortableType::Integer);
    assert_eq!(result.columns[1].name, "greeting");
    assert_eq!(result.columns[1].column_type, PortableType::Unknown);
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0]["num"], json!(1));
    assert_eq!(result.rows[0]["greeting"], json!("hello"));
}

#[tokio::test]
async fn test_duplicate_column_names() {
    let Some(result) = run("SELECT 1 AS a, 2 AS a, 3 AS b, 4 AS a").await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let names: Vec<_> = result.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["a", "a1", "b", "a2"]);
    assert_eq!(result.rows[0]["a1"], json!(2));
    assert_eq!(result.rows[0]["a2"], json!(4));
}

#[tokio::test]
async fn test_execute_select_with_null() {
    let Some(result) = run("SELECT NULL::int AS nothing, true AS flag").await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    assert_eq!(result.columns[0].column_type, PortableType::Integer);
    assert_eq!(result.columns[1].column_type, PortableType::Boolean);
    assert_eq!(result.rows[0]["nothing"], json!(null));
    assert_eq!(result.rows[0]["flag"], json!(true));
}

#[tokio::test]
async fn test_temporal_and_numeric_types() {
    let sql = "SELECT DATE '2024-01-15' AS d, \
               TIMESTAMP '2024-01-15 10:30:00' AS ts, \
               1.5::numeric AS n, 2.5::float8 AS f";
    let Some(result) = run(sql).await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let types: Vec<_> = result.columns.iter().map(|c| c.column_type).collect();
    assert_eq!(
        types,
        vec![
            PortableType::Date,
            PortableType::Datetime,
            PortableType::Float,
            PortableType::Float
        ]
    );
    assert_eq!(result.rows[0]["d"], json!("2024-01-15"));
    assert_eq!(result.rows[0]["ts"], json!("2024-01-15T10:30:00"));
    assert_eq!(result.rows[0]["n"], json!("1.5"));
    assert_eq!(result.rows[0]["f"], json!(2.5));
}

#[tokio::test]
async fn test_statement_without_result_set() {
    let Some(result) = run("SET search_path TO public").await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    assert!(result.is_empty());
    assert!(result.columns.is_empty());
}

#[tokio::test]
async fn test_syntax_error_is_failure() {
    let Some(runner) = get_test_runner() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let outcome = runner
        .run_query("SELEC 1", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.payload(), None);
    assert!(outcome.error().unwrap().contains("syntax error"));
}

#[tokio::test]
async fn test_cancel_long_running_query() {
    let Some(runner) = get_test_runner() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let outcome = runner.run_query("SELECT pg_sleep(30)", &cancel).await.unwrap();

    assert_eq!(outcome.error(), Some(QUERY_CANCELLED));
}

#[tokio::test]
async fn test_extended_types_keep_their_values() {
    let sql = "SELECT 'a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11'::uuid AS u, \
               ARRAY[1, 2]::int4[] AS ia, \
               ARRAY[1.5, NULL]::float8[] AS fa, \
               ARRAY[true, false] AS ba, \
               interval '1 day' AS iv, \
               ARRAY['a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11'::uuid] AS ua, \
               '1e40'::numeric AS big, \
               'NaN'::numeric AS nan, \
               '10.0.0.1'::inet AS ip, \
               '10.0.0.0/8'::cidr AS net, \
               'x'::\"char\" AS ch";
    let Some(result) = run(sql).await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let row = serde_json::Value::Object(result.rows[0].clone());
    assert_eq!(
        row,
        json!({
            "u": "a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11",
            "ia": [1, 2],
            "fa": [1.5, null],
            "ba": [true, false],
            "iv": "1 day",
            "ua": ["a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11"],
            "big": format!("1{}", "0".repeat(40)),
            "nan": "NaN",
            "ip": "10.0.0.1",
            "net": "10.0.0.0/8",
            "ch": "x"
        })
    );
    let ua = result.columns.iter().find(|c| c.name == "ua").unwrap();
    assert_eq!(ua.column_type, PortableType::String);
}

#[tokio::test]
async fn test_unsupported_binary_type_is_raised() {
    let Some(runner) = get_test_runner() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let err = runner
        .run_query("SELECT point(1, 2) AS p", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RunnerError::Unexpected(_)));
}

#[tokio::test]
async fn test_multiple_statements_return_last_result() {
    let Some(result) = run("SET search_path TO public; SELECT 1 AS x, 'y'::text AS y").await
    else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let names: Vec<_> = result.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["x", "y"]);
    assert_eq!(result.columns[0].column_type, PortableType::Integer);
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0]["x"], json!(1));
    assert_eq!(result.rows[0]["y"], json!("y"));
}

#[tokio::test]
async fn test_multiple_statements_ending_without_rows() {
    let Some(result) = run("SELECT 1 AS x; SET search_path TO public").await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    assert!(result.is_empty());
    assert!(result.columns.is_empty());
}
