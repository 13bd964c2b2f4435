//! Schema introspection integration tests.

use super::get_test_runner;
use pg_query_runner::runner::QueryRunner;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_schema_lists_created_tables() {
    let Some(runner) = get_test_runner() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let cancel = CancellationToken::new();

    let setup = "CREATE SCHEMA IF NOT EXISTS pgrun_test; \
                 CREATE TABLE IF NOT EXISTS public.pgrun_items (id int, label text); \
                 CREATE TABLE IF NOT EXISTS pgrun_test.pgrun_items (sku text)";
    let outcome = runner.run_query(setup, &cancel).await.unwrap();
    assert!(outcome.is_success(), "{:?}", outcome.error());

    let schema = runner.get_schema().await.unwrap();

    let public = &schema["pgrun_items"];
    assert_eq!(public.name, "pgrun_items");
    assert_eq!(public.columns, vec!["id", "label"]);

    let other = &schema["pgrun_test.pgrun_items"];
    assert_eq!(other.columns, vec!["sku"]);

    assert!(schema.keys().all(|name| !name.starts_with("pg_catalog.")));
    assert!(schema
        .keys()
        .all(|name| !name.starts_with("information_schema.")));
}
