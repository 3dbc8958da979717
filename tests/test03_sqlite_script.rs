#![cfg(feature = "sqlite")]

use sql_tasks::prelude::*;
use tempfile::tempdir;

const SCHEMA: &str = "
CREATE TABLE %PREFIX%players (
    id   INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);
INSERT INTO %PREFIX%players (name) VALUES ('semi;colon');
INSERT INTO %PREFIX%players (name) VALUES ('it''s');
INSERT INTO %PREFIX%players (name) VALUES ('say \"hi;\"');
";

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn script_creates_schema_on_sqlite() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let db_path = dir.path().join("script.db");
    let pool = SqlitePool::builder(db_path.to_string_lossy()).build().await?;

    let names = tokio::task::spawn_blocking(move || -> Result<Vec<String>, SqlTaskError> {
        let executed = ScriptRunner::new(pool.acquire()?, SCHEMA.as_bytes())
            .replacement("%PREFIX%", "test_")
            .log_statements(true)
            .run_script()?;
        assert_eq!(executed, 4);

        let mut conn = pool.acquire()?;
        let mut stmt = conn.create_statement()?;
        let rows = stmt.execute_query("SELECT name FROM test_players ORDER BY id")?;
        stmt.close()?;
        conn.close()?;
        Ok(rows
            .results
            .iter()
            .filter_map(|row| row.get("name").and_then(RowValues::as_text).map(String::from))
            .collect())
    })
    .await??;

    assert_eq!(names, vec!["semi;colon", "it's", "say \"hi;\""]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_statement_stops_the_script() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let db_path = dir.path().join("broken.db");
    let pool = SqlitePool::builder(db_path.to_string_lossy()).build().await?;

    let count = tokio::task::spawn_blocking(move || -> Result<i64, SqlTaskError> {
        let script = "CREATE TABLE t (a INT); INSERT INTO t VALUES (1); INSERT INTO nope VALUES (2); INSERT INTO t VALUES (3);";
        let mut runner = ScriptRunner::new(pool.acquire()?, script.as_bytes()).close_connection(false);
        let err = runner.run_script().unwrap_err();
        assert!(matches!(err, SqlTaskError::ScriptStatement { index: 3, .. }));

        let (conn, input) = runner.into_parts();
        assert!(input.is_none());
        let mut conn = conn.expect("connection kept open");
        let mut stmt = conn.create_statement()?;
        let rows = stmt.execute_query("SELECT COUNT(*) FROM t")?;
        stmt.close()?;
        conn.close()?;
        Ok(*rows.results[0].get_by_index(0).and_then(RowValues::as_int).unwrap_or(&-1))
    })
    .await??;

    assert_eq!(count, 1);
    Ok(())
}
