use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use sluice_runtime::{Event, Gate, LogLevel, Runner, StreamLog, ERROR_EVENT};
use sluice_sql::{kinds, SqlDispatchGate, SQL_EVENT};
use sluice_store_memory::{MemoryRefs, MemoryStore};

fn sql_runner() -> Runner {
    let mut runner = Runner::with_log(
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryRefs::new()),
        StreamLog::new(LogLevel::Events),
    );
    runner.register(Gate::pure(SqlDispatchGate::new()));
    runner
}

#[tokio::test]
async fn test_statement_routes_to_pending_parse_event() -> Result<()> {
    let runner = sql_runner();

    runner
        .emit(Event::new(SQL_EVENT, json!({"sql": "SELECT * FROM users"})))
        .await?;

    // No gate claims select_parse here, so it parks in pending with the
    // statement intact.
    let entries = runner.log().sample().await;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].kind, SQL_EVENT);
    assert_eq!(entries[0].claimed.as_deref(), Some(SQL_EVENT));
    assert_eq!(entries[1].kind, kinds::SELECT_PARSE);
    assert_eq!(entries[1].claimed, None);

    let pending = runner.pending().await;
    assert_eq!(pending[0].kind, kinds::SELECT_PARSE);
    assert_eq!(pending[0].data["sql"], "SELECT * FROM users");
    Ok(())
}

#[tokio::test]
async fn test_unrecognized_statement_lands_as_error() -> Result<()> {
    let runner = sql_runner();

    runner
        .emit(Event::new(SQL_EVENT, json!({"sql": "GRANT ALL ON users"})))
        .await?;

    let pending = runner.pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, ERROR_EVENT);
    assert!(pending[0].data["message"]
        .as_str()
        .unwrap()
        .contains("Unrecognized"));
    Ok(())
}
