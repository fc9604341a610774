#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **sluice-sql** – SQL statement dispatch for sluice.
//!
//! A single pure gate that classifies a SQL string by its leading keywords
//! and re-emits the event under the matching `*_parse` kind, leaving the
//! actual grammar work to whichever gates claim those kinds. Statements it
//! cannot classify become `error` events.

use anyhow::{Context, Result};
use serde_json::json;

use sluice_runtime::{Event, PureGate, ERROR_EVENT};

/// Event kind the dispatch gate claims.
pub const SQL_EVENT: &str = "sql";

/// Parse-event kinds the dispatcher routes to.
pub mod kinds {
    /// `CREATE TABLE …`
    pub const CREATE_TABLE_PARSE: &str = "create_table_parse";
    /// `CREATE INDEX …` or `CREATE UNIQUE INDEX …`
    pub const INDEX_CREATE_PARSE: &str = "index_create_parse";
    /// `CREATE VIEW …`
    pub const VIEW_CREATE_PARSE: &str = "view_create_parse";
    /// `CREATE TRIGGER …`
    pub const TRIGGER_CREATE_PARSE: &str = "trigger_create_parse";
    /// `DROP TABLE …`
    pub const DROP_TABLE_PARSE: &str = "drop_table_parse";
    /// `DROP INDEX …`
    pub const INDEX_DROP_PARSE: &str = "index_drop_parse";
    /// `DROP VIEW …`
    pub const VIEW_DROP_PARSE: &str = "view_drop_parse";
    /// `DROP TRIGGER …`
    pub const TRIGGER_DROP_PARSE: &str = "trigger_drop_parse";
    /// `INSERT …`
    pub const INSERT_PARSE: &str = "insert_parse";
    /// `SELECT …`
    pub const SELECT_PARSE: &str = "select_parse";
    /// `UPDATE …`
    pub const UPDATE_PARSE: &str = "update_parse";
    /// `DELETE …`
    pub const DELETE_PARSE: &str = "delete_parse";
}

/// A pure gate named `sql` that routes statements to parse events.
///
/// The original event payload carries through unchanged on every parse
/// event, so downstream parsers see the full statement.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlDispatchGate;

impl SqlDispatchGate {
    /// Create the dispatch gate.
    pub fn new() -> Self {
        Self
    }
}

impl PureGate for SqlDispatchGate {
    fn name(&self) -> &str {
        SQL_EVENT
    }

    fn transform(&self, event: &Event) -> Result<Event> {
        let sql = event
            .data
            .get("sql")
            .and_then(|v| v.as_str())
            .context("sql event payload is missing a string `sql` field")?;

        Ok(match classify(sql) {
            Some(kind) => Event::new(kind, event.data.clone()),
            None => Event::new(
                ERROR_EVENT,
                json!({"message": format!("Unrecognized SQL: {sql}")}),
            ),
        })
    }
}

/// Classify a statement by its leading keywords, case-insensitively.
///
/// Three-word `CREATE UNIQUE INDEX` is checked before the two-word forms
/// so the more specific keyword wins.
fn classify(sql: &str) -> Option<&'static str> {
    let mut tokens = sql.split_whitespace().map(|t| t.to_ascii_uppercase());
    let first = tokens.next()?;
    match first.as_str() {
        "CREATE" => match tokens.next()?.as_str() {
            "TABLE" => Some(kinds::CREATE_TABLE_PARSE),
            "UNIQUE" => (tokens.next()? == "INDEX").then_some(kinds::INDEX_CREATE_PARSE),
            "INDEX" => Some(kinds::INDEX_CREATE_PARSE),
            "VIEW" => Some(kinds::VIEW_CREATE_PARSE),
            "TRIGGER" => Some(kinds::TRIGGER_CREATE_PARSE),
            _ => None,
        },
        "DROP" => match tokens.next()?.as_str() {
            "TABLE" => Some(kinds::DROP_TABLE_PARSE),
            "INDEX" => Some(kinds::INDEX_DROP_PARSE),
            "VIEW" => Some(kinds::VIEW_DROP_PARSE),
            "TRIGGER" => Some(kinds::TRIGGER_DROP_PARSE),
            _ => None,
        },
        "INSERT" => Some(kinds::INSERT_PARSE),
        "SELECT" => Some(kinds::SELECT_PARSE),
        "UPDATE" => Some(kinds::UPDATE_PARSE),
        "DELETE" => Some(kinds::DELETE_PARSE),
        _ => None,
    }
}
