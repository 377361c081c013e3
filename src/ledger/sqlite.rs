//! SQLite-backed ledger.

use std::path::Path;
use std::time::Duration;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::debug;

use super::{DeliveryLedger, LedgerError};
use crate::model::record::MailRecord;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS mail_messages (
    message_id TEXT PRIMARY KEY,
    subject TEXT NOT NULL,
    thread_handle TEXT
)";

/// Ledger stored in a single SQLite table, `mail_messages`.
#[derive(Debug)]
pub struct SqliteLedger {
    conn: Connection,
}

impl SqliteLedger {
    /// Open (or create) the ledger database at `path`.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        debug!(path = %path.display(), "Opened delivery ledger");
        Self::init(conn)
    }

    /// A throwaway ledger, gone when dropped.
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, LedgerError> {
        conn.execute(SCHEMA, [])?;
        Ok(Self { conn })
    }

    /// Fetch one record by id.
    pub fn get(&self, message_id: &str) -> Result<Option<MailRecord>, LedgerError> {
        let record = self
            .conn
            .query_row(
                "SELECT message_id, subject, thread_handle FROM mail_messages WHERE message_id = ?1",
                params![message_id],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }
}

impl DeliveryLedger for SqliteLedger {
    fn exists(&self, message_id: &str) -> Result<bool, LedgerError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM mail_messages WHERE message_id = ?1",
                params![message_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn record_delivery(
        &mut self,
        message_id: &str,
        subject: &str,
        thread_handle: Option<&str>,
    ) -> Result<(), LedgerError> {
        self.conn.execute(
            "INSERT INTO mail_messages (message_id, subject, thread_handle)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(message_id) DO UPDATE SET
                thread_handle = excluded.thread_handle",
            params![message_id, subject, thread_handle],
        )?;
        Ok(())
    }

    fn resolve_threads(&self, message_ids: &[String]) -> Result<Vec<MailRecord>, LedgerError> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; message_ids.len()].join(", ");
        let sql = format!(
            "SELECT message_id, subject, thread_handle FROM mail_messages
             WHERE message_id IN ({placeholders})"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(message_ids.iter()), row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MailRecord> {
    Ok(MailRecord {
        message_id: row.get(0)?,
        subject: row.get(1)?,
        thread_handle: row.get(2)?,
    })
}
