//! Delivery ledger: which messages reached chat, and under which thread.

mod sqlite;

pub use sqlite::SqliteLedger;

use thiserror::Error;

use crate::model::record::MailRecord;

/// Persistence failures. They abort the current message only.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Keyed record store consulted for dedup checks and thread lookups.
pub trait DeliveryLedger {
    /// `true` iff a record with this id is present.
    fn exists(&self, message_id: &str) -> Result<bool, LedgerError>;

    /// Create the record, or update only its `thread_handle` if it exists.
    fn record_delivery(
        &mut self,
        message_id: &str,
        subject: &str,
        thread_handle: Option<&str>,
    ) -> Result<(), LedgerError>;

    /// All records whose id is in `message_ids`, in no particular order.
    fn resolve_threads(&self, message_ids: &[String]) -> Result<Vec<MailRecord>, LedgerError>;
}
