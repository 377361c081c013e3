//! Find the chat thread a reply belongs to.

use crate::ledger::{DeliveryLedger, LedgerError};

/// Resolve the parent thread handle for a message's `References`.
///
/// Of the referenced messages already in the ledger, the one appearing
/// earliest in `references` with a thread handle wins. Returns `None` for an
/// empty `References` or no match.
pub fn resolve_thread<L: DeliveryLedger + ?Sized>(
    ledger: &L,
    references: &[String],
) -> Result<Option<String>, LedgerError> {
    if references.is_empty() {
        return Ok(None);
    }

    let records = ledger.resolve_threads(references)?;
    let parent = references.iter().find_map(|id| {
        records
            .iter()
            .find(|r| &r.message_id == id)
            .and_then(|r| r.thread_handle.clone())
    });
    Ok(parent)
}
