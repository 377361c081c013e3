//! Mailbox collaborator: fetch raw messages from a folder.

mod imap_client;

pub use imap_client::ImapMailbox;

use chrono::{DateTime, Duration, NaiveDate, TimeZone};
use thiserror::Error;

use crate::config::RunOptions;

/// Folder that never carries the unseen flag; watched by date instead.
pub const SENT_ITEMS_FOLDER: &str = "Sent Items";

/// Mailbox transport failures.
#[derive(Debug, Error)]
pub enum MailboxError {
    /// The server dropped or reset the connection. Treated as "no mail this run".
    #[error("mailbox connection lost")]
    ConnectionLost,
    #[error("TLS setup failed: {0}")]
    Tls(#[from] native_tls::Error),
    #[error("IMAP error: {0}")]
    Imap(String),
}

/// Which messages of a folder to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchCriteria {
    /// Messages dated on or after this day.
    Since(NaiveDate),
    /// Messages containing this text anywhere.
    Text(String),
    /// Messages without the `\Seen` flag.
    Unseen,
}

/// The two mailbox-watch variants exposed on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchMode {
    /// Everything within the recent time window.
    Folder,
    /// Unread mail (date-based for the sent folder).
    Inbox,
}

impl FetchCriteria {
    /// Messages from the day `window_hours` before `now`.
    pub fn since_window<Tz: TimeZone>(now: &DateTime<Tz>, window_hours: i64) -> Self {
        let start = now.clone() - Duration::hours(window_hours);
        FetchCriteria::Since(start.date_naive())
    }

    /// The IMAP `SEARCH` key for this criterion.
    pub fn to_imap_query(&self) -> String {
        match self {
            FetchCriteria::Since(date) => format!("SINCE {}", date.format("%d-%b-%Y")),
            FetchCriteria::Text(text) => format!("TEXT {}", quote(text)),
            FetchCriteria::Unseen => "UNSEEN".to_string(),
        }
    }
}

/// Pick the criterion for a run. A search text always wins.
pub fn criteria_for<Tz: TimeZone>(
    mode: WatchMode,
    options: &RunOptions,
    now: &DateTime<Tz>,
    window_hours: i64,
) -> FetchCriteria {
    if let Some(text) = &options.search_text {
        return FetchCriteria::Text(text.clone());
    }
    match mode {
        WatchMode::Folder => FetchCriteria::since_window(now, window_hours),
        WatchMode::Inbox if options.folder == SENT_ITEMS_FOLDER => {
            FetchCriteria::Since(now.date_naive())
        }
        WatchMode::Inbox => FetchCriteria::Unseen,
    }
}

fn quote(text: &str) -> String {
    let escaped = text.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Source of raw RFC 5322 messages.
pub trait Mailbox {
    /// Fetch every message of `folder` matching `criteria`, in mailbox order.
    fn fetch(
        &mut self,
        folder: &str,
        criteria: &FetchCriteria,
    ) -> Result<Vec<Vec<u8>>, MailboxError>;
}
