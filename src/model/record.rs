//! Delivery ledger record.

/// A message that has been delivered to chat.
///
/// A record exists if and only if the message was posted successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailRecord {
    /// The message's `Message-ID`, trimmed.
    pub message_id: String,
    /// Decoded subject at first delivery.
    pub subject: String,
    /// Chat identifier of the thread anchor for this message.
    pub thread_handle: Option<String>,
}
