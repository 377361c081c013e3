//! Chat collaborator: post a notification, optionally into a thread.

mod slack;

pub use slack::SlackClient;

use serde::Deserialize;
use thiserror::Error;

/// Transport-level chat failures. An `ok: false` answer is not one of these.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat API returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("chat request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unreadable chat API response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The chat API's answer to a post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PostResponse {
    pub ok: bool,
    /// Identifier of the posted message; usable as a thread handle.
    #[serde(rename = "ts")]
    pub message_ts: Option<String>,
    /// API error code when `ok` is false.
    pub error: Option<String>,
}

/// Anything that can deliver text to a chat channel.
pub trait ChatClient {
    /// Post `text` to `channel`, as a reply under `thread_handle` when given.
    fn post(
        &mut self,
        channel: &str,
        text: &str,
        thread_handle: Option<&str>,
    ) -> Result<PostResponse, ChatError>;
}
