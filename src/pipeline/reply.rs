//! Reduce a message body to what the sender actually wrote.

use tracing::debug;

use crate::model::message::ExtractedBody;

use super::heuristics::ReplyHeuristics;

/// Strips quoted history and signatures using an injected heuristics handle.
///
/// The handle is built once at startup and shared by every message of a run.
pub struct ReplyIsolator<H: ReplyHeuristics> {
    heuristics: H,
}

impl<H: ReplyHeuristics> ReplyIsolator<H> {
    pub fn new(heuristics: H) -> Self {
        Self { heuristics }
    }

    /// Return the new content of `body`, in the same kind (plain or HTML).
    ///
    /// `sender` is the raw `From` header. The stripped signature is discarded.
    pub fn isolate(&self, body: &ExtractedBody, sender: &str) -> String {
        debug!(kind = body.kind.mime_type(), "Isolating reply");
        let reply = self.heuristics.strip_quotations(&body.text, body.kind);
        let (reply, signature) = self.heuristics.strip_signature(&reply, body.kind, sender);
        if let Some(signature) = signature {
            debug!(lines = signature.lines().count(), "Dropped signature");
        }
        reply
    }
}
