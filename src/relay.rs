//! Poll-and-deliver orchestration.
//!
//! One run fetches a batch from the mailbox and takes every message through
//! dedup check, normalization, thread lookup, send and record, strictly one
//! message at a time. A message only reaches the ledger after every post for it
//! was accepted, so anything that fails is retried by the next run.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::chat::{ChatClient, PostResponse};
use crate::config::{RunOptions, ThreadMode};
use crate::error::{RelayError, Result};
use crate::ledger::DeliveryLedger;
use crate::mailbox::{FetchCriteria, Mailbox, MailboxError};
use crate::parser::mime::parse_message;
use crate::pipeline::heuristics::ReplyHeuristics;
use crate::pipeline::thread::resolve_thread;
use crate::pipeline::Normalizer;

/// Terminal state of one message within a run.
#[derive(Debug)]
pub enum MessageOutcome {
    /// Already in the ledger; nothing was sent.
    Skipped,
    /// Posted and recorded.
    Delivered { thread_handle: Option<String> },
    /// Not delivered; will be retried by the next run.
    Failed(RelayError),
}

/// Tally of a run's outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub fetched: usize,
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunReport {
    fn tally(&mut self, outcome: &MessageOutcome) {
        match outcome {
            MessageOutcome::Skipped => self.skipped += 1,
            MessageOutcome::Delivered { .. } => self.delivered += 1,
            MessageOutcome::Failed(_) => self.failed += 1,
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} fetched, {} delivered, {} skipped, {} failed",
            self.fetched, self.delivered, self.skipped, self.failed
        )
    }
}

/// Ties mailbox, normalization, chat and ledger together.
pub struct Relay<M, C, L, H>
where
    M: Mailbox,
    C: ChatClient,
    L: DeliveryLedger,
    H: ReplyHeuristics,
{
    mailbox: M,
    chat: C,
    ledger: L,
    normalizer: Normalizer<H>,
    thread_mode: ThreadMode,
}

impl<M, C, L, H> Relay<M, C, L, H>
where
    M: Mailbox,
    C: ChatClient,
    L: DeliveryLedger,
    H: ReplyHeuristics,
{
    pub fn new(
        mailbox: M,
        chat: C,
        ledger: L,
        normalizer: Normalizer<H>,
        thread_mode: ThreadMode,
    ) -> Self {
        Self {
            mailbox,
            chat,
            ledger,
            normalizer,
            thread_mode,
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn chat(&self) -> &C {
        &self.chat
    }

    /// Fetch and process one batch.
    ///
    /// A lost mailbox connection ends the run early with an empty report.
    /// Other fetch failures are returned. Per-message failures never are.
    pub fn run(&mut self, options: &RunOptions, criteria: &FetchCriteria) -> Result<RunReport> {
        let raw_messages = match self.mailbox.fetch(&options.folder, criteria) {
            Ok(messages) => messages,
            Err(MailboxError::ConnectionLost) => {
                warn!(folder = %options.folder, "Mailbox connection lost, ending run");
                return Ok(RunReport::default());
            }
            Err(err) => return Err(err.into()),
        };

        let mut report = RunReport {
            fetched: raw_messages.len(),
            ..RunReport::default()
        };
        for raw in &raw_messages {
            let outcome = self.process_message(raw, options);
            report.tally(&outcome);
        }

        info!(folder = %options.folder, channel = %options.channel, "Run complete: {report}");
        Ok(report)
    }

    /// Take one raw message to a terminal state.
    pub fn process_message(&mut self, raw: &[u8], options: &RunOptions) -> MessageOutcome {
        match self.deliver(raw, options) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "FAILED");
                MessageOutcome::Failed(err)
            }
        }
    }

    fn deliver(&mut self, raw: &[u8], options: &RunOptions) -> Result<MessageOutcome> {
        let message = parse_message(raw)?;
        let message_id = message.message_id().ok_or(RelayError::MissingMessageId)?;
        if let Some(sender) = message.sender() {
            debug!(message_id = %message_id, from = %sender, "Processing message");
        }

        if !options.skip_dedup && self.ledger.exists(&message_id)? {
            info!(message_id = %message_id, "SKIPPED (already delivered)");
            return Ok(MessageOutcome::Skipped);
        }

        let text = self.normalizer.normalize(&message)?;
        let parent = resolve_thread(&self.ledger, &message.references())?;
        debug!(message_id = %message_id, parent = ?parent, "Resolved thread");

        let thread_handle = self.send(&options.channel, &text, parent.as_deref())?;

        let subject = message.subject();
        self.ledger
            .record_delivery(&message_id, &subject, thread_handle.as_deref())?;
        info!(
            message_id = %message_id,
            thread_handle = ?thread_handle,
            "DELIVERED"
        );
        Ok(MessageOutcome::Delivered { thread_handle })
    }

    /// Post per the thread mode. Returns the handle to record.
    fn send(&mut self, channel: &str, text: &str, parent: Option<&str>) -> Result<Option<String>> {
        match self.thread_mode {
            ThreadMode::Dual => {
                let top = accepted(self.chat.post(channel, text, None)?)?;
                if let Some(parent) = parent {
                    accepted(self.chat.post(channel, text, Some(parent))?)?;
                }
                Ok(top.message_ts)
            }
            ThreadMode::ThreadOnly => {
                let posted = accepted(self.chat.post(channel, text, parent)?)?;
                Ok(parent.map(str::to_string).or(posted.message_ts))
            }
        }
    }
}

fn accepted(response: PostResponse) -> Result<PostResponse> {
    if response.ok {
        Ok(response)
    } else {
        Err(RelayError::Rejected(
            response.error.unwrap_or_else(|| "unknown error".to_string()),
        ))
    }
}

/// Write every matching message to `dir/<n>.msg`, numbered from zero.
pub fn save_fixtures<M: Mailbox>(
    mailbox: &mut M,
    folder: &str,
    criteria: &FetchCriteria,
    dir: &Path,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).map_err(|e| RelayError::io(dir, e))?;

    let messages = mailbox.fetch(folder, criteria)?;
    let mut written = Vec::with_capacity(messages.len());
    for (i, raw) in messages.iter().enumerate() {
        let path = dir.join(format!("{i}.msg"));
        std::fs::write(&path, raw).map_err(|e| RelayError::io(&path, e))?;
        written.push(path);
    }
    info!(folder, count = written.len(), dir = %dir.display(), "Saved fixtures");
    Ok(written)
}
