//! Message normalization: raw message → chat notification text.
//!
//! Stages run in order: [`body`] picks the body, [`reply`] drops quoted
//! history and signatures, [`markup`] converts HTML to Slack markup, and
//! [`format`] assembles and caps the final text. [`thread`] is consulted
//! separately by the relay when sending.

pub mod body;
pub mod format;
pub mod heuristics;
pub mod markup;
pub mod reply;
pub mod thread;

use tracing::debug;

use crate::error::Result;
use crate::model::message::{ContentKind, RawMessage};

use self::heuristics::ReplyHeuristics;
use self::reply::ReplyIsolator;

/// Turns parsed messages into notification text.
pub struct Normalizer<H: ReplyHeuristics> {
    isolator: ReplyIsolator<H>,
    max_words: usize,
}

impl<H: ReplyHeuristics> Normalizer<H> {
    pub fn new(heuristics: H, max_words: usize) -> Self {
        Self {
            isolator: ReplyIsolator::new(heuristics),
            max_words,
        }
    }

    /// Run every normalization stage on `message`.
    ///
    /// A message without any text part yields a notification with an empty body.
    pub fn normalize(&self, message: &RawMessage) -> Result<String> {
        let from = message.from_header();

        let body = match body::extract_body(&message.parts)? {
            Some(extracted) => {
                let reply = self.isolator.isolate(&extracted, &from);
                match extracted.kind {
                    ContentKind::RichText => markup::html_to_mrkdwn(&reply),
                    ContentKind::PlainText => markup::escape(&reply),
                }
            }
            None => {
                debug!("No text part found, sending headers only");
                String::new()
            }
        };

        Ok(format::format_notification(
            &from,
            &message.to_header(),
            &message.subject(),
            &body,
            self.max_words,
        ))
    }
}
