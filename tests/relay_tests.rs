//! Integration tests for the poll-and-deliver orchestrator, with in-process
//! fakes standing in for the mailbox and Slack.

use std::path::{Path, PathBuf};

use mailrelay::chat::{ChatClient, ChatError, PostResponse};
use mailrelay::config::{RunOptions, ThreadMode};
use mailrelay::error::RelayError;
use mailrelay::ledger::{DeliveryLedger, SqliteLedger};
use mailrelay::ledger::LedgerError;
use mailrelay::mailbox::{FetchCriteria, Mailbox, MailboxError};
use mailrelay::model::record::MailRecord;
use mailrelay::pipeline::heuristics::PatternHeuristics;
use mailrelay::pipeline::Normalizer;
use mailrelay::relay::{save_fixtures, MessageOutcome, Relay, RunReport};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn raw(name: &str) -> Vec<u8> {
    std::fs::read(fixture(name)).unwrap()
}

// ─── Fakes ──────────────────────────────────────────────────────────

enum FakeMailbox {
    Messages(Vec<Vec<u8>>),
    Reset,
    Refused,
}

impl Mailbox for FakeMailbox {
    fn fetch(
        &mut self,
        _folder: &str,
        _criteria: &FetchCriteria,
    ) -> Result<Vec<Vec<u8>>, MailboxError> {
        match self {
            FakeMailbox::Messages(messages) => Ok(messages.clone()),
            FakeMailbox::Reset => Err(MailboxError::ConnectionLost),
            FakeMailbox::Refused => Err(MailboxError::Imap("NO login failed".into())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Post {
    channel: String,
    text: String,
    thread_handle: Option<String>,
}

#[derive(Default)]
struct RecordingChat {
    posts: Vec<Post>,
    reject: bool,
    reject_threaded: bool,
}

impl ChatClient for RecordingChat {
    fn post(
        &mut self,
        channel: &str,
        text: &str,
        thread_handle: Option<&str>,
    ) -> Result<PostResponse, ChatError> {
        self.posts.push(Post {
            channel: channel.to_string(),
            text: text.to_string(),
            thread_handle: thread_handle.map(str::to_string),
        });
        if self.reject || (self.reject_threaded && thread_handle.is_some()) {
            return Ok(PostResponse {
                ok: false,
                message_ts: None,
                error: Some("channel_not_found".into()),
            });
        }
        Ok(PostResponse {
            ok: true,
            message_ts: Some(format!("1538671906.{:06}", self.posts.len() * 100)),
            error: None,
        })
    }
}

#[derive(Clone, Copy)]
enum Breaks {
    Lookup,
    Write,
}

/// SQLite ledger that fails every operation of one kind for one message id.
struct FlakyLedger {
    inner: SqliteLedger,
    broken_id: &'static str,
    breaks: Breaks,
}

impl FlakyLedger {
    fn new(broken_id: &'static str, breaks: Breaks) -> Self {
        Self {
            inner: SqliteLedger::open_in_memory().unwrap(),
            broken_id,
            breaks,
        }
    }

    fn disk_full() -> LedgerError {
        LedgerError::Io(std::io::Error::other("disk full"))
    }
}

impl DeliveryLedger for FlakyLedger {
    fn exists(&self, message_id: &str) -> Result<bool, LedgerError> {
        if matches!(self.breaks, Breaks::Lookup) && message_id == self.broken_id {
            return Err(Self::disk_full());
        }
        self.inner.exists(message_id)
    }

    fn record_delivery(
        &mut self,
        message_id: &str,
        subject: &str,
        thread_handle: Option<&str>,
    ) -> Result<(), LedgerError> {
        if matches!(self.breaks, Breaks::Write) && message_id == self.broken_id {
            return Err(Self::disk_full());
        }
        self.inner.record_delivery(message_id, subject, thread_handle)
    }

    fn resolve_threads(&self, message_ids: &[String]) -> Result<Vec<MailRecord>, LedgerError> {
        self.inner.resolve_threads(message_ids)
    }
}

type TestRelay = Relay<FakeMailbox, RecordingChat, SqliteLedger, PatternHeuristics>;

fn relay_with<L: DeliveryLedger>(
    mailbox: FakeMailbox,
    ledger: L,
    mode: ThreadMode,
) -> Relay<FakeMailbox, RecordingChat, L, PatternHeuristics> {
    let normalizer = Normalizer::new(PatternHeuristics::init().unwrap(), 400);
    Relay::new(mailbox, RecordingChat::default(), ledger, normalizer, mode)
}

fn relay(messages: &[&str]) -> TestRelay {
    let mailbox = FakeMailbox::Messages(messages.iter().map(|m| raw(m)).collect());
    relay_with(
        mailbox,
        SqliteLedger::open_in_memory().unwrap(),
        ThreadMode::Dual,
    )
}

fn options() -> RunOptions {
    RunOptions::new("INBOX", "#general")
}

// ─── Delivery and dedup ─────────────────────────────────────────────

#[test]
fn test_delivers_and_records() {
    let mut relay = relay(&["plain.eml"]);
    let report = relay.run(&options(), &FetchCriteria::Unseen).unwrap();

    assert_eq!(
        report,
        RunReport {
            fetched: 1,
            delivered: 1,
            skipped: 0,
            failed: 0
        }
    );
    let posts = &relay.chat().posts;
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].channel, "#general");
    assert!(posts[0].text.starts_with("_Seb Bacon_ to "));
    assert_eq!(posts[0].thread_handle, None);
    assert!(relay.ledger().exists("<plain-1@example.org>").unwrap());
}

#[test]
fn test_second_run_skips_everything() {
    let mut relay = relay(&["plain.eml", "crlf.eml"]);
    relay.run(&options(), &FetchCriteria::Unseen).unwrap();
    let second = relay.run(&options(), &FetchCriteria::Unseen).unwrap();

    assert_eq!(second.skipped, 2);
    assert_eq!(second.delivered, 0);
    assert_eq!(relay.chat().posts.len(), 2);
}

#[test]
fn test_no_repost_when_already_in_ledger() {
    let mut ledger = SqliteLedger::open_in_memory().unwrap();
    ledger
        .record_delivery("<plain-1@example.org>", "adieu", Some("1.0"))
        .unwrap();
    let mailbox = FakeMailbox::Messages(vec![raw("plain.eml")]);
    let mut relay = relay_with(mailbox, ledger, ThreadMode::Dual);

    let outcome = relay.process_message(&raw("plain.eml"), &options());
    assert!(matches!(outcome, MessageOutcome::Skipped));
    assert!(relay.chat().posts.is_empty());
}

#[test]
fn test_debug_text_resends() {
    let mut relay = relay(&["plain.eml"]);
    let opts = options().with_debug_text("farewell");
    relay.run(&opts, &FetchCriteria::Text("farewell".into())).unwrap();
    relay.run(&opts, &FetchCriteria::Text("farewell".into())).unwrap();
    assert_eq!(relay.chat().posts.len(), 2);
}

// ─── Threading ──────────────────────────────────────────────────────

#[test]
fn test_reply_posted_twice_in_dual_mode() {
    let mut ledger = SqliteLedger::open_in_memory().unwrap();
    ledger
        .record_delivery("<plain-1@example.org>", "adieu", Some("1538671906.000100"))
        .unwrap();
    let mailbox = FakeMailbox::Messages(vec![raw("reply.eml")]);
    let mut relay = relay_with(mailbox, ledger, ThreadMode::Dual);

    relay.run(&options(), &FetchCriteria::Unseen).unwrap();

    let posts = &relay.chat().posts;
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].thread_handle, None);
    assert_eq!(posts[1].thread_handle.as_deref(), Some("1538671906.000100"));
    assert_eq!(posts[0].text, posts[1].text);
}

#[test]
fn test_original_then_reply_threads_under_original() {
    let mut relay = relay(&["plain.eml", "reply.eml"]);
    relay.run(&options(), &FetchCriteria::Unseen).unwrap();

    let posts = &relay.chat().posts;
    assert_eq!(posts.len(), 3);
    assert_eq!(posts[2].thread_handle.as_deref(), Some("1538671906.000100"));
}

#[test]
fn test_thread_only_mode_posts_once() {
    let mut ledger = SqliteLedger::open_in_memory().unwrap();
    ledger
        .record_delivery("<plain-1@example.org>", "adieu", Some("1538671906.000100"))
        .unwrap();
    let mailbox = FakeMailbox::Messages(vec![raw("reply.eml")]);
    let mut relay = relay_with(mailbox, ledger, ThreadMode::ThreadOnly);

    let outcome = relay.process_message(&raw("reply.eml"), &options());

    match outcome {
        MessageOutcome::Delivered { thread_handle } => {
            assert_eq!(thread_handle.as_deref(), Some("1538671906.000100"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    let posts = &relay.chat().posts;
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].thread_handle.as_deref(), Some("1538671906.000100"));
}

// ─── Failures ───────────────────────────────────────────────────────

#[test]
fn test_rejected_post_is_not_recorded() {
    let mailbox = FakeMailbox::Messages(vec![raw("plain.eml")]);
    let mut relay = relay_with(
        mailbox,
        SqliteLedger::open_in_memory().unwrap(),
        ThreadMode::Dual,
    );
    let normalizer = Normalizer::new(PatternHeuristics::init().unwrap(), 400);
    let chat = RecordingChat {
        reject: true,
        ..RecordingChat::default()
    };
    let mut rejecting = Relay::new(
        FakeMailbox::Messages(vec![raw("plain.eml")]),
        chat,
        SqliteLedger::open_in_memory().unwrap(),
        normalizer,
        ThreadMode::Dual,
    );

    let report = rejecting.run(&options(), &FetchCriteria::Unseen).unwrap();
    assert_eq!(report.failed, 1);
    assert!(!rejecting.ledger().exists("<plain-1@example.org>").unwrap());

    // The same message goes through once the channel accepts it.
    assert_eq!(relay.run(&options(), &FetchCriteria::Unseen).unwrap().delivered, 1);
}

#[test]
fn test_threaded_post_rejected_leaves_no_record() {
    let mut ledger = SqliteLedger::open_in_memory().unwrap();
    ledger
        .record_delivery("<plain-1@example.org>", "adieu", Some("1538671906.000100"))
        .unwrap();
    let normalizer = Normalizer::new(PatternHeuristics::init().unwrap(), 400);
    let chat = RecordingChat {
        reject_threaded: true,
        ..RecordingChat::default()
    };
    let mut relay = Relay::new(
        FakeMailbox::Messages(vec![raw("reply.eml")]),
        chat,
        ledger,
        normalizer,
        ThreadMode::Dual,
    );

    let report = relay.run(&options(), &FetchCriteria::Unseen).unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.delivered, 0);
    let posts = &relay.chat().posts;
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].thread_handle, None);
    assert_eq!(posts[1].thread_handle.as_deref(), Some("1538671906.000100"));
    assert!(!relay.ledger().exists("<reply-1@example.org>").unwrap());
}

#[test]
fn test_ledger_lookup_error_fails_only_that_message() {
    let ledger = FlakyLedger::new("<plain-1@example.org>", Breaks::Lookup);
    let mailbox = FakeMailbox::Messages(vec![raw("plain.eml"), raw("crlf.eml")]);
    let mut relay = relay_with(mailbox, ledger, ThreadMode::Dual);

    let report = relay.run(&options(), &FetchCriteria::Unseen).unwrap();

    assert_eq!(
        report,
        RunReport {
            fetched: 2,
            delivered: 1,
            skipped: 0,
            failed: 1
        }
    );
    assert_eq!(relay.chat().posts.len(), 1);
    assert!(relay.ledger().inner.exists("<crlf-1@example.org>").unwrap());
}

#[test]
fn test_ledger_write_error_fails_only_that_message() {
    let ledger = FlakyLedger::new("<plain-1@example.org>", Breaks::Write);
    let mailbox = FakeMailbox::Messages(vec![raw("plain.eml"), raw("crlf.eml")]);
    let mut relay = relay_with(mailbox, ledger, ThreadMode::Dual);

    let report = relay.run(&options(), &FetchCriteria::Unseen).unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.delivered, 1);
    assert_eq!(relay.chat().posts.len(), 2);
    assert!(!relay.ledger().inner.exists("<plain-1@example.org>").unwrap());
    assert!(relay.ledger().inner.exists("<crlf-1@example.org>").unwrap());

    let outcome = relay.process_message(&raw("plain.eml"), &options());
    assert!(matches!(
        outcome,
        MessageOutcome::Failed(RelayError::Ledger(LedgerError::Io(_)))
    ));
}

#[test]
fn test_connection_reset_ends_run_quietly() {
    let mut relay = relay_with(
        FakeMailbox::Reset,
        SqliteLedger::open_in_memory().unwrap(),
        ThreadMode::Dual,
    );
    let report = relay.run(&options(), &FetchCriteria::Unseen).unwrap();
    assert_eq!(report, RunReport::default());
}

#[test]
fn test_other_fetch_errors_propagate() {
    let mut relay = relay_with(
        FakeMailbox::Refused,
        SqliteLedger::open_in_memory().unwrap(),
        ThreadMode::Dual,
    );
    let err = relay.run(&options(), &FetchCriteria::Unseen).unwrap_err();
    assert!(matches!(err, RelayError::Mailbox(MailboxError::Imap(_))));
}

#[test]
fn test_bad_message_does_not_stop_the_run() {
    let mut relay = relay(&["no_message_id.eml", "plain.eml"]);
    let report = relay.run(&options(), &FetchCriteria::Unseen).unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.delivered, 1);

    let outcome = relay.process_message(&raw("no_message_id.eml"), &options());
    assert!(matches!(
        outcome,
        MessageOutcome::Failed(RelayError::MissingMessageId)
    ));
}

// ─── Fixture dump ───────────────────────────────────────────────────

#[test]
fn test_save_fixtures_numbers_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut mailbox = FakeMailbox::Messages(vec![raw("plain.eml"), raw("reply.eml")]);

    let written = save_fixtures(&mut mailbox, "INBOX", &FetchCriteria::Unseen, dir.path()).unwrap();

    assert_eq!(written, vec![dir.path().join("0.msg"), dir.path().join("1.msg")]);
    assert_eq!(std::fs::read(&written[1]).unwrap(), raw("reply.eml"));
}
