//! Integration tests for parsing and normalizing real message files.

use std::path::{Path, PathBuf};

use mailrelay::model::message::{ContentKind, RawMessage};
use mailrelay::parser::mime::parse_message;
use mailrelay::pipeline::body::extract_body;
use mailrelay::pipeline::heuristics::PatternHeuristics;
use mailrelay::pipeline::Normalizer;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn load(name: &str) -> RawMessage {
    let raw = std::fs::read(fixture(name)).unwrap();
    parse_message(&raw).unwrap()
}

fn normalize(name: &str) -> String {
    let normalizer = Normalizer::new(PatternHeuristics::init().unwrap(), 400);
    normalizer.normalize(&load(name)).unwrap()
}

// ─── Formatting ─────────────────────────────────────────────────────

#[test]
fn test_plain_message_formatting() {
    assert_eq!(
        normalize("plain.eml"),
        "_Seb Bacon_ to _Seb Bacon - ebmdatalab <ebmdatalab@phc.ox.ac.uk>_\n*adieu*\n\nfarewell"
    );
}

#[test]
fn test_html_links_become_slack_links() {
    assert_eq!(
        normalize("html_link.eml"),
        "_DataLab Bot_ to _team@example.org_\n*Weekly report*\n\n\
         The *weekly* report is <https://example.org/report|here>, café &amp; all."
    );
}

#[test]
fn test_crlf_preserved_in_plain_body() {
    let text = normalize("crlf.eml");
    assert!(
        text.ends_with("\n\nWhat's happened:\r\n2 requests had new responses:"),
        "got: {text:?}"
    );
}

#[test]
fn test_reply_loses_quote_and_signature() {
    assert_eq!(
        normalize("reply.eml"),
        "_Alice Smith_ to _ebmdatalab@phc.ox.ac.uk_\n*Re: adieu*\n\nSorry to see you go!"
    );
}

#[test]
fn test_encoded_subject_and_sender() {
    assert_eq!(
        normalize("encoded_subject.eml"),
        "_José García_ to _sales@example.org_\n*RE:\u{a0}enquiry / electronic components*\n\nPlease send prices."
    );
}

// ─── Parsing ────────────────────────────────────────────────────────

#[test]
fn test_references_in_order() {
    let msg = load("reply.eml");
    assert_eq!(
        msg.references(),
        vec!["<root-0@example.org>", "<plain-1@example.org>"]
    );
    assert_eq!(msg.message_id().as_deref(), Some("<reply-1@example.org>"));
}

#[test]
fn test_html_part_preferred() {
    let msg = load("html_link.eml");
    let body = extract_body(&msg.parts).unwrap().unwrap();
    assert_eq!(body.kind, ContentKind::RichText);
    assert!(body.text.contains("café"));
}

#[test]
fn test_missing_message_id() {
    assert!(load("no_message_id.eml").message_id().is_none());
}
