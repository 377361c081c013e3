//! `mailrelay` — relay new mail from an IMAP folder to a Slack channel.
//!
//! This crate provides the message normalization pipeline (body extraction,
//! reply isolation, HTML to Slack markup, formatting), the delivery ledger used
//! for deduplication and threading, and the poll-and-deliver orchestrator.

pub mod chat;
pub mod config;
pub mod error;
pub mod ledger;
pub mod mailbox;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod relay;
