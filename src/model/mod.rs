//! Core data model types: addresses, raw messages, and ledger records.

pub mod address;
pub mod message;
pub mod record;
