//! Email parsing: header decoding and MIME handling.

pub mod header;
pub mod mime;
