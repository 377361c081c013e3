//! Raw mail messages and the body extracted from them.

use crate::parser::header::{decode_encoded_words, get_header};

use super::address::EmailAddress;

/// A fetched message, held only for the duration of its processing.
#[derive(Debug, Clone, Default)]
pub struct RawMessage {
    /// Unfolded headers as `(lowercase_name, raw_value)` pairs, in order.
    pub headers: Vec<(String, String)>,
    /// MIME parts, depth-first in document order. Containers are included.
    pub parts: Vec<MimePart>,
}

/// A single MIME part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimePart {
    /// Lower-case `type/subtype`, e.g. `text/html` or `multipart/alternative`.
    pub content_type: String,
    /// Declared `charset` parameter, if any.
    pub charset: Option<String>,
    /// `true` when `Content-Disposition` marks the part as an attachment.
    pub is_attachment: bool,
    /// Transfer-decoded payload, still in the declared charset.
    pub payload: Vec<u8>,
}

/// Whether a body is plain text or HTML.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    PlainText,
    RichText,
}

/// The best-candidate body of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedBody {
    pub text: String,
    pub kind: ContentKind,
}

impl MimePart {
    /// Build a part from its parts; handy for hand-made messages.
    pub fn new(content_type: &str, charset: Option<&str>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: content_type.to_ascii_lowercase(),
            charset: charset.map(str::to_string),
            is_attachment: false,
            payload: payload.into(),
        }
    }

    pub fn is_plain_text(&self) -> bool {
        self.content_type == "text/plain"
    }

    pub fn is_rich_text(&self) -> bool {
        self.content_type == "text/html"
    }
}

impl ContentKind {
    /// The MIME type this kind corresponds to.
    pub fn mime_type(self) -> &'static str {
        match self {
            ContentKind::PlainText => "text/plain",
            ContentKind::RichText => "text/html",
        }
    }
}

impl RawMessage {
    /// First raw value of a header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        get_header(&self.headers, &name.to_ascii_lowercase())
    }

    /// Decoded `Subject`, empty when absent.
    pub fn subject(&self) -> String {
        self.header("subject")
            .map(decode_encoded_words)
            .unwrap_or_default()
    }

    /// Raw `From` header, still encoded. Decode via [`EmailAddress::parse_header`].
    pub fn from_header(&self) -> String {
        self.header("from").map(str::to_string).unwrap_or_default()
    }

    /// Decoded `To` header, as written.
    pub fn to_header(&self) -> String {
        self.header("to").map(decode_encoded_words).unwrap_or_default()
    }

    /// First address of the `From` list.
    pub fn sender(&self) -> Option<EmailAddress> {
        EmailAddress::parse_header(&self.from_header()).into_iter().next()
    }

    /// `Message-ID`, trimmed of surrounding whitespace.
    pub fn message_id(&self) -> Option<String> {
        self.header("message-id")
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }

    /// Identifiers from `References`, oldest first.
    pub fn references(&self) -> Vec<String> {
        self.header("references")
            .map(|refs| refs.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }
}
