//! Best-candidate body selection.

use kuchiki::traits::*;

use crate::error::{RelayError, Result};
use crate::model::message::{ContentKind, ExtractedBody, MimePart};
use crate::parser::header::decode_charset;

/// Charset used when a text part declares none (or one we do not know).
const DEFAULT_CHARSET: &encoding_rs::Encoding = encoding_rs::WINDOWS_1252;

/// Pick the body of a message from its parts, walked in document order.
///
/// The first non-empty HTML part wins outright, even over an earlier plain-text
/// part. Without one, the first plain-text part is used. Attachments are never
/// considered. Returns `Ok(None)` when no text part exists at all.
///
/// # Errors
///
/// [`RelayError::EmptyMessage`] when `parts` is empty; every real message has at
/// least one part, so this indicates a broken parse.
pub fn extract_body(parts: &[MimePart]) -> Result<Option<ExtractedBody>> {
    if parts.is_empty() {
        return Err(RelayError::EmptyMessage);
    }

    let mut plain: Option<&MimePart> = None;

    for part in parts.iter().filter(|p| !p.is_attachment) {
        if part.is_rich_text() {
            let html = decode_part(part);
            if !html.trim().is_empty() {
                return Ok(Some(ExtractedBody {
                    text: normalize_html(&html),
                    kind: ContentKind::RichText,
                }));
            }
        } else if part.is_plain_text() && plain.is_none() {
            plain = Some(part);
        }
    }

    Ok(plain.map(|part| ExtractedBody {
        text: decode_part(part),
        kind: ContentKind::PlainText,
    }))
}

fn decode_part(part: &MimePart) -> String {
    decode_charset(part.charset.as_deref(), &part.payload, DEFAULT_CHARSET)
}

/// Re-serialize HTML through an HTML5 parser so tags are balanced and nested.
fn normalize_html(html: &str) -> String {
    kuchiki::parse_html().one(html).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_parts_fails_loudly() {
        assert!(matches!(extract_body(&[]), Err(RelayError::EmptyMessage)));
    }

    #[test]
    fn test_plain_only() {
        let parts = [MimePart::new("text/plain", Some("utf-8"), "farewell")];
        let body = extract_body(&parts).unwrap().unwrap();
        assert_eq!(body.kind, ContentKind::PlainText);
        assert_eq!(body.text, "farewell");
    }

    #[test]
    fn test_html_beats_earlier_plain() {
        let parts = [
            MimePart::new("multipart/alternative", None, ""),
            MimePart::new("text/plain", Some("utf-8"), "plain"),
            MimePart::new("text/html", Some("utf-8"), "<p>rich <b>text"),
        ];
        let body = extract_body(&parts).unwrap().unwrap();
        assert_eq!(body.kind, ContentKind::RichText);
        assert!(body.text.contains("<p>rich <b>text</b></p>"));
        assert!(body.text.starts_with("<html>"));
    }

    #[test]
    fn test_empty_html_falls_back_to_plain() {
        let parts = [
            MimePart::new("text/plain", None, "plain"),
            MimePart::new("text/html", None, "  "),
        ];
        let body = extract_body(&parts).unwrap().unwrap();
        assert_eq!(body.kind, ContentKind::PlainText);
    }

    #[test]
    fn test_first_plain_part_wins() {
        let parts = [
            MimePart::new("text/plain", None, "first"),
            MimePart::new("text/plain", None, "second"),
        ];
        assert_eq!(extract_body(&parts).unwrap().unwrap().text, "first");
    }

    #[test]
    fn test_attachments_are_skipped() {
        let mut attached = MimePart::new("text/html", None, "<p>invoice</p>");
        attached.is_attachment = true;
        let parts = [MimePart::new("text/plain", None, "see attached"), attached];
        let body = extract_body(&parts).unwrap().unwrap();
        assert_eq!(body.text, "see attached");
    }

    #[test]
    fn test_latin1_fallback_with_replacement() {
        let parts = [MimePart::new("text/html", None, &b"<p>caf\xe9</p>"[..])];
        let body = extract_body(&parts).unwrap().unwrap();
        assert!(body.text.contains("café"));
    }

    #[test]
    fn test_no_text_part() {
        let parts = [MimePart::new("image/png", None, &b"\x89PNG"[..])];
        assert!(extract_body(&parts).unwrap().is_none());
    }
}
