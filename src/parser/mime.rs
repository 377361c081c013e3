//! MIME message parsing: raw RFC 5322 bytes → [`RawMessage`].
//!
//! `mail-parser` provides the part structure. Text payloads are re-read from the
//! raw message and only transfer-decoded here, so the body extractor can apply
//! its own charset policy.

use base64::Engine;
use mail_parser::{Message, MessageParser, MimeHeaders, PartType};

use crate::error::{RelayError, Result};
use crate::model::message::{MimePart, RawMessage};
use crate::parser::header::{
    decode_header_bytes, decode_quoted_printable, split_header_block, unfold_headers,
    LENIENT_BASE64,
};

/// Maximum depth for attached `message/rfc822` descent.
const MAX_DEPTH: usize = 10;

/// Parse a complete raw message (headers + body).
pub fn parse_message(raw_message: &[u8]) -> Result<RawMessage> {
    let message_bytes = skip_from_line(raw_message);

    let (header_block, _) = split_header_block(message_bytes);
    let headers = unfold_headers(&decode_header_bytes(header_block));

    let parsed = MessageParser::default()
        .parse(message_bytes)
        .ok_or_else(|| RelayError::MalformedMessage("not an RFC 5322 message".into()))?;

    let mut parts = Vec::with_capacity(parsed.parts.len());
    collect_parts(&parsed, &mut parts, 0);

    Ok(RawMessage { headers, parts })
}

/// Flatten the part tree depth-first, in document order.
fn collect_parts(msg: &Message<'_>, out: &mut Vec<MimePart>, depth: usize) {
    let raw = msg.raw_message();

    for part in &msg.parts {
        let content_type = part
            .content_type()
            .map(|ct| match ct.subtype() {
                Some(sub) => format!("{}/{}", ct.ctype(), sub),
                None => ct.ctype().to_string(),
            })
            .unwrap_or_else(|| default_content_type(&part.body).to_string())
            .to_ascii_lowercase();

        let mut charset = part
            .content_type()
            .and_then(|ct| ct.attribute("charset"))
            .map(str::to_string);

        let is_attachment = part
            .content_disposition()
            .map(|d| d.ctype().eq_ignore_ascii_case("attachment"))
            .unwrap_or(false);

        let payload = match &part.body {
            PartType::Text(_) | PartType::Html(_) => {
                match raw.get(part.raw_body_offset()..part.raw_end_offset()) {
                    Some(body) => transfer_decode(body, part.content_transfer_encoding()),
                    None => {
                        // Offsets out of range: take mail-parser's own decoding
                        charset = Some("utf-8".to_string());
                        part.contents().to_vec()
                    }
                }
            }
            PartType::Binary(_) | PartType::InlineBinary(_) => part.contents().to_vec(),
            PartType::Message(_) | PartType::Multipart(_) => Vec::new(),
        };

        out.push(MimePart {
            content_type,
            charset,
            is_attachment,
            payload,
        });

        if let PartType::Message(inner) = &part.body {
            if depth < MAX_DEPTH {
                collect_parts(inner, out, depth + 1);
            }
        }
    }
}

fn default_content_type(body: &PartType<'_>) -> &'static str {
    match body {
        PartType::Text(_) => "text/plain",
        PartType::Html(_) => "text/html",
        PartType::Message(_) => "message/rfc822",
        PartType::Multipart(_) => "multipart/mixed",
        PartType::Binary(_) | PartType::InlineBinary(_) => "application/octet-stream",
    }
}

/// Undo the Content-Transfer-Encoding. Bad base64 is passed through untouched.
fn transfer_decode(body: &[u8], encoding: Option<&str>) -> Vec<u8> {
    match encoding.map(|e| e.trim().to_ascii_lowercase()).as_deref() {
        Some("base64") => {
            let compact: Vec<u8> = body
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            LENIENT_BASE64
                .decode(&compact)
                .unwrap_or_else(|_| body.to_vec())
        }
        Some("quoted-printable") => decode_quoted_printable(body),
        _ => body.to_vec(),
    }
}

/// Skip the `From ` separator line that mbox-style fixtures start with.
fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF_u8, 0xBB, 0xBF][..]).unwrap_or(data);

    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}
