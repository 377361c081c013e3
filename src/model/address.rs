//! Mailbox address parsing (RFC 5322 §3.4).

use crate::parser::header::decode_encoded_words;

/// A parsed mailbox address.
///
/// # Examples
/// - `"Seb Bacon" <seb@example.org>` → `display_name = "Seb Bacon"`, `address = "seb@example.org"`
/// - `seb@example.org (Seb Bacon)` → same, via the legacy comment form
/// - `seb@example.org` → `display_name = ""`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAddress {
    /// Human-readable display name (may be empty).
    pub display_name: String,
    /// The bare address (`user@domain`).
    pub address: String,
}

impl EmailAddress {
    /// Parse a single address from a header value.
    ///
    /// If parsing fails, the raw string is stored as `address`.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();

        // "Display Name <address>" or "<address>"
        if let (Some(open), Some(close)) = (trimmed.rfind('<'), trimmed.rfind('>')) {
            if close > open {
                return Self {
                    display_name: unquote(&trimmed[..open]),
                    address: trimmed[open + 1..close].trim().to_string(),
                };
            }
        }

        // "address (Display Name)"
        if let (Some(open), true) = (trimmed.find('('), trimmed.ends_with(')')) {
            let address = trimmed[..open].trim();
            if address.contains('@') {
                return Self {
                    display_name: trimmed[open + 1..trimmed.len() - 1].trim().to_string(),
                    address: address.to_string(),
                };
            }
        }

        Self {
            display_name: String::new(),
            address: trimmed.to_string(),
        }
    }

    /// Parse a comma-separated address list, respecting quotes and angle brackets.
    ///
    /// `"Last, First" <a@b.com>, other@c.com` yields two addresses.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        let mut results = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut in_angle = false;
        let mut escaped = false;

        for ch in raw.chars() {
            if escaped {
                current.push(ch);
                escaped = false;
                continue;
            }
            match ch {
                '\\' if in_quotes => {
                    escaped = true;
                    current.push(ch);
                }
                '"' => {
                    in_quotes = !in_quotes;
                    current.push(ch);
                }
                '<' if !in_quotes => {
                    in_angle = true;
                    current.push(ch);
                }
                '>' if !in_quotes => {
                    in_angle = false;
                    current.push(ch);
                }
                ',' if !in_quotes && !in_angle => {
                    push_parsed(&mut results, &current);
                    current.clear();
                }
                _ => current.push(ch),
            }
        }
        push_parsed(&mut results, &current);

        results
    }

    /// Parse a raw (still encoded) address header.
    ///
    /// The list is split first and RFC 2047 words in each display name are
    /// decoded afterwards, so an encoded comma stays inside its name.
    pub fn parse_header(raw: &str) -> Vec<Self> {
        Self::parse_list(raw)
            .into_iter()
            .map(|mut addr| {
                addr.display_name = decode_encoded_words(&addr.display_name);
                addr
            })
            .collect()
    }

    /// The display name, or the bare address when there is none.
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.address
        } else {
            &self.display_name
        }
    }
}

fn push_parsed(results: &mut Vec<EmailAddress>, segment: &str) {
    let addr = EmailAddress::parse(segment);
    if !addr.address.is_empty() || !addr.display_name.is_empty() {
        results.push(addr);
    }
}

/// Strip surrounding double-quotes and backslash escapes.
fn unquote(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        let inner = &trimmed[1..trimmed.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(ch) = chars.next() {
            if ch == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else {
                out.push(ch);
            }
        }
        out.trim().to_string()
    } else {
        trimmed.to_string()
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.display_name.is_empty() {
            write!(f, "{}", self.address)
        } else {
            write!(f, "{} <{}>", self.display_name, self.address)
        }
    }
}
