//! Notification text assembly and markup-aware truncation.

use crate::model::address::EmailAddress;
use crate::parser::header::decode_encoded_words;

/// Default cap on notification length, in whitespace-delimited words.
pub const DEFAULT_MAX_WORDS: usize = 400;

const EMPHASIS: [char; 3] = ['*', '_', '~'];

/// Assemble the notification and cap it at `max_words` words.
///
/// `from_header` is the raw `From` value. The sender is shown by display name
/// (first address of the list), falling back to the bare address. The
/// recipient is the decoded `To` header as written.
pub fn format_notification(
    from_header: &str,
    to_header: &str,
    subject: &str,
    body: &str,
    max_words: usize,
) -> String {
    let sender = sender_label(from_header);
    let message = format!("_{sender}_ to _{to_header}_\n*{subject}*\n\n{body}");
    truncate_words(&message, max_words)
}

fn sender_label(from_header: &str) -> String {
    EmailAddress::parse_header(from_header)
        .into_iter()
        .next()
        .map(|addr| addr.label().to_string())
        .unwrap_or_else(|| decode_encoded_words(from_header.trim()))
}

/// Keep the first `max_words` words of `text`.
///
/// A `<…>` link is never split: a cut inside one moves to just before it.
/// Only a `<` that opens a Slack link target (see [`is_link_target`]) counts,
/// so a stray `<` in unescaped text is an ordinary character.
/// Emphasis spans left open by the cut are closed. Whitespace inside the kept
/// part is untouched.
pub fn truncate_words(text: &str, max_words: usize) -> String {
    let Some(cut) = word_boundary(text, max_words) else {
        return text.to_string();
    };

    let mut kept = &text[..cut];
    if let Some(open) = unclosed_link_start(kept) {
        kept = kept[..open].trim_end();
    }

    let mut out = kept.to_string();
    out.extend(open_emphasis(kept).into_iter().rev());
    out
}

/// Byte offset just past word number `max_words`, or `None` if the text is
/// not longer than that.
fn word_boundary(text: &str, max_words: usize) -> Option<usize> {
    let mut words = 0;
    let mut in_word = false;
    let mut end = (max_words == 0).then_some(0);

    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if in_word && words == max_words {
                end = Some(i);
            }
            in_word = false;
        } else if !in_word {
            if words == max_words {
                return end;
            }
            in_word = true;
            words += 1;
        }
    }
    None
}

/// Whether `target` is something Slack renders inside `<…>`: a URL with a
/// scheme, or a `#channel`, `@user` or `!special` mention.
pub fn is_link_target(target: &str) -> bool {
    if target.starts_with(['#', '@', '!']) {
        return target.len() > 1;
    }
    let Some((scheme, _)) = target.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn opens_link(text: &str, at: usize) -> bool {
    let rest = &text[at + 1..];
    let target = rest.split(['|', '>']).next().unwrap_or_default();
    !target.contains(char::is_whitespace) && is_link_target(target)
}

fn unclosed_link_start(text: &str) -> Option<usize> {
    let mut start = None;
    for (i, c) in text.char_indices() {
        match c {
            '<' if opens_link(text, i) => start = Some(i),
            '>' => start = None,
            _ => {}
        }
    }
    start
}

/// Emphasis delimiters opened but not closed, outermost first.
fn open_emphasis(text: &str) -> Vec<char> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut stack: Vec<char> = Vec::new();
    let mut in_link = false;

    for (i, &(at, c)) in chars.iter().enumerate() {
        match c {
            '<' if opens_link(text, at) => in_link = true,
            '>' => in_link = false,
            c if EMPHASIS.contains(&c) && !in_link => {
                let prev = i.checked_sub(1).map(|j| chars[j].1);
                let next = chars.get(i + 1).map(|&(_, n)| n);
                let can_open = prev.map_or(true, |p| !p.is_alphanumeric())
                    && next.map_or(false, |n| !n.is_whitespace());
                let can_close = prev.map_or(false, |p| !p.is_whitespace())
                    && next.map_or(true, |n| !n.is_alphanumeric());

                let existing = stack.iter().rposition(|&d| d == c);
                match existing {
                    Some(pos) if can_close => {
                        stack.remove(pos);
                    }
                    _ if can_open => stack.push(c),
                    _ => {}
                }
            }
            _ => {}
        }
    }
    stack
}
