//! Quote and signature detection.
//!
//! [`ReplyHeuristics`] is the seam the reply isolator talks to. The shipped
//! implementation, [`PatternHeuristics`], classifies every line of a body and
//! then decides on the marker sequence, e.g. `tesmm` (text, empty, splitter,
//! quote, quote) loses everything from the splitter on.
//!
//! Markers:
//! - `t` text, `e` empty, `m` `>`-quoted line
//! - `s` reply splitter (`On … wrote:`, `-----Original Message-----`, Outlook headers)
//! - `f` forwarded-message marker

use kuchiki::iter::NodeEdge;
use kuchiki::traits::*;
use kuchiki::NodeRef;
use regex::Regex;

use crate::model::address::EmailAddress;
use crate::model::message::ContentKind;

/// Bodies longer than this are passed through untouched.
const MAX_LINES_COUNT: usize = 1000;
/// Only this many trailing non-empty lines are considered for a signature.
const SIGNATURE_MAX_LINES: usize = 11;
/// Lines longer than this are prose, never signature.
const TOO_LONG_SIGNATURE_LINE: usize = 60;
/// How far below a `From:` line the Outlook `Sent:`/`Date:` line may sit.
const OUTLOOK_HEADER_SPAN: usize = 4;

/// Elements removed wholesale from HTML bodies.
const QUOTE_SELECTORS: &str =
    ".gmail_quote, blockquote[type=cite], .yahoo_quoted, .moz-cite-prefix, .protonmail_quote";

/// Elements that end a line of text in HTML bodies.
const LINE_BREAKING_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "center", "dd", "div", "dl", "dt",
    "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main",
    "nav", "ol", "p", "pre", "section", "table", "tr", "ul",
];

const HIDDEN_ELEMENTS: &[&str] = &["head", "script", "style", "title"];

/// Elements that mark the start of quoted history in HTML bodies.
const CUT_SELECTORS: &str = "#divRplyFwdMsg, #appendonsend, hr#stopSpelling, \
    [id^=OLK_SRC_BODY_SECTION], div[style*=\"border-top:solid #E1E1E1\"], \
    div[style*=\"border-top:solid #B5C4DF\"]";

/// Natural-language heuristics for separating new content from history.
pub trait ReplyHeuristics {
    /// Remove quoted earlier conversation from `body`.
    fn strip_quotations(&self, body: &str, kind: ContentKind) -> String;

    /// Split a trailing signature off `reply`, returning `(reply, signature)`.
    ///
    /// `sender` is the raw `From` header; lines naming the sender count as
    /// signature openers.
    fn strip_signature(
        &self,
        reply: &str,
        kind: ContentKind,
        sender: &str,
    ) -> (String, Option<String>);
}

/// Regex-driven heuristics. Build once with [`PatternHeuristics::init`].
#[derive(Debug, Clone)]
pub struct PatternHeuristics {
    on_wrote: Regex,
    original_message: Regex,
    outlook_from: Regex,
    outlook_sent: Regex,
    forwarded: Regex,
    signature: Regex,
    phone_signature: Regex,
    markers: MarkerRules,
}

#[derive(Debug, Clone)]
struct MarkerRules {
    spread_quotes: Regex,
    inline_reply: Regex,
    splitter_then_text: Regex,
    quotation: Regex,
    empty_quotation: Regex,
}

impl PatternHeuristics {
    /// Compile the pattern set.
    pub fn init() -> Result<Self, regex::Error> {
        Ok(Self {
            on_wrote: Regex::new(
                r"(?i)^\s*(?:on|le|am|op|el|den)\s.{1,200}\s(?:wrote|a\s+écrit|schrieb|schreef|escribió|skrev)\s*:?\s*$",
            )?,
            original_message: Regex::new(
                r"(?i)^\s*[-_]{2,}\s*(?:original message|ursprüngliche nachricht|message d'origine)\s*[-_]{2,}\s*$",
            )?,
            outlook_from: Regex::new(r"(?i)^\s*\*?(?:from|von|de)\s*:\*?\s*\S")?,
            outlook_sent: Regex::new(r"(?i)^\s*\*?(?:sent|date|gesendet|envoyé)\s*:\*?\s*\S")?,
            forwarded: Regex::new(
                r"(?i)^\s*(?:[-_]{2,}\s*forwarded message\s*[-_]{2,}|begin forwarded message\s*:)",
            )?,
            signature: Regex::new(
                r"(?i)^\s*(?:(?:-{2,}|_{2,})\s*[\p{L} .]*|-\p{L}[\p{L} .]*|(?:many\s+)?thanks?(?:\s+you)?|(?:kind\s+|best\s+|warm\s+)?regards|best[ \p{L}]*|cheers|sincerely|yours(?:\s+\p{L}+)?)[\s,!.]*$",
            )?,
            phone_signature: Regex::new(
                r"(?i)^\s*(?:sent from my\s+[\w ]{1,40}|get outlook for \w+)\s*$",
            )?,
            markers: MarkerRules {
                spread_quotes: Regex::new(r"(?:me*){3}")?,
                inline_reply: Regex::new(r"me*t[te]*m")?,
                splitter_then_text: Regex::new(r"(?:se*)+(?:[tf]+e*)+")?,
                quotation: Regex::new(r"((?:s|(?:me*){2,}).*me*)[te]*$")?,
                empty_quotation: Regex::new(r"((?:s|(?:me*){2,}))e*$")?,
            },
        })
    }

    // ── Plain text ──────────────────────────────────────────────

    fn mark_lines(&self, lines: &[&str]) -> String {
        let mut markers: Vec<u8> = vec![b't'; lines.len()];
        let mut i = 0;
        while i < lines.len() {
            let line = lines[i];
            let trimmed = line.trim();
            if trimmed.is_empty() {
                markers[i] = b'e';
            } else if trimmed.starts_with('>') {
                markers[i] = b'm';
            } else if self.forwarded.is_match(line) {
                markers[i] = b'f';
            } else if self.is_splitter(lines, i) {
                markers[i] = b's';
            } else if let Some(next) = lines.get(i + 1).filter(|n| !self.on_wrote.is_match(n)) {
                // "On <date>, <name>\n<address> wrote:" wrapped by the sender's client
                let joined = format!("{} {}", trimmed, next.trim());
                if self.on_wrote.is_match(&joined) {
                    markers[i] = b's';
                    markers[i + 1] = b's';
                    i += 1;
                }
            }
            i += 1;
        }
        String::from_utf8(markers).unwrap_or_default()
    }

    fn is_splitter(&self, lines: &[&str], i: usize) -> bool {
        let line = lines[i];
        if self.on_wrote.is_match(line) || self.original_message.is_match(line) {
            return true;
        }
        self.outlook_from.is_match(line)
            && lines
                .iter()
                .skip(i + 1)
                .take(OUTLOOK_HEADER_SPAN)
                .any(|l| self.outlook_sent.is_match(l))
    }

    /// Decide which line range is quotation. `None` keeps the body whole.
    fn quoted_range(&self, markers: &str) -> Option<(usize, usize)> {
        let rules = &self.markers;

        // Forwarded content is part of what the sender wrote.
        if let Some(fwd) = markers.find('f') {
            if markers.find('s').map_or(true, |s| fwd < s) {
                return None;
            }
        }

        // A lone '>' line is not a quotation.
        let markers = if !markers.contains('s') && !rules.spread_quotes.is_match(markers) {
            markers.replace('m', "t")
        } else {
            markers.to_string()
        };

        if rules.inline_reply.is_match(&markers) {
            return None;
        }
        if let Some(found) = rules.splitter_then_text.find(&markers) {
            return Some((found.start(), markers.len()));
        }
        rules
            .quotation
            .captures(&markers)
            .or_else(|| rules.empty_quotation.captures(&markers))
            .and_then(|caps| caps.get(1))
            .map(|group| (group.start(), group.end()))
    }

    fn strip_plain_quotations(&self, body: &str) -> String {
        let delimiter = line_delimiter(body);
        let lines: Vec<&str> = body.split(delimiter).collect();
        if lines.len() > MAX_LINES_COUNT {
            return body.to_string();
        }

        let markers = self.mark_lines(&lines);
        let Some((start, end)) = self.quoted_range(&markers) else {
            return body.to_string();
        };

        let kept: Vec<&str> = lines[..start]
            .iter()
            .chain(lines[end..].iter())
            .copied()
            .collect();
        let reply = kept.join(delimiter);
        if reply.trim().is_empty() {
            return body.to_string();
        }
        reply.trim_end().to_string()
    }

    fn strip_plain_signature(&self, reply: &str, sender: &Sender) -> (String, Option<String>) {
        let delimiter = line_delimiter(reply);
        let trimmed = reply.trim();
        let lines: Vec<&str> = trimmed.split(delimiter).collect();

        match self.signature_start(&lines, sender) {
            Some(cut) => {
                let text = lines[..cut].join(delimiter).trim_end().to_string();
                let signature = lines[cut..].join(delimiter);
                (text, Some(signature))
            }
            None => (trimmed.to_string(), None),
        }
    }

    /// Index of the first signature line, if any.
    fn signature_start(&self, lines: &[&str], sender: &Sender) -> Option<usize> {
        let non_empty: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty())
            .map(|(i, _)| i)
            .collect();

        // "Sent from my iPhone" is stripped even when nothing else is.
        let mut limit = non_empty.len();
        let mut phone = None;
        if let Some(&last) = non_empty.last() {
            if non_empty.len() > 1 && self.phone_signature.is_match(lines[last]) {
                phone = Some(last);
                limit -= 1;
            }
        }

        let mut candidates: Vec<usize> = non_empty[..limit]
            .iter()
            .skip(1)
            .rev()
            .take(SIGNATURE_MAX_LINES)
            .take_while(|&&i| lines[i].trim().chars().count() <= TOO_LONG_SIGNATURE_LINE)
            .copied()
            .collect();
        candidates.reverse();

        candidates
            .into_iter()
            .find(|&i| self.signature.is_match(lines[i]) || sender.is_named_by(lines[i]))
            .or(phone)
    }

    // ── Rich text ───────────────────────────────────────────────

    fn strip_html_quotations(&self, html: &str) -> String {
        let document = kuchiki::parse_html().one(html);

        if let Ok(quotes) = document.select(QUOTE_SELECTORS) {
            let quotes: Vec<NodeRef> = quotes.map(|q| q.as_node().clone()).collect();
            for quote in quotes {
                if !self.forwarded.is_match(quote.text_contents().trim()) {
                    quote.detach();
                }
            }
        }

        let marker = document
            .select(CUT_SELECTORS)
            .ok()
            .and_then(|mut found| found.next())
            .map(|m| m.as_node().clone())
            .or_else(|| self.find_html_splitter(&document));
        if let Some(marker) = marker {
            cut_from(&marker);
        }

        let reply = body_html(&document);
        if document.text_contents().trim().is_empty() {
            return html.to_string();
        }
        reply
    }

    /// The outermost node whose entire text is an `On … wrote:` line.
    fn find_html_splitter(&self, document: &NodeRef) -> Option<NodeRef> {
        let text_node = document.descendants().text_nodes().find(|t| {
            let text = collapse_whitespace(&t.borrow());
            self.on_wrote.is_match(&text) || self.original_message.is_match(&text)
        })?;

        let mut outermost = text_node.as_node().clone();
        let own_text = collapse_whitespace(&outermost.text_contents());
        for ancestor in text_node.as_node().ancestors() {
            if is_boundary(&ancestor) || collapse_whitespace(&ancestor.text_contents()) != own_text {
                break;
            }
            outermost = ancestor;
        }
        Some(outermost)
    }

    fn strip_html_signature(&self, html: &str, sender: &Sender) -> (String, Option<String>) {
        let document = kuchiki::parse_html().one(html);
        let lines = html_lines(&document);
        let texts: Vec<&str> = lines.iter().map(|(text, _)| text.as_str()).collect();

        match self.signature_start(&texts, sender) {
            Some(cut) => {
                let signature = texts[cut..].join("\n");
                cut_from(&lines[cut].1);
                (body_html(&document), Some(signature))
            }
            None => (html.to_string(), None),
        }
    }
}

impl ReplyHeuristics for PatternHeuristics {
    fn strip_quotations(&self, body: &str, kind: ContentKind) -> String {
        match kind {
            ContentKind::PlainText => self.strip_plain_quotations(body),
            ContentKind::RichText => self.strip_html_quotations(body),
        }
    }

    fn strip_signature(
        &self,
        reply: &str,
        kind: ContentKind,
        sender: &str,
    ) -> (String, Option<String>) {
        let sender = Sender::from_header(sender);
        match kind {
            ContentKind::PlainText => self.strip_plain_signature(reply, &sender),
            ContentKind::RichText => self.strip_html_signature(reply, &sender),
        }
    }
}

/// Ways a sender may sign off with their own name.
struct Sender {
    names: Vec<String>,
}

impl Sender {
    fn from_header(raw: &str) -> Self {
        let mut names = Vec::new();
        if let Some(addr) = EmailAddress::parse_header(raw).into_iter().next() {
            let display = addr.display_name.trim().to_lowercase();
            if let Some(first) = display.split_whitespace().next() {
                if first.chars().count() > 1 {
                    names.push(first.to_string());
                }
            }
            if !display.is_empty() {
                names.push(display);
            }
            let address = addr.address.trim().to_lowercase();
            if let Some((local, _)) = address.split_once('@') {
                names.push(local.to_string());
            }
            if !address.is_empty() {
                names.push(address);
            }
        }
        Self { names }
    }

    fn is_named_by(&self, line: &str) -> bool {
        let normalized = line
            .trim()
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        !normalized.is_empty() && self.names.iter().any(|n| *n == normalized)
    }
}

fn line_delimiter(text: &str) -> &'static str {
    if text.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_boundary(node: &NodeRef) -> bool {
    node.as_document().is_some()
        || node
            .as_element()
            .map(|e| matches!(e.name.local.as_ref(), "body" | "html"))
            .unwrap_or(false)
}

/// Visible, non-empty lines of `document` with the first text node of each.
///
/// Lines break at block elements and `<br>`; inline markup stays on its line.
fn html_lines(document: &NodeRef) -> Vec<(String, NodeRef)> {
    fn flush(lines: &mut Vec<(String, NodeRef)>, current: &mut Option<(String, NodeRef)>) {
        if let Some((text, node)) = current.take() {
            let text = collapse_whitespace(&text);
            if !text.is_empty() {
                lines.push((text, node));
            }
        }
    }

    let mut lines = Vec::new();
    let mut current: Option<(String, NodeRef)> = None;
    let mut hidden = 0usize;

    for edge in document.traverse() {
        match edge {
            NodeEdge::Start(node) => {
                if let Some(element) = node.as_element() {
                    let name = element.name.local.as_ref();
                    if HIDDEN_ELEMENTS.contains(&name) {
                        hidden += 1;
                    }
                    if LINE_BREAKING_ELEMENTS.contains(&name) {
                        flush(&mut lines, &mut current);
                    }
                } else if let Some(text) = node.as_text() {
                    if hidden > 0 {
                        continue;
                    }
                    let text = text.borrow();
                    match current.as_mut() {
                        Some((line, _)) => line.push_str(&text),
                        None => current = Some((text.to_string(), node.clone())),
                    }
                }
            }
            NodeEdge::End(node) => {
                if let Some(element) = node.as_element() {
                    let name = element.name.local.as_ref();
                    if HIDDEN_ELEMENTS.contains(&name) {
                        hidden = hidden.saturating_sub(1);
                    }
                    if LINE_BREAKING_ELEMENTS.contains(&name) {
                        flush(&mut lines, &mut current);
                    }
                }
            }
        }
    }
    flush(&mut lines, &mut current);
    lines
}

/// Detach `node` and everything after it in document order, up to `<body>`.
fn cut_from(node: &NodeRef) {
    let mut cursor = Some(node.clone());
    while let Some(current) = cursor {
        let following: Vec<NodeRef> = current.following_siblings().collect();
        for sibling in following {
            sibling.detach();
        }
        cursor = current.parent().filter(|p| !is_boundary(p));
    }
    node.detach();
}

/// Serialize the children of `<body>`.
fn body_html(document: &NodeRef) -> String {
    if let Ok(mut bodies) = document.select("body") {
        if let Some(body) = bodies.next() {
            return body
                .as_node()
                .children()
                .map(|child| child.to_string())
                .collect();
        }
    }
    document.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heuristics() -> PatternHeuristics {
        PatternHeuristics::init().expect("patterns compile")
    }

    fn plain(h: &PatternHeuristics, body: &str) -> String {
        h.strip_quotations(body, ContentKind::PlainText)
    }

    #[test]
    fn test_on_wrote_splitter() {
        let body = "farewell reply\n\nOn Thu, 4 Oct 2018 at 17:51, Seb Bacon <seb@example.org> wrote:\n> farewell\n";
        assert_eq!(plain(&heuristics(), body), "farewell reply");
    }

    #[test]
    fn test_wrapped_on_wrote_splitter() {
        let body = "ok\n\nOn Thu, 4 Oct 2018 at 17:51, Seb Bacon\n<seb@example.org> wrote:\n> farewell\n";
        assert_eq!(plain(&heuristics(), body), "ok");
    }

    #[test]
    fn test_original_message_splitter_keeps_crlf() {
        let body = "line one\r\nline two\r\n\r\n-----Original Message-----\r\nFrom: a@b\r\nhistory\r\n";
        assert_eq!(plain(&heuristics(), body), "line one\r\nline two");
    }

    #[test]
    fn test_outlook_header_block() {
        let body = "Sure.\n\nFrom: Seb Bacon <seb@example.org>\nSent: 04 October 2018 17:51\nTo: team\nSubject: adieu\n\nfarewell\n";
        assert_eq!(plain(&heuristics(), body), "Sure.");
    }

    #[test]
    fn test_trailing_quote_block_removed() {
        let body = "Agreed\n\n> one\n> two\n> three\n";
        assert_eq!(plain(&heuristics(), body), "Agreed");
    }

    #[test]
    fn test_inline_reply_kept_whole() {
        let body = "Hi\nOn Mon, Jan 1, 2024, Bob wrote:\n> question one\nanswer one\n> question two\nanswer two";
        assert_eq!(plain(&heuristics(), body), body);
    }

    #[test]
    fn test_two_quote_lines_without_splitter_kept() {
        let body = "Agreed\n\n> one\n> two";
        assert_eq!(plain(&heuristics(), body), body);
    }

    #[test]
    fn test_single_quote_line_is_text() {
        let body = "see below\n> not really a quote\nthanks";
        assert_eq!(plain(&heuristics(), body), body);
    }

    #[test]
    fn test_forwarded_message_kept() {
        let body = "FYI\n\n---------- Forwarded message ----------\nFrom: a@b\nDate: today\n\nhello";
        assert_eq!(plain(&heuristics(), body), body);
    }

    #[test]
    fn test_only_quotes_returns_original() {
        let body = "On Mon, Jan 1, 2024, Bob wrote:\n> a\n> b";
        assert_eq!(plain(&heuristics(), body), body);
    }

    #[test]
    fn test_signature_delimiter() {
        let h = heuristics();
        let (text, sig) =
            h.strip_signature("Meet at 5.\n\n-- \nSeb\n+44 1234", ContentKind::PlainText, "");
        assert_eq!(text, "Meet at 5.");
        assert_eq!(sig.as_deref(), Some("-- \nSeb\n+44 1234"));
    }

    #[test]
    fn test_signature_valediction() {
        let h = heuristics();
        let (text, sig) = h.strip_signature(
            "Numbers attached.\nThanks,\nSeb",
            ContentKind::PlainText,
            "\"Seb Bacon\" <seb@example.org>",
        );
        assert_eq!(text, "Numbers attached.");
        assert_eq!(sig.as_deref(), Some("Thanks,\nSeb"));
    }

    #[test]
    fn test_signature_sender_name() {
        let h = heuristics();
        let (text, _) = h.strip_signature(
            "Numbers attached.\nSeb Bacon\nEBM DataLab",
            ContentKind::PlainText,
            "\"Seb Bacon\" <seb@example.org>",
        );
        assert_eq!(text, "Numbers attached.");
    }

    #[test]
    fn test_first_line_never_signature() {
        let h = heuristics();
        let (text, sig) = h.strip_signature("Thanks!", ContentKind::PlainText, "");
        assert_eq!(text, "Thanks!");
        assert!(sig.is_none());
    }

    #[test]
    fn test_phone_signature() {
        let h = heuristics();
        let (text, sig) =
            h.strip_signature("On my way\n\nSent from my iPhone", ContentKind::PlainText, "");
        assert_eq!(text, "On my way");
        assert_eq!(sig.as_deref(), Some("Sent from my iPhone"));
    }

    #[test]
    fn test_plain_prose_untouched() {
        let h = heuristics();
        let (text, sig) = h.strip_signature("farewell", ContentKind::PlainText, "Seb <s@x>");
        assert_eq!(text, "farewell");
        assert!(sig.is_none());
    }

    #[test]
    fn test_html_gmail_quote_removed() {
        let h = heuristics();
        let html = r#"<div dir="ltr">farewell reply</div><br><div class="gmail_quote"><div class="gmail_attr">On Thu, 4 Oct 2018 at 17:51, Seb wrote:</div><blockquote class="gmail_quote">farewell</blockquote></div>"#;
        let out = h.strip_quotations(html, ContentKind::RichText);
        assert!(out.contains("farewell reply"));
        assert!(!out.contains("gmail_quote"));
        assert!(!out.contains("wrote:"));
    }

    #[test]
    fn test_html_outlook_marker_cuts_rest() {
        let h = heuristics();
        let html = r#"<div><p>New text</p><div id="appendonsend"></div><hr><div id="divRplyFwdMsg">From: x</div><p>old</p></div><p>older</p>"#;
        let out = h.strip_quotations(html, ContentKind::RichText);
        assert!(out.contains("New text"));
        assert!(!out.contains("old"));
    }

    #[test]
    fn test_html_text_splitter() {
        let h = heuristics();
        let html = "<p>Yes please</p><p>On Mon, 1 Jan 2024, Bob &lt;bob@x&gt; wrote:</p><p>question?</p>";
        let out = h.strip_quotations(html, ContentKind::RichText);
        assert!(out.contains("Yes please"));
        assert!(!out.contains("question?"));
    }

    #[test]
    fn test_html_signature() {
        let h = heuristics();
        let html = "<p>See you there</p><p>Cheers,<br>Seb</p>";
        let (out, sig) = h.strip_signature(html, ContentKind::RichText, "Seb <s@x>");
        assert!(out.contains("See you there"));
        assert!(!out.contains("Cheers"));
        assert_eq!(sig.as_deref(), Some("Cheers,\nSeb"));
    }

    #[test]
    fn test_html_emphasized_word_mid_sentence_kept() {
        let h = heuristics();
        let html = "<p>Hello team</p><p>This is the <b>best</b> plan we have, please read all of it carefully.</p><p>Meeting is Tuesday.</p>";
        let (out, sig) = h.strip_signature(html, ContentKind::RichText, "Seb <s@x>");
        assert_eq!(out, html);
        assert!(sig.is_none());
    }

    #[test]
    fn test_html_signature_line_spans_inline_markup() {
        let h = heuristics();
        let html = "<p>See you there</p><p><b>Many</b> thanks,</p><p>Seb</p>";
        let (out, sig) = h.strip_signature(html, ContentKind::RichText, "Seb <s@x>");
        assert!(out.contains("See you there"));
        assert!(!out.contains("Many"));
        assert!(!out.contains("Seb"));
        assert_eq!(sig.as_deref(), Some("Many thanks,\nSeb"));
    }
}
