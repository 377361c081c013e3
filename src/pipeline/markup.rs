//! HTML → Slack `mrkdwn`.
//!
//! Only what Slack can display survives: emphasis, strike, code, links, line
//! structure and bullets. Unknown tags are unwrapped, never rejected.

use kuchiki::traits::*;
use kuchiki::NodeRef;

use super::format::is_link_target;

/// Convert an HTML fragment or document to Slack markup.
pub fn html_to_mrkdwn(html: &str) -> String {
    let document = kuchiki::parse_html().one(html);
    tidy(&render(&document, false))
}

fn render_children(node: &NodeRef, in_pre: bool) -> String {
    node.children().map(|child| render(&child, in_pre)).collect()
}

fn render(node: &NodeRef, in_pre: bool) -> String {
    if let Some(text) = node.as_text() {
        let text = text.borrow();
        return if in_pre {
            escape(&text)
        } else {
            escape(&collapse_whitespace(&text))
        };
    }

    let Some(element) = node.as_element() else {
        return match node.as_document() {
            Some(_) => render_children(node, in_pre),
            None => String::new(), // comments, doctype
        };
    };

    match element.name.local.as_ref() {
        "head" | "title" | "script" | "style" | "noscript" | "template" => String::new(),

        "b" | "strong" => emphasize(&render_children(node, in_pre), "*"),
        "i" | "em" => emphasize(&render_children(node, in_pre), "_"),
        "s" | "strike" | "del" => emphasize(&render_children(node, in_pre), "~"),
        "code" if !in_pre => emphasize(&render_children(node, in_pre), "`"),

        "pre" => {
            let inner = render_children(node, true);
            format!("\n```\n{}\n```\n", inner.trim_matches('\n'))
        }

        "a" => {
            let href = element
                .attributes
                .borrow()
                .get("href")
                .map(|h| h.trim().to_string())
                .unwrap_or_default();
            link(&href, &render_children(node, in_pre))
        }

        "br" => "\n".to_string(),
        "hr" => "\n\n".to_string(),

        "li" => format!("\n• {}", render_children(node, in_pre).trim()),

        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let inner = render_children(node, in_pre);
            format!("\n\n{}\n\n", emphasize(inner.trim(), "*"))
        }

        "p" | "blockquote" | "table" | "ul" | "ol" | "dl" => {
            format!("\n\n{}\n\n", render_children(node, in_pre))
        }

        "div" | "section" | "article" | "header" | "footer" | "nav" | "aside" | "main"
        | "address" | "figure" | "tr" | "dt" | "dd" | "center" => {
            format!("\n{}\n", render_children(node, in_pre))
        }

        "td" | "th" => format!("{} ", render_children(node, in_pre)),

        _ => render_children(node, in_pre),
    }
}

/// Wrap `inner` in `delim`, keeping surrounding whitespace outside the markers.
fn emphasize(inner: &str, delim: &str) -> String {
    let trimmed = inner.trim();
    if trimmed.is_empty() {
        return inner.to_string();
    }
    let lead = &inner[..inner.len() - inner.trim_start().len()];
    let trail = &inner[inner.trim_end().len()..];
    format!("{lead}{delim}{trimmed}{delim}{trail}")
}

fn link(href: &str, label: &str) -> String {
    let label = collapse_whitespace(label);
    let label = label.trim();
    if href.starts_with('#') || !is_link_target(href) {
        return label.to_string();
    }
    let bare = href.strip_prefix("mailto:").unwrap_or(href);
    if label.is_empty() || label == href || label == bare {
        format!("<{href}>")
    } else {
        format!("<{href}|{label}>")
    }
}

/// Escape the three characters Slack reserves for markup.
pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Collapse runs of ASCII whitespace to one space. Non-breaking spaces survive.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_ascii_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

/// Trim lines outside code fences and allow at most one blank line in a row.
fn tidy(raw: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut in_fence = false;
    let mut blank_run = 0;

    for line in raw.split('\n') {
        if line.trim() == "```" {
            in_fence = !in_fence;
            blank_run = 0;
            lines.push("```");
            continue;
        }
        if in_fence {
            lines.push(line);
            continue;
        }
        let line = line.trim_matches(' ');
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        lines.push(line);
    }

    lines.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emphasis() {
        assert_eq!(
            html_to_mrkdwn("<p>Hello <b>world</b>, <em>really</em> <del>not</del></p>"),
            "Hello *world*, _really_ ~not~"
        );
    }

    #[test]
    fn test_emphasis_whitespace_moves_outside() {
        assert_eq!(html_to_mrkdwn("a<i> b </i>c"), "a _b_ c");
        assert_eq!(html_to_mrkdwn("a<b> </b>c"), "a c");
    }

    #[test]
    fn test_link_with_label() {
        assert_eq!(
            html_to_mrkdwn(r#"Read <a href="https://example.org/a?b=1&amp;c=2">the report</a>."#),
            "Read <https://example.org/a?b=1&c=2|the report>."
        );
    }

    #[test]
    fn test_link_label_equal_to_url() {
        assert_eq!(
            html_to_mrkdwn(r#"<a href="https://example.org">https://example.org</a>"#),
            "<https://example.org>"
        );
        assert_eq!(
            html_to_mrkdwn(r#"<a href="mailto:seb@example.org">seb@example.org</a>"#),
            "<mailto:seb@example.org>"
        );
    }

    #[test]
    fn test_anchor_without_href_is_text() {
        assert_eq!(html_to_mrkdwn(r#"<a name="top">Top</a>"#), "Top");
    }

    #[test]
    fn test_relative_href_is_text() {
        assert_eq!(html_to_mrkdwn(r#"<a href="report.html">the report</a>"#), "the report");
    }

    #[test]
    fn test_unknown_tags_unwrapped_and_scripts_dropped() {
        let html = r#"<html><head><title>t</title><style>p{}</style></head>
            <body><font color="red">hi</font><script>alert(1)</script></body></html>"#;
        assert_eq!(html_to_mrkdwn(html), "hi");
    }

    #[test]
    fn test_paragraphs_and_breaks() {
        let html = "<p>one<br>two</p>\n\n\n<p>three</p><div>four</div>";
        assert_eq!(html_to_mrkdwn(html), "one\ntwo\n\nthree\n\nfour");
    }

    #[test]
    fn test_list_bullets() {
        assert_eq!(
            html_to_mrkdwn("<ul><li>one</li><li> two </li></ul>"),
            "• one\n• two"
        );
    }

    #[test]
    fn test_heading_is_bold() {
        assert_eq!(html_to_mrkdwn("<h2>Title</h2><p>text</p>"), "*Title*\n\ntext");
    }

    #[test]
    fn test_text_is_escaped() {
        assert_eq!(html_to_mrkdwn("<p>a &amp; b &lt; c</p>"), "a &amp; b &lt; c");
    }

    #[test]
    fn test_pre_keeps_whitespace() {
        assert_eq!(
            html_to_mrkdwn("<pre>let x = 1;\n    y();</pre>"),
            "```\nlet x = 1;\n    y();\n```"
        );
        assert_eq!(html_to_mrkdwn("run <code>make</code> now"), "run `make` now");
    }
}
