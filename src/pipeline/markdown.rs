//! HTML to Markdown conversion
//!
//! A DOM sanitize pass enforces the conversion rules htmd does not know
//! about (placeholder images, oversized tables, empty anchors, dropped
//! tags), htmd performs the core transform, and regex passes from the
//! shared pattern table finish the output. A catastrophic transform
//! failure degrades to plain text with normalized whitespace.

use std::sync::OnceLock;

use ego_tree::NodeRef;
use regex::Regex;
use scraper::{Html, Node};
use tracing::warn;

use super::rules::FormatPatterns;

/// Tags dropped wholesale, children included
const DROPPED_TAGS: [&str; 6] = ["script", "style", "iframe", "noscript", "canvas", "svg"];

/// Void elements emitted without children or a closing tag
const VOID_TAGS: [&str; 13] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Image sources treated as tracking/layout placeholders
const PLACEHOLDER_IMAGE_PATTERNS: [&str; 6] = [
    "blank.gif",
    "placeholder",
    "spacer",
    "1x1.gif",
    "pixel",
    "transparent",
];

/// Tables beyond this row count are replaced with a blank line
const MAX_TABLE_ROWS: usize = 20;

/// Convert sanitized page HTML into Markdown.
pub fn to_markdown(html: &str, remove_images: bool, patterns: &FormatPatterns) -> String {
    let pre = pre_process(html, patterns);
    let sanitized = sanitize(&pre, remove_images);
    let core = match htmd::convert(&sanitized) {
        Ok(markdown) => markdown,
        Err(e) => {
            warn!(error = %e, "markdown transform failed, falling back to plain text");
            plain_text_fallback(&sanitized)
        }
    };
    post_process(&core, patterns)
}

/// Strip documentation-table residue and unescape `\_`, `\\`,
/// `` \` ``, `\'` before parsing.
fn pre_process(html: &str, patterns: &FormatPatterns) -> String {
    let without_pipes: String = html
        .lines()
        .filter(|line| !line.contains('|'))
        .collect::<Vec<_>>()
        .join("\n");
    patterns
        .escape_chars
        .replace_all(&without_pipes, |caps: &regex::Captures| {
            caps[0][1..].to_string()
        })
        .into_owned()
}

/// Re-serialize the fragment, applying the structural conversion rules.
pub fn sanitize(html: &str, remove_images: bool) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::with_capacity(html.len());
    for child in fragment.root_element().children() {
        emit_node(child, &mut out, remove_images);
    }
    out
}

fn emit_node(node: NodeRef<Node>, out: &mut String, remove_images: bool) {
    match node.value() {
        Node::Text(text) => push_escaped_text(out, text),
        Node::Element(element) => {
            let name = element.name();
            if DROPPED_TAGS.contains(&name) {
                return;
            }
            match name {
                "a" => {
                    let text = collect_text(node);
                    let trimmed = text.trim();
                    let holds_image = !remove_images && has_image_descendant(node);
                    if (trimmed.is_empty() || trimmed == "#") && !holds_image {
                        return;
                    }
                }
                "img" => {
                    if remove_images {
                        return;
                    }
                    let src = element.attr("src").unwrap_or("");
                    if src.is_empty() || is_placeholder_image(src) {
                        return;
                    }
                }
                "table" => {
                    if table_row_count(node) > MAX_TABLE_ROWS {
                        out.push_str("\n\n");
                        return;
                    }
                }
                _ => {}
            }

            out.push('<');
            out.push_str(name);
            for (attr_name, attr_value) in element.attrs() {
                out.push(' ');
                out.push_str(attr_name);
                out.push_str("=\"");
                out.push_str(&attr_value.replace('&', "&amp;").replace('"', "&quot;"));
                out.push('"');
            }
            out.push('>');

            if VOID_TAGS.contains(&name) {
                return;
            }
            for child in node.children() {
                emit_node(child, out, remove_images);
            }
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        _ => {}
    }
}

fn push_escaped_text(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn collect_text(node: NodeRef<Node>) -> String {
    let mut text = String::new();
    for descendant in node.descendants() {
        if let Some(t) = descendant.value().as_text() {
            text.push_str(t);
        }
    }
    text
}

fn has_image_descendant(node: NodeRef<Node>) -> bool {
    node.descendants().any(|n| {
        n.value()
            .as_element()
            .map(|e| e.name() == "img")
            .unwrap_or(false)
    })
}

fn table_row_count(node: NodeRef<Node>) -> usize {
    node.descendants()
        .filter(|n| {
            n.value()
                .as_element()
                .map(|e| e.name() == "tr")
                .unwrap_or(false)
        })
        .count()
}

fn is_placeholder_image(src: &str) -> bool {
    let src = src.to_ascii_lowercase();
    PLACEHOLDER_IMAGE_PATTERNS
        .iter()
        .any(|pattern| src.contains(pattern))
}

/// Collapse newline runs, drop residual pipe-bearing lines, repair
/// escaped link syntax, and normalize bullet markers.
fn post_process(markdown: &str, patterns: &FormatPatterns) -> String {
    static ESCAPED_LINK: OnceLock<Regex> = OnceLock::new();
    static BULLET_MARKER: OnceLock<Regex> = OnceLock::new();

    let escaped_link =
        ESCAPED_LINK.get_or_init(|| Regex::new(r"\\\[([^\]]*)\\\]\(").expect("valid pattern"));
    let bullet_marker =
        BULLET_MARKER.get_or_init(|| Regex::new(r"(?m)^(\s*)\* ").expect("valid pattern"));

    let collapsed = patterns.excessive_newlines.replace_all(markdown, "\n\n");
    let without_pipes: String = collapsed
        .lines()
        .filter(|line| !line.contains('|'))
        .collect::<Vec<_>>()
        .join("\n");
    let fixed_links = escaped_link.replace_all(&without_pipes, "[$1](");
    let dashed = bullet_marker.replace_all(&fixed_links, "${1}- ");
    dashed.trim().to_string()
}

/// Last-resort output: the fragment's text content with whitespace
/// normalized.
pub fn plain_text_fallback(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text = fragment.root_element().text().collect::<Vec<_>>().join(" ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
