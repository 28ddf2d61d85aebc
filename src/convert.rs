//! Rich-text to plain-text conversion.
//!
//! The transformer consumes converters through the [`RichTextConverter`]
//! trait so the forum's real converters can be injected; [`HtmlConverter`]
//! is the built-in implementation, a lenient tag stripper over `quick-xml`.
//! Block-level elements become paragraph breaks (`\n\n`) so the post
//! sharder can split on them.

use anyhow::{bail, Result};
use quick_xml::events::Event;
use quick_xml::Reader;

/// Converts an entity's rich-text body into indexable plain text.
///
/// Implementations must be pure with respect to their input: same HTML in,
/// same text out. Errors are recovered by the transformer (the field
/// degrades to an empty string), so a converter should fail rather than
/// emit garbage.
pub trait RichTextConverter: Send + Sync {
    fn to_text(&self, html: &str) -> Result<String>;
}

/// Built-in lenient HTML-to-text converter.
pub struct HtmlConverter;

impl RichTextConverter for HtmlConverter {
    fn to_text(&self, html: &str) -> Result<String> {
        html_to_text(html)
    }
}

/// Tags that terminate a paragraph when closed.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "li", "blockquote", "pre", "h1", "h2", "h3", "h4", "h5", "h6", "tr",
];

/// Tags whose text content is never indexable.
const SKIP_TAGS: &[&str] = &["script", "style"];

fn html_to_text(html: &str) -> Result<String> {
    if html.trim().is_empty() {
        return Ok(String::new());
    }

    let mut reader = Reader::from_str(html);
    // Forum HTML is not well-formed XML; tolerate mismatched tags.
    reader.config_mut().check_end_names = false;

    let mut out = String::new();
    let mut skip_depth: usize = 0;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_lowercase();
                if SKIP_TAGS.contains(&name.as_str()) {
                    skip_depth += 1;
                } else if name == "br" {
                    // HTML line breaks are rarely self-closed.
                    out.push('\n');
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_lowercase();
                if SKIP_TAGS.contains(&name.as_str()) {
                    skip_depth = skip_depth.saturating_sub(1);
                } else if BLOCK_TAGS.contains(&name.as_str()) {
                    push_break(&mut out);
                }
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_lowercase();
                if name == "br" {
                    out.push('\n');
                }
            }
            Ok(Event::Text(t)) => {
                if skip_depth == 0 {
                    out.push_str(&decode_entities(&String::from_utf8_lossy(t.as_ref())));
                }
            }
            Ok(Event::CData(t)) => {
                if skip_depth == 0 {
                    out.push_str(&String::from_utf8_lossy(t.as_ref()));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => bail!("malformed rich text at byte {}: {}", reader.buffer_position(), e),
        }
    }

    Ok(normalize(&out))
}

fn push_break(out: &mut String) {
    if !out.is_empty() && !out.ends_with("\n\n") {
        while out.ends_with('\n') || out.ends_with(' ') {
            out.pop();
        }
        out.push_str("\n\n");
    }
}

/// Decode the handful of entities that actually show up in forum content.
/// quick-xml's own unescape rejects HTML-only entities like `&nbsp;`.
fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Collapse runs of blank lines to a single paragraph break and trim.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        out.push_str(line);
        blank_run = 0;
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags() {
        let text = html_to_text("<p>Hello <b>world</b></p>").unwrap();
        assert_eq!(text, "Hello world");
    }

    #[test]
    fn paragraphs_become_double_newlines() {
        let text = html_to_text("<p>First.</p><p>Second.</p>").unwrap();
        assert_eq!(text, "First.\n\nSecond.");
    }

    #[test]
    fn empty_input_is_empty() {
        assert_eq!(html_to_text("").unwrap(), "");
        assert_eq!(html_to_text("   ").unwrap(), "");
    }

    #[test]
    fn skips_script_content() {
        let text = html_to_text("<p>keep</p><script>var x = 1;</script>").unwrap();
        assert_eq!(text, "keep");
    }

    #[test]
    fn decodes_common_entities() {
        let text = html_to_text("<p>a &amp; b&nbsp;&lt;c&gt;</p>").unwrap();
        assert_eq!(text, "a & b <c>");
    }

    #[test]
    fn plain_text_passes_through() {
        let text = html_to_text("just words").unwrap();
        assert_eq!(text, "just words");
    }
}
