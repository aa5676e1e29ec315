//! Markdown markup service backed by pulldown-cmark.
//!
//! YAML header blocks fenced by `---` lines become `<yamlheader>` markers; the
//! markdown between them is rendered chunk by chunk. A `---` line opens a
//! header only at the start of the document, after a blank line or directly
//! after another header, and only if the fenced text is a non-empty YAML
//! mapping. Anything else (a setext underline, a thematic break) stays
//! markdown.

use std::fmt::Write;

use pulldown_cmark::{Options, Parser, html};
use tome_sections::{MARKER_TAG, escape_html};

use crate::error::MarkupError;
use crate::markup::MarkupService;
use crate::model::FileAndType;

const HEADER_FENCE: &str = "---";

/// [`MarkupService`] rendering CommonMark with GFM tables, strikethrough and
/// task lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct CmarkMarkupService;

impl CmarkMarkupService {
    /// Create the service.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn parser_options() -> Options {
        Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS
    }

    fn render_markdown(out: &mut String, lines: &[&str]) {
        if lines.is_empty() {
            return;
        }
        let text = lines.concat();
        html::push_html(out, Parser::new_ext(&text, Self::parser_options()));
    }
}

impl MarkupService for CmarkMarkupService {
    fn markup(&self, text: &str, file: &FileAndType) -> Result<String, MarkupError> {
        let lines: Vec<&str> = text.split_inclusive('\n').collect();
        let mut out = String::with_capacity(text.len() + text.len() / 4);
        let mut chunk_start = 0;
        let mut fence: Option<(u8, usize)> = None;
        let mut header_allowed = true;
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i].trim_end();

            if let Some(open) = fence {
                if closes_fence(line, open) {
                    fence = None;
                }
                header_allowed = false;
                i += 1;
                continue;
            }
            if let Some(open) = code_fence(line) {
                fence = Some(open);
                header_allowed = false;
                i += 1;
                continue;
            }

            if header_allowed
                && line == HEADER_FENCE
                && let Some(close) = header_end(&lines, i)
            {
                let yaml = lines[i + 1..close].concat();
                Self::render_markdown(&mut out, &lines[chunk_start..i]);
                let _ = write!(
                    out,
                    "<{MARKER_TAG} start=\"{}\" end=\"{}\" sourceFile=\"{}\">{}</{MARKER_TAG}>",
                    i + 1,
                    close + 1,
                    escape_html(&file.file),
                    escape_html(&yaml),
                );
                i = close + 1;
                chunk_start = i;
                continue;
            }

            header_allowed = line.is_empty();
            i += 1;
        }

        Self::render_markdown(&mut out, &lines[chunk_start..]);
        Ok(out)
    }
}

/// Index of the `---` line closing a header opened at `open`, if the fenced
/// text is a non-empty YAML mapping.
fn header_end(lines: &[&str], open: usize) -> Option<usize> {
    let close = lines
        .iter()
        .enumerate()
        .skip(open + 1)
        .find(|(_, line)| line.trim_end() == HEADER_FENCE)
        .map(|(index, _)| index)?;
    let yaml = lines[open + 1..close].concat();
    match serde_yaml::from_str::<serde_yaml::Value>(&yaml) {
        Ok(serde_yaml::Value::Mapping(map)) if !map.is_empty() => Some(close),
        _ => None,
    }
}

/// Fence character and run length of a code fence opener.
fn code_fence(line: &str) -> Option<(u8, usize)> {
    let body = line.trim_start_matches(' ');
    if line.len() - body.len() > 3 {
        return None;
    }
    let marker = *body.as_bytes().first()?;
    if marker != b'`' && marker != b'~' {
        return None;
    }
    let run = body.bytes().take_while(|&b| b == marker).count();
    (run >= 3).then_some((marker, run))
}

fn closes_fence(line: &str, (marker, run): (u8, usize)) -> bool {
    match code_fence(line) {
        Some((m, n)) if m == marker && n >= run => {
            line.trim_start_matches(' ')[n..].trim().is_empty()
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::DocumentKind;

    fn render(text: &str) -> String {
        let file = FileAndType::new("/c", "a.md", DocumentKind::Overwrite);
        CmarkMarkupService::new().markup(text, &file).unwrap()
    }

    #[test]
    fn test_plain_markdown() {
        assert_eq!(render("Hello *world*\n"), "<p>Hello <em>world</em></p>\n");
    }

    #[test]
    fn test_header_becomes_marker() {
        let html = render("---\nuid: A\ntitle: \"x<y\"\n---\nhello\n");
        assert_eq!(
            html,
            concat!(
                r#"<yamlheader start="1" end="4" sourceFile="a.md">uid: A"#,
                "\ntitle: &quot;x&lt;y&quot;\n</yamlheader><p>hello</p>\n"
            )
        );
    }

    #[test]
    fn test_header_after_blank_line() {
        let html = render("---\nuid: A\n---\nbody\n\n---\nuid: B\n---\n");
        assert_eq!(html.matches("<yamlheader").count(), 2);
        assert!(html.contains(r#"start="6" end="8""#));
        assert!(html.ends_with("</yamlheader>"));
    }

    #[test]
    fn test_setext_underline_is_not_header() {
        let html = render("---\nuid: A\n---\nText\n---\nuid: B\n---\n");
        assert_eq!(html.matches("<yamlheader").count(), 1);
        assert!(html.ends_with("<h2>Text</h2>\n<h2>uid: B</h2>\n"));
    }

    #[test]
    fn test_non_mapping_block_stays_markdown() {
        let html = render("---\njust text\n---\n");
        assert!(!html.contains("<yamlheader"));
    }

    #[test]
    fn test_header_inside_code_fence_ignored() {
        let html = render("```\n---\nuid: A\n---\n```\n");
        assert!(!html.contains("<yamlheader"));
        assert!(html.contains("<pre><code>"));
    }

    #[test]
    fn test_unclosed_header_stays_markdown() {
        let html = render("---\nuid: A\n");
        assert!(!html.contains("<yamlheader"));
        assert!(html.contains("<hr />"));
    }

    #[test]
    fn test_code_fence_detection() {
        assert_eq!(code_fence("```rust"), Some((b'`', 3)));
        assert_eq!(code_fence("  ~~~~"), Some((b'~', 4)));
        assert_eq!(code_fence("    ```"), None);
        assert_eq!(code_fence("``"), None);
        assert!(closes_fence("````", (b'`', 3)));
        assert!(!closes_fence("```rust", (b'`', 3)));
        assert!(!closes_fence("~~~", (b'`', 3)));
    }
}
