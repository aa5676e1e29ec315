//! Markup service seam and per-segment render results.

use std::borrow::Cow;
use std::collections::{BTreeSet, HashSet};

use tome_sections::{SectionError, Segment, UNKNOWN_LINE, resolve_links, split};

use crate::error::MarkupError;
use crate::model::FileAndType;

/// Renders source text to HTML.
///
/// Implementations must be a pure function of their inputs for a given
/// corpus snapshot. Header blocks are expected to come out as
/// `<yamlheader>` markers.
pub trait MarkupService: Send + Sync {
    /// Render `text` from `file` to HTML.
    ///
    /// # Errors
    ///
    /// Returns [`MarkupError`] if rendering fails. Partial output is never
    /// returned. A panic is caught by the host and degrades like an error.
    fn markup(&self, text: &str, file: &FileAndType) -> Result<String, MarkupError>;
}

/// One rendered, link-resolved segment of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupResult {
    /// Segment HTML with relative links rewritten.
    pub html: String,
    /// `sourceFile` of the marker, `None` without a marker.
    pub source_file: Option<String>,
    /// First source line or -1.
    pub start_line: i32,
    /// Last source line or -1.
    pub end_line: i32,
    /// Decoded header block, `None` without a marker.
    pub metadata: Option<String>,
    /// Working-folder paths linked from the segment.
    pub link_to_files: BTreeSet<String>,
    /// Uids cross-referenced from the segment.
    pub link_to_uids: BTreeSet<String>,
}

impl MarkupResult {
    /// Unrendered fallback holding `text` as its body.
    #[must_use]
    pub fn passthrough(text: &str) -> Self {
        Self {
            html: text.to_owned(),
            source_file: None,
            start_line: UNKNOWN_LINE,
            end_line: UNKNOWN_LINE,
            metadata: None,
            link_to_files: BTreeSet::new(),
            link_to_uids: BTreeSet::new(),
        }
    }

    /// Borrow this result as a splitter segment, for validation and assembly.
    #[must_use]
    pub fn as_segment(&self) -> Segment<'_> {
        Segment {
            start_line: self.start_line,
            end_line: self.end_line,
            source_file: self.source_file.clone(),
            html: &self.html,
            metadata: self.metadata.as_deref().map(Cow::Borrowed),
        }
    }
}

/// Split rendered HTML and resolve links in every segment.
pub(crate) fn parse_html(
    html: &str,
    file: &str,
    known_files: &HashSet<String>,
) -> Result<Vec<MarkupResult>, SectionError> {
    split(html)?
        .into_iter()
        .map(|segment| {
            let links = resolve_links(segment.html, file, known_files)?;
            Ok(MarkupResult {
                html: links.html,
                source_file: segment.source_file,
                start_line: segment.start_line,
                end_line: segment.end_line,
                metadata: segment.metadata.map(Cow::into_owned),
                link_to_files: links.linked_files,
                link_to_uids: links.linked_uids,
            })
        })
        .collect()
}
