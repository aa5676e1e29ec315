//! Header marker splitting.
//!
//! A rendered document may embed any number of header markers:
//!
//! ```html
//! <yamlheader start="1" end="4" sourceFile="a.md">uid: A</yamlheader>
//! <p>body of A</p>
//! <yamlheader start="6" end="8" sourceFile="a.md">uid: B</yamlheader>
//! ```
//!
//! Markers are found by tokenizing the HTML, so marker-like text inside an
//! entity-encoded YAML block never counts. Segment boundaries come from the
//! tokenizer's own byte offsets.

use std::borrow::Cow;
use std::ops::Range;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::entities::decode_entities;
use crate::error::SectionError;

/// Element name of a header marker.
pub const MARKER_TAG: &str = "yamlheader";

/// `sourceFile` value used when a marker does not declare one.
pub const UNKNOWN_SOURCE_FILE: &str = "NotFound";

/// Line number used when a marker does not declare one.
pub const UNKNOWN_LINE: i32 = -1;

/// A contiguous slice of one rendered document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment<'a> {
    /// First source line, 1-based, or [`UNKNOWN_LINE`].
    pub start_line: i32,
    /// Last source line, inclusive, or [`UNKNOWN_LINE`].
    pub end_line: i32,
    /// `sourceFile` of the marker. `None` for a marker-less document.
    pub source_file: Option<String>,
    /// HTML between this marker and the next one.
    pub html: &'a str,
    /// Entity-decoded metadata block. `None` for a marker-less document.
    pub metadata: Option<Cow<'a, str>>,
}

impl<'a> Segment<'a> {
    /// Segment covering a whole document that has no marker.
    #[must_use]
    pub fn whole(html: &'a str) -> Self {
        Self {
            start_line: UNKNOWN_LINE,
            end_line: UNKNOWN_LINE,
            source_file: None,
            html,
            metadata: None,
        }
    }

    /// Whether this segment was introduced by a header marker.
    #[must_use]
    pub fn has_marker(&self) -> bool {
        self.metadata.is_some()
    }
}

struct Marker {
    outer: Range<usize>,
    inner: Range<usize>,
    start_line: i32,
    end_line: i32,
    source_file: String,
}

/// Split rendered HTML at its header markers.
///
/// Returns one segment per marker, in document order. Content before the
/// first marker belongs to no segment. Without any marker the whole input is
/// returned as a single segment.
///
/// # Errors
///
/// Returns [`SectionError::UnterminatedMarker`] if a marker is never closed
/// and [`SectionError::Parse`] if the HTML cannot be tokenized.
pub fn split(html: &str) -> Result<Vec<Segment<'_>>, SectionError> {
    let markers = find_markers(html)?;
    if markers.is_empty() {
        return Ok(vec![Segment::whole(html)]);
    }

    let mut segments = Vec::with_capacity(markers.len());
    for (i, marker) in markers.iter().enumerate() {
        let body_end = markers.get(i + 1).map_or(html.len(), |next| next.outer.start);
        segments.push(Segment {
            start_line: marker.start_line,
            end_line: marker.end_line,
            source_file: Some(marker.source_file.clone()),
            html: &html[marker.outer.end..body_end],
            metadata: Some(decode_entities(&html[marker.inner.clone()])),
        });
    }
    Ok(segments)
}

fn find_markers(html: &str) -> Result<Vec<Marker>, SectionError> {
    let mut reader = html_reader(html);
    let mut markers = Vec::new();

    loop {
        let start = position(&reader);
        match reader.read_event() {
            Ok(Event::Start(e)) if is_marker(&e) => {
                let inner_start = position(&reader);
                let inner_end = skip_marker_body(&mut reader, start)?;
                markers.push(marker(&e, start..position(&reader), inner_start..inner_end));
            }
            Ok(Event::Empty(e)) if is_marker(&e) => {
                let end = position(&reader);
                markers.push(marker(&e, start..end, end..end));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(source) => return Err(parse_error(&reader, source)),
        }
    }

    Ok(markers)
}

/// Advance past the closing tag of a marker opened at `opened_at`.
///
/// Returns the offset where the closing tag begins.
fn skip_marker_body(reader: &mut Reader<&[u8]>, opened_at: usize) -> Result<usize, SectionError> {
    let mut depth = 1usize;
    loop {
        let before = position(reader);
        match reader.read_event() {
            Ok(Event::Start(e)) if is_marker(&e) => depth += 1,
            Ok(Event::End(e)) if e.name().as_ref().eq_ignore_ascii_case(MARKER_TAG.as_bytes()) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(before);
                }
            }
            Ok(Event::Eof) => return Err(SectionError::UnterminatedMarker { offset: opened_at }),
            Ok(_) => {}
            Err(source) => return Err(parse_error(reader, source)),
        }
    }
}

fn marker(e: &BytesStart<'_>, outer: Range<usize>, inner: Range<usize>) -> Marker {
    let mut start_line = UNKNOWN_LINE;
    let mut end_line = UNKNOWN_LINE;
    let mut source_file = UNKNOWN_SOURCE_FILE.to_owned();

    for attr in e.html_attributes().with_checks(false).flatten() {
        let Ok(raw) = std::str::from_utf8(&attr.value) else {
            continue;
        };
        let key = attr.key.as_ref();
        if key.eq_ignore_ascii_case(b"start") {
            start_line = parse_line(raw);
        } else if key.eq_ignore_ascii_case(b"end") {
            end_line = parse_line(raw);
        } else if key.eq_ignore_ascii_case(b"sourcefile") {
            source_file = decode_entities(raw).into_owned();
        }
    }

    Marker {
        outer,
        inner,
        start_line,
        end_line,
        source_file,
    }
}

fn parse_line(raw: &str) -> i32 {
    raw.trim().parse().unwrap_or(UNKNOWN_LINE)
}

pub(crate) fn is_marker(e: &BytesStart<'_>) -> bool {
    e.name().as_ref().eq_ignore_ascii_case(MARKER_TAG.as_bytes())
}

/// Tokenizer configured for lenient HTML: no end-name checks, stray closing
/// tags allowed, whitespace kept so offsets stay exact.
pub(crate) fn html_reader(html: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(html);
    let config = reader.config_mut();
    config.trim_text(false);
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    reader
}

pub(crate) fn position(reader: &Reader<&[u8]>) -> usize {
    usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX)
}

pub(crate) fn parse_error(reader: &Reader<&[u8]>, source: quick_xml::Error) -> SectionError {
    SectionError::Parse {
        offset: usize::try_from(reader.error_position()).unwrap_or(usize::MAX),
        source,
    }
}
