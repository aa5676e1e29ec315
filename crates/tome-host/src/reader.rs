//! Markdown readers.
//!
//! An overwrite file is a markdown file made of header sections, each
//! patching the document with the declared uid. A conceptual file is read
//! as-is and rendered later.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tome_sections::{
    DocumentRecord, Segment, SourceDetail, UNKNOWN_LINE, assemble, split, validate,
};

use crate::error::ReadError;
use crate::host::DocumentHost;
use crate::markup::MarkupResult;
use crate::model::{DocumentKind, FileModel};
use crate::provenance::ProvenanceSource;

/// A conceptual file ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptualDocument {
    /// Raw markdown.
    pub conceptual: String,
    /// Always [`DocumentKind::Conceptual`].
    #[serde(rename = "type")]
    pub kind: DocumentKind,
    /// Repository information of the file.
    pub source: SourceDetail,
    /// Corpus-relative path.
    pub path: String,
}

/// Turn rendered HTML into one record per header section.
///
/// Content before the first header, and a document without any header,
/// produce no record.
///
/// # Arguments
///
/// * `file_path` - Path of the source file, used for provenance and display
/// * `html` - Rendered document with header markers
/// * `provenance` - Repository lookup
/// * `required_keys` - Keys every header must declare
///
/// # Errors
///
/// Returns [`ReadError::Section`] if the HTML is structurally broken and
/// [`ReadError::Header`] for the first header that fails validation.
pub fn read_markdown_core(
    file_path: &Path,
    html: &str,
    provenance: &dyn ProvenanceSource,
    required_keys: &[&str],
) -> Result<Vec<DocumentRecord>, ReadError> {
    let segments = split(html).map_err(|source| ReadError::Section {
        file: display_path(file_path),
        source,
    })?;
    records(file_path, segments, provenance, required_keys)
}

/// Read a model's file as an overwrite document.
///
/// The file is rendered through the host, so a render failure degrades to
/// no records rather than an error. Links found in any section are added to
/// the model.
///
/// # Errors
///
/// Returns [`ReadError::Io`] if the file cannot be read and
/// [`ReadError::Header`] if a section header is invalid.
pub fn read_as_overwrite(
    host: &DocumentHost,
    model: &FileModel,
    provenance: &dyn ProvenanceSource,
) -> Result<Vec<DocumentRecord>, ReadError> {
    let file = model.file_and_type();
    let path = file.full_path();
    let markdown = fs::read_to_string(&path).map_err(|source| ReadError::Io {
        path: path.clone(),
        source,
    })?;

    let results = host.markup_multiple(&markdown, &file);
    for result in &results {
        model.add_links(&result.link_to_files, &result.link_to_uids);
    }

    let required_keys = host.required_keys();
    records(
        &path,
        results.iter().map(MarkupResult::as_segment),
        provenance,
        &required_keys,
    )
}

/// Read a markdown file as a conceptual document.
///
/// # Errors
///
/// Returns [`ReadError::Io`] if the file cannot be read.
pub fn read_as_conceptual(
    base_dir: &Path,
    file: &str,
    provenance: &dyn ProvenanceSource,
) -> Result<ConceptualDocument, ReadError> {
    let path = base_dir.join(file);
    let conceptual = fs::read_to_string(&path).map_err(|source| ReadError::Io {
        path: path.clone(),
        source,
    })?;

    Ok(ConceptualDocument {
        conceptual,
        kind: DocumentKind::Conceptual,
        source: SourceDetail {
            remote: provenance.resolve(&path),
            start_line: UNKNOWN_LINE,
            end_line: UNKNOWN_LINE,
            path: file.replace('\\', "/"),
        },
        path: file.replace('\\', "/"),
    })
}

fn records<'a>(
    file_path: &Path,
    segments: impl IntoIterator<Item = Segment<'a>>,
    provenance: &dyn ProvenanceSource,
    required_keys: &[&str],
) -> Result<Vec<DocumentRecord>, ReadError> {
    let display = display_path(file_path);
    let remote = provenance.resolve(file_path);
    let header_error = |source| ReadError::Header {
        file: display.clone(),
        source,
    };

    segments
        .into_iter()
        .filter(Segment::has_marker)
        .map(|segment| {
            let header =
                validate(segment.metadata.as_deref(), required_keys).map_err(header_error)?;
            assemble(&segment, header, &display, remote.clone()).map_err(header_error)
        })
        .collect()
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
