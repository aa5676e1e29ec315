//! Logical document records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::HeaderError;
use crate::header::{DEFAULT_REQUIRED_KEYS, ValidatedHeader, validate};
use crate::split::Segment;

/// Repository location of a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    /// Remote repository URL.
    pub repo: String,
    /// Branch the file was read from.
    pub branch: String,
    /// Path of the file inside the repository.
    pub path: String,
}

/// Where a document came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDetail {
    /// Repository information, when the file is under version control.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RepoInfo>,
    /// First source line, or -1.
    pub start_line: i32,
    /// Last source line, or -1.
    pub end_line: i32,
    /// Display path of the source file.
    pub path: String,
}

/// One addressable logical document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Unique identifier, never empty.
    pub uid: String,
    /// Header metadata with required keys removed.
    pub metadata: Map<String, Value>,
    /// Rendered body of the segment.
    pub conceptual: String,
    /// Source attribution.
    pub documentation: SourceDetail,
}

/// Combine a segment and its validated header into a record.
///
/// # Errors
///
/// Returns [`HeaderError::MissingRequired`] if the header carries no uid,
/// which is the case for a segment without a marker.
pub fn assemble(
    segment: &Segment<'_>,
    header: ValidatedHeader,
    source_path: &str,
    remote: Option<RepoInfo>,
) -> Result<DocumentRecord, HeaderError> {
    let Some(uid) = header.uid.filter(|uid| !uid.is_empty()) else {
        return Err(HeaderError::MissingRequired {
            keys: vec![crate::header::UID_KEY.to_owned()],
        });
    };

    Ok(DocumentRecord {
        uid,
        metadata: header.properties,
        conceptual: segment.html.to_owned(),
        documentation: SourceDetail {
            remote,
            start_line: segment.start_line,
            end_line: segment.end_line,
            path: source_path.to_owned(),
        },
    })
}

/// Validate a segment's header and assemble it in one step.
///
/// # Errors
///
/// Propagates any [`HeaderError`] from validation or assembly.
pub fn read_segment(
    segment: &Segment<'_>,
    source_path: &str,
    remote: Option<RepoInfo>,
) -> Result<DocumentRecord, HeaderError> {
    let header = validate(segment.metadata.as_deref(), DEFAULT_REQUIRED_KEYS)?;
    assemble(segment, header, source_path, remote)
}
