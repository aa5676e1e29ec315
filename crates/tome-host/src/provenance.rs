//! Source provenance lookup.

use std::path::Path;

use tome_sections::RepoInfo;

/// Resolves the repository a source file belongs to.
///
/// Implementations are expected to cache; the reader calls this once per
/// file.
pub trait ProvenanceSource: Send + Sync {
    /// Repository information for `path`, `None` if not under version control.
    fn resolve(&self, path: &Path) -> Option<RepoInfo>;
}

/// Provenance source for unversioned corpora.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProvenance;

impl ProvenanceSource for NoProvenance {
    fn resolve(&self, _path: &Path) -> Option<RepoInfo> {
        None
    }
}
