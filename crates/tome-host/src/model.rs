//! Document models tracked by the host.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// Closed set of document kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    /// Markdown article.
    Conceptual,
    /// Markdown file whose sections patch other documents by uid.
    Overwrite,
    /// Generated API reference page.
    ManagedReference,
    /// Static file copied as-is.
    Resource,
    /// Table of contents.
    Toc,
}

/// A source file inside a base directory, tagged with its kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileAndType {
    /// Directory the corpus lives in.
    pub base_dir: PathBuf,
    /// Corpus-relative path with `/` separators.
    pub file: String,
    /// Document kind.
    pub kind: DocumentKind,
}

impl FileAndType {
    /// Create a file identity, normalizing `\` separators to `/`.
    pub fn new(base_dir: impl Into<PathBuf>, file: impl Into<String>, kind: DocumentKind) -> Self {
        Self {
            base_dir: base_dir.into(),
            file: file.into().replace('\\', "/"),
            kind,
        }
    }

    /// Absolute (or base-relative) path on disk.
    #[must_use]
    pub fn full_path(&self) -> PathBuf {
        self.base_dir.join(&self.file)
    }

    /// Working-folder form `~/path`, used as a link target.
    ///
    /// `None` if the file climbs above its base directory.
    #[must_use]
    pub fn working_folder_path(&self) -> Option<String> {
        tome_sections::working_folder_path(&self.file)
    }
}

/// A uid declared by a model, with the line that declares it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UidDefinition {
    /// The uid.
    pub name: String,
    /// 1-based declaring line, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl UidDefinition {
    /// Uid without line information.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            line: None,
        }
    }
}

/// A document tracked by [`DocumentHost`](crate::DocumentHost).
///
/// The key is the original corpus-relative file and never changes during a
/// session. Everything else may change; each mutator returns the previous
/// value so the caller can pass it to the matching `notify_*` method.
#[derive(Debug)]
pub struct FileModel {
    key: String,
    original: FileAndType,
    file: RwLock<FileAndType>,
    uids: RwLock<Vec<UidDefinition>>,
    link_to_files: RwLock<BTreeSet<String>>,
    link_to_uids: RwLock<BTreeSet<String>>,
}

impl FileModel {
    /// Create a model for `file` with no uids.
    #[must_use]
    pub fn new(file: FileAndType) -> Self {
        Self {
            key: file.file.clone(),
            original: file.clone(),
            file: RwLock::new(file),
            uids: RwLock::new(Vec::new()),
            link_to_files: RwLock::new(BTreeSet::new()),
            link_to_uids: RwLock::new(BTreeSet::new()),
        }
    }

    /// Builder-style initial uids.
    #[must_use]
    pub fn with_uids(self, uids: impl IntoIterator<Item = UidDefinition>) -> Self {
        *self.uids.write().unwrap_or_else(PoisonError::into_inner) = uids.into_iter().collect();
        self
    }

    /// Stable identity of this model.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Kind of the original file.
    #[must_use]
    pub fn kind(&self) -> DocumentKind {
        self.original.kind
    }

    /// File identity at load time.
    #[must_use]
    pub fn original_file_and_type(&self) -> &FileAndType {
        &self.original
    }

    /// Current file identity.
    #[must_use]
    pub fn file_and_type(&self) -> FileAndType {
        self.file.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Retarget the model, returning the previous identity.
    pub fn set_file_and_type(&self, file: FileAndType) -> FileAndType {
        let mut guard = self.file.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, file)
    }

    /// Declared uids.
    #[must_use]
    pub fn uids(&self) -> Vec<UidDefinition> {
        self.uids.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replace declared uids, returning the previous ones.
    pub fn set_uids(&self, uids: Vec<UidDefinition>) -> Vec<UidDefinition> {
        let mut guard = self.uids.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, uids)
    }

    /// Working-folder paths this model links to.
    #[must_use]
    pub fn link_to_files(&self) -> BTreeSet<String> {
        self.link_to_files.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Uids this model cross-references.
    #[must_use]
    pub fn link_to_uids(&self) -> BTreeSet<String> {
        self.link_to_uids.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Union new link targets into the model.
    pub fn add_links<'a>(
        &self,
        files: impl IntoIterator<Item = &'a String>,
        uids: impl IntoIterator<Item = &'a String>,
    ) {
        self.link_to_files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(files.into_iter().cloned());
        self.link_to_uids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(uids.into_iter().cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_and_type_paths() {
        let file = FileAndType::new("/corpus", "articles\\intro.md", DocumentKind::Conceptual);
        assert_eq!(file.file, "articles/intro.md");
        assert_eq!(file.full_path(), PathBuf::from("/corpus/articles/intro.md"));
        assert_eq!(file.working_folder_path().as_deref(), Some("~/articles/intro.md"));
    }

    #[test]
    fn test_mutators_return_previous() {
        let model = FileModel::new(FileAndType::new("/c", "a.md", DocumentKind::Conceptual))
            .with_uids([UidDefinition::new("A")]);

        let old = model.set_uids(vec![UidDefinition::new("B")]);
        assert_eq!(old, vec![UidDefinition::new("A")]);
        assert_eq!(model.uids(), vec![UidDefinition::new("B")]);

        let moved = FileAndType::new("/c", "moved/a.md", DocumentKind::Conceptual);
        let old = model.set_file_and_type(moved.clone());
        assert_eq!(old.file, "a.md");
        assert_eq!(model.file_and_type(), moved);
        assert_eq!(model.key(), "a.md");
        assert_eq!(model.original_file_and_type().file, "a.md");
    }

    #[test]
    fn test_add_links_unions() {
        let model = FileModel::new(FileAndType::new("/c", "a.md", DocumentKind::Overwrite));
        let files = vec!["~/b.md".to_owned()];
        let uids = vec!["X".to_owned()];
        model.add_links(&files, &uids);
        model.add_links(&files, &["Y".to_owned()]);

        assert_eq!(model.link_to_files().len(), 1);
        assert_eq!(
            model.link_to_uids().into_iter().collect::<Vec<_>>(),
            vec!["X", "Y"]
        );
        assert_eq!(model.kind(), DocumentKind::Overwrite);
    }
}
