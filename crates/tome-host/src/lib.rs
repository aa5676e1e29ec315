//! Document host for tome.
//!
//! Ties the section pipeline and the model cache together for one build
//! session:
//!
//! - [`DocumentHost`] holds the live [`FileModel`]s, answers uid lookups and
//!   runs markup through a [`MarkupService`], degrading to raw text when
//!   rendering fails.
//! - [`CmarkMarkupService`] renders markdown with pulldown-cmark and turns
//!   YAML header blocks into section markers.
//! - The readers in [`reader`] turn files into [`DocumentRecord`]s.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use tome_host::{
//!     CmarkMarkupService, DocumentHost, DocumentKind, FileAndType, FileModel, HostConfig,
//!     UidDefinition,
//! };
//!
//! let model = Arc::new(
//!     FileModel::new(FileAndType::new("docs", "api/a.md", DocumentKind::Overwrite))
//!         .with_uids([UidDefinition::new("A")]),
//! );
//! let host = DocumentHost::new(
//!     [Arc::clone(&model)],
//!     Arc::new(CmarkMarkupService::new()),
//!     HostConfig::default(),
//! );
//!
//! assert_eq!(host.lookup_by_uid("A").len(), 1);
//! host.update_uids(&model, Vec::new());
//! assert!(host.lookup_by_uid("A").is_empty());
//! ```

mod error;
mod host;
mod markdown;
mod markup;
mod model;
mod provenance;
pub mod reader;
mod uid_index;

pub use error::{MarkupError, ReadError};
pub use host::{DocumentHost, HostConfig};
pub use markdown::CmarkMarkupService;
pub use markup::{MarkupResult, MarkupService};
pub use model::{DocumentKind, FileAndType, FileModel, UidDefinition};
pub use provenance::{NoProvenance, ProvenanceSource};
pub use reader::{ConceptualDocument, read_as_conceptual, read_as_overwrite, read_markdown_core};
pub use tome_sections::{DocumentRecord, RepoInfo, SourceDetail};
