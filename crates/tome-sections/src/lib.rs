//! Section processing for tome.
//!
//! Turns one rendered document into logical document records:
//!
//! 1. [`split`] cuts the HTML at its `<yamlheader>` markers into [`Segment`]s.
//! 2. [`validate`] parses each segment's YAML block and enforces required keys.
//! 3. [`resolve_links`] rewrites relative links and collects link targets.
//! 4. [`assemble`] builds a [`DocumentRecord`] from the pieces.
//!
//! Everything here is stateless and does no I/O.
//!
//! # Example
//!
//! ```
//! use tome_sections::{read_segment, split};
//!
//! let html = r#"<yamlheader start="1" end="3">uid: intro</yamlheader><p>Hello</p>"#;
//! let segments = split(html).unwrap();
//! let record = read_segment(&segments[0], "articles/intro.md", None).unwrap();
//! assert_eq!(record.uid, "intro");
//! assert_eq!(record.conceptual, "<p>Hello</p>");
//! ```

mod entities;
mod error;
mod header;
mod links;
mod path;
mod record;
mod split;

pub use entities::{decode_entities, escape_html};
pub use error::{HeaderError, SectionError};
pub use header::{DEFAULT_REQUIRED_KEYS, UID_KEY, ValidatedHeader, validate};
pub use links::{ANCHOR_ATTR, ResolvedLinks, XREF_TAG, resolve_links};
pub use path::{WORKING_FOLDER, is_relative_path, resolve_relative, url_decode, working_folder_path};
pub use record::{DocumentRecord, RepoInfo, SourceDetail, assemble, read_segment};
pub use split::{MARKER_TAG, Segment, UNKNOWN_LINE, UNKNOWN_SOURCE_FILE, split};
