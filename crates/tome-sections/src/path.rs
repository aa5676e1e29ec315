//! Corpus path arithmetic.
//!
//! Corpus-relative paths use `/` separators. The canonical link target form
//! is the working-folder form `~/dir/file.md`, anchored at the corpus root.

use std::borrow::Cow;
use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use regex::Regex;

/// Prefix of the working-folder form.
pub const WORKING_FOLDER: &str = "~/";

static SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").expect("invalid scheme regex"));

/// Whether `value` is a link relative to the current document.
///
/// Rooted paths (`/`, `\`), working-folder paths (`~`), fragment-only
/// values and anything carrying a URL scheme are not relative.
pub fn is_relative_path(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() {
        return false;
    }
    if value.starts_with(['/', '\\', '~', '#']) {
        return false;
    }
    !SCHEME.is_match(value)
}

/// Normalize a corpus-relative file into working-folder form.
///
/// Returns `None` if the path climbs above the corpus root.
pub fn working_folder_path(file: &str) -> Option<String> {
    let file = strip_working_folder(file);
    let segments = normalize(std::iter::empty(), file)?;
    Some(format!("{WORKING_FOLDER}{}", segments.join("/")))
}

/// Resolve `link` against the directory of `current_file`.
///
/// Both inputs may use `\` or `/`. The result is in working-folder form, or
/// `None` when `..` segments climb above the corpus root.
///
/// # Arguments
///
/// * `current_file` - Corpus-relative path of the document holding the link
/// * `link` - Relative link target, without fragment
pub fn resolve_relative(current_file: &str, link: &str) -> Option<String> {
    let current = strip_working_folder(current_file);
    let mut dir: Vec<&str> = split_segments(current).collect();
    // Drop the file name, the link is relative to its directory
    dir.pop();
    let segments = normalize(dir.into_iter(), link)?;
    Some(format!("{WORKING_FOLDER}{}", segments.join("/")))
}

/// Percent-decode a link path. Invalid UTF-8 sequences are replaced.
pub fn url_decode(path: &str) -> Cow<'_, str> {
    percent_decode_str(path).decode_utf8_lossy()
}

fn strip_working_folder(path: &str) -> &str {
    path.strip_prefix("~/")
        .or_else(|| path.strip_prefix("~\\"))
        .unwrap_or(path)
}

fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['/', '\\']).filter(|s| !s.is_empty() && *s != ".")
}

fn normalize<'a>(base: impl Iterator<Item = &'a str>, path: &'a str) -> Option<Vec<&'a str>> {
    let mut segments: Vec<&str> = base.collect();
    for component in split_segments(path) {
        if component == ".." {
            segments.pop()?;
        } else {
            segments.push(component);
        }
    }
    Some(segments)
}
