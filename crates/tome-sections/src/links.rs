//! Relative link resolution.
//!
//! Walks every tag of a segment, rewrites `src`/`href` values that point at
//! known corpus files into working-folder form, and collects what the
//! segment links to. Tags that need no change are copied byte for byte.

use std::collections::{BTreeSet, HashSet};
use std::hash::BuildHasher;

use quick_xml::events::{BytesStart, Event};

use crate::entities::{decode_entities, escape_html};
use crate::error::SectionError;
use crate::path::{is_relative_path, resolve_relative, url_decode};
use crate::split::{html_reader, parse_error, position};

/// Element name of a cross-reference.
pub const XREF_TAG: &str = "xref";

/// Attribute receiving the fragment split off a rewritten `href`.
pub const ANCHOR_ATTR: &str = "anchor";

/// Output of [`resolve_links`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedLinks {
    /// Input HTML with resolvable links rewritten.
    pub html: String,
    /// URL-decoded working-folder paths of every relative link.
    pub linked_files: BTreeSet<String>,
    /// `href`/`uid` values of every cross-reference element.
    pub linked_uids: BTreeSet<String>,
}

/// Resolve relative links in `html` against `current_file`.
///
/// A relative `src` or `href` whose target (resolved against the directory
/// of `current_file`) is in `known_files` is rewritten to that target. For
/// `href`, a `#fragment` moves into an `anchor` attribute. Every resolvable
/// relative target is collected, known or not. Links that climb above the
/// corpus root are left alone.
///
/// # Arguments
///
/// * `html` - Segment HTML
/// * `current_file` - Corpus-relative path of the document
/// * `known_files` - Working-folder paths (`~/...`) of files in the corpus
///
/// # Errors
///
/// Returns [`SectionError::Parse`] if the HTML cannot be tokenized.
pub fn resolve_links<S: BuildHasher>(
    html: &str,
    current_file: &str,
    known_files: &HashSet<String, S>,
) -> Result<ResolvedLinks, SectionError> {
    let mut reader = html_reader(html);
    let mut resolved = ResolvedLinks {
        html: String::with_capacity(html.len()),
        ..ResolvedLinks::default()
    };
    let mut copied = 0;

    loop {
        let start = position(&reader);
        let (tag, empty) = match reader.read_event() {
            Ok(Event::Start(e)) => (e, false),
            Ok(Event::Empty(e)) => (e, true),
            Ok(Event::Eof) => break,
            Ok(_) => continue,
            Err(source) => return Err(parse_error(&reader, source)),
        };
        let end = position(&reader);

        if tag.name().as_ref().eq_ignore_ascii_case(XREF_TAG.as_bytes()) {
            collect_uids(&tag, &mut resolved.linked_uids);
            continue;
        }

        let mut context = TagContext {
            current_file,
            known_files,
            linked_files: &mut resolved.linked_files,
        };
        if let Some(rewritten) = context.rewrite(&tag, empty) {
            resolved.html.push_str(&html[copied..start]);
            resolved.html.push_str(&rewritten);
            copied = end;
        }
    }

    resolved.html.push_str(&html[copied..]);
    Ok(resolved)
}

struct TagContext<'a, S> {
    current_file: &'a str,
    known_files: &'a HashSet<String, S>,
    linked_files: &'a mut BTreeSet<String>,
}

impl<S: BuildHasher> TagContext<'_, S> {
    /// Collect the tag's links and return its new text if any value changed.
    ///
    /// Values are kept in their escaped form. Only rewritten values are
    /// re-escaped; every other value is copied from the source as written.
    fn rewrite(&mut self, tag: &BytesStart<'_>, empty: bool) -> Option<String> {
        let mut attrs: Vec<(String, String)> = Vec::new();
        let mut intact = true;
        let mut changed = false;
        let mut anchor = None;

        for attr in tag.html_attributes().with_checks(false) {
            let Ok(attr) = attr else {
                intact = false;
                continue;
            };
            let (Ok(key), Ok(raw)) = (
                std::str::from_utf8(attr.key.as_ref()),
                std::str::from_utf8(&attr.value),
            ) else {
                intact = false;
                continue;
            };
            let is_href = key.eq_ignore_ascii_case("href");
            if !is_href && !key.eq_ignore_ascii_case("src") {
                attrs.push((key.to_owned(), as_written(raw)));
                continue;
            }

            match self.resolve(&decode_entities(raw)) {
                Some((target, fragment)) => {
                    changed = true;
                    if is_href && fragment.is_some() {
                        anchor = fragment;
                    }
                    attrs.push((key.to_owned(), escape_html(&target).into_owned()));
                }
                None => attrs.push((key.to_owned(), as_written(raw))),
            }
        }

        if !intact || !changed {
            return None;
        }

        if let Some(anchor) = anchor {
            let anchor = escape_html(&anchor).into_owned();
            match attrs.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(ANCHOR_ATTR)) {
                Some((_, v)) => *v = anchor,
                None => attrs.push((ANCHOR_ATTR.to_owned(), anchor)),
            }
        }

        let name = std::str::from_utf8(tag.name().as_ref()).ok()?.to_owned();
        Some(serialize_tag(&name, &attrs, empty))
    }

    /// Record a link value and return its rewrite target when the file is
    /// known, along with any fragment split off it.
    fn resolve(&mut self, value: &str) -> Option<(String, Option<String>)> {
        let link = value.trim();
        if !is_relative_path(link) {
            return None;
        }
        let (path, fragment) = match link.find('#') {
            Some(index) => (&link[..index], Some(link[index..].to_owned())),
            None => (link, None),
        };

        let Some(target) = resolve_relative(self.current_file, path) else {
            tracing::debug!(link, file = self.current_file, "link climbs above the corpus root, skipped");
            return None;
        };
        let decoded = url_decode(&target).into_owned();
        let known = self.known_files.contains(&target) || self.known_files.contains(&decoded);
        self.linked_files.insert(decoded);

        known.then_some((target, fragment))
    }
}

fn collect_uids(tag: &BytesStart<'_>, uids: &mut BTreeSet<String>) {
    for attr in tag.html_attributes().with_checks(false).flatten() {
        let key = attr.key.as_ref();
        if !key.eq_ignore_ascii_case(b"href") && !key.eq_ignore_ascii_case(b"uid") {
            continue;
        }
        let Ok(raw) = std::str::from_utf8(&attr.value) else {
            continue;
        };
        let value = decode_entities(raw);
        if !value.trim().is_empty() {
            uids.insert(value.into_owned());
        }
    }
}

/// A raw attribute value ready to go between double quotes.
fn as_written(raw: &str) -> String {
    raw.replace('"', "&quot;")
}

/// Emit a tag whose attribute values are already escaped.
fn serialize_tag(name: &str, attrs: &[(String, String)], empty: bool) -> String {
    let mut out = String::with_capacity(name.len() + 2 + attrs.len() * 16);
    out.push('<');
    out.push_str(name);
    for (key, value) in attrs {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(value);
        out.push('"');
    }
    out.push_str(if empty { " />" } else { ">" });
    out
}
