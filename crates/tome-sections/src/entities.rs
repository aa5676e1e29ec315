//! HTML entity decoding and escaping.
//!
//! Markers carry their YAML block entity-encoded, and attribute values read
//! straight from the source text are still escaped. Decoding covers numeric
//! references plus the named entities markdown renderers actually emit;
//! unknown names are left untouched.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

static ENTITY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z][a-zA-Z0-9]{1,31});")
        .expect("invalid entity regex")
});

/// Replace entity references with the characters they stand for.
///
/// Borrows the input when it contains no `&`.
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    ENTITY_PATTERN.replace_all(text, |caps: &regex::Captures| {
        let body = &caps[1];
        let decoded = match body.strip_prefix('#') {
            Some(num) => numeric_reference(num).map(String::from),
            None => named_entity(body).map(str::to_owned),
        };
        decoded.unwrap_or_else(|| caps[0].to_owned())
    })
}

/// Escape text for use inside an element body or a double-quoted attribute.
pub fn escape_html(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"']) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn numeric_reference(num: &str) -> Option<char> {
    let code = match num.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => num.parse().ok()?,
    };
    char::from_u32(code).filter(|c| *c != '\0')
}

fn named_entity(name: &str) -> Option<&'static str> {
    Some(match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => "\u{00a0}",
        "mdash" => "\u{2014}",
        "ndash" => "\u{2013}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "hellip" => "\u{2026}",
        "copy" => "\u{00a9}",
        "reg" => "\u{00ae}",
        "trade" => "\u{2122}",
        "laquo" => "\u{00ab}",
        "raquo" => "\u{00bb}",
        _ => return None,
    })
}
