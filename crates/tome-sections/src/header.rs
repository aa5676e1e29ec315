//! Header metadata validation.
//!
//! A metadata block is YAML that must deserialize to a mapping. Required keys
//! are matched case-insensitively and promoted out of the public properties,
//! `uid` being the one every overwrite document needs.

use serde_json::{Map, Value};

use crate::error::HeaderError;

/// Metadata key naming a document's unique identifier.
pub const UID_KEY: &str = "uid";

/// Keys every header block must declare.
pub const DEFAULT_REQUIRED_KEYS: &[&str] = &[UID_KEY];

/// Result of validating one metadata block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedHeader {
    /// Metadata left after removing required keys, original casing kept.
    pub properties: Map<String, Value>,
    /// Value of the `uid` key, when present and required.
    pub uid: Option<String>,
    /// Removed required entries, keyed by the requested key name.
    pub promoted: Map<String, Value>,
}

/// Validate an entity-decoded metadata block.
///
/// `None` (no marker at all) is valid and yields empty properties with no
/// uid. A key counts as present only when its value is neither null nor an
/// empty string.
///
/// # Arguments
///
/// * `block` - Decoded YAML text of the marker, if any
/// * `required_keys` - Keys to enforce, compared case-insensitively
///
/// # Errors
///
/// Returns [`HeaderError::MalformedMetadata`] if the block is empty or not a
/// YAML mapping, and [`HeaderError::MissingRequired`] listing every absent
/// key.
pub fn validate(
    block: Option<&str>,
    required_keys: &[&str],
) -> Result<ValidatedHeader, HeaderError> {
    let Some(block) = block else {
        return Ok(ValidatedHeader::default());
    };

    let mut properties = parse_mapping(block)?;
    let required = dedup_ignore_case(required_keys);

    let missing: Vec<String> = required
        .iter()
        .filter(|key| !has_value(&properties, key))
        .map(|key| (*key).to_owned())
        .collect();
    if !missing.is_empty() {
        return Err(HeaderError::MissingRequired { keys: missing });
    }

    let mut promoted = Map::new();
    for key in &required {
        let matching: Vec<String> = properties
            .keys()
            .filter(|k| k.eq_ignore_ascii_case(key))
            .cloned()
            .collect();
        for k in matching {
            if let Some(value) = properties.remove(&k) {
                promoted.entry((*key).to_owned()).or_insert(value);
            }
        }
    }

    let uid = promoted
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(UID_KEY))
        .map(|(_, v)| scalar_to_string(v));

    Ok(ValidatedHeader {
        properties,
        uid,
        promoted,
    })
}

fn parse_mapping(block: &str) -> Result<Map<String, Value>, HeaderError> {
    if block.trim().is_empty() {
        return Err(malformed(block, "metadata block is empty"));
    }
    match serde_yaml::from_str::<Value>(block) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(malformed(block, "expected a mapping")),
        Err(e) => Err(malformed(block, &e.to_string())),
    }
}

fn malformed(block: &str, message: &str) -> HeaderError {
    HeaderError::MalformedMetadata {
        first_line: block.lines().next().unwrap_or_default().trim().to_owned(),
        message: message.to_owned(),
    }
}

fn dedup_ignore_case<'k>(keys: &[&'k str]) -> Vec<&'k str> {
    let mut seen: Vec<&str> = Vec::with_capacity(keys.len());
    for key in keys {
        if !seen.iter().any(|s| s.eq_ignore_ascii_case(key)) {
            seen.push(*key);
        }
    }
    seen
}

fn has_value(properties: &Map<String, Value>, key: &str) -> bool {
    properties.iter().any(|(k, v)| {
        k.eq_ignore_ascii_case(key)
            && match v {
                Value::Null => false,
                Value::String(s) => !s.is_empty(),
                _ => true,
            }
    })
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
