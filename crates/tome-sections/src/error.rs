//! Error types for section processing.

/// Structural problem in rendered HTML.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SectionError {
    /// A header marker was opened but never closed.
    #[error("header marker opened at byte {offset} is never closed")]
    UnterminatedMarker {
        /// Byte offset of the opening tag.
        offset: usize,
    },

    /// The HTML could not be tokenized.
    #[error("HTML parse error at byte {offset}")]
    Parse {
        /// Byte offset where the parser stopped.
        offset: usize,
        /// Underlying parser error.
        #[source]
        source: quick_xml::Error,
    },
}

/// Invalid or incomplete header metadata.
///
/// Both variants are hard failures for the document they belong to.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeaderError {
    /// The metadata block is not a YAML mapping.
    #[error("yaml header '{first_line}' is not in a valid YAML format: {message}")]
    MalformedMetadata {
        /// First line of the offending block, trimmed.
        first_line: String,
        /// Deserializer message.
        message: String,
    },

    /// One or more required keys are absent.
    #[error(
        "Required properties {{{{{}}}}} are not set. Note that keys are case insensitive.",
        .keys.join(",")
    )]
    MissingRequired {
        /// Missing keys in check order.
        keys: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_required_message() {
        let err = HeaderError::MissingRequired {
            keys: vec!["uid".to_owned(), "title".to_owned()],
        };
        assert_eq!(
            err.to_string(),
            "Required properties {{uid,title}} are not set. Note that keys are case insensitive."
        );
    }

    #[test]
    fn test_malformed_message() {
        let err = HeaderError::MalformedMetadata {
            first_line: "uid: [".to_owned(),
            message: "unexpected end".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "yaml header 'uid: [' is not in a valid YAML format: unexpected end"
        );
    }
}
