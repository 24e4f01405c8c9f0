//! Error types for compression

/// Errors raised while configuring compression
#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    /// Pattern is not a valid regular expression
    #[error("invalid action id pattern '{pattern}': {source}")]
    InvalidPattern {
        /// Offending pattern
        pattern: String,
        /// Parse failure
        #[source]
        source: regex::Error,
    },

    /// Textual rule could not be parsed
    #[error("invalid compression rule '{rule}': expected {expected}")]
    InvalidRule {
        /// Offending rule
        rule: String,
        /// Expected shape
        expected: &'static str,
    },
}

impl CompressionError {
    /// Create an invalid rule error
    #[inline]
    #[must_use]
    pub fn invalid_rule(rule: impl Into<String>, expected: &'static str) -> Self {
        Self::InvalidRule {
            rule: rule.into(),
            expected,
        }
    }
}
