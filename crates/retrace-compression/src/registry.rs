//! Compressor registry
//!
//! Provides [`CompressorRegistry`], which maps action-id patterns to
//! compressors and applies them in registration order.

use crate::compressor::{compress, Compressor};
use crate::error::CompressionError;
use regex::Regex;
use retrace_model::ActionNode;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Entry {
    pattern: String,
    matcher: Regex,
    compressor: Arc<dyn Compressor>,
}

/// Registry of compressors keyed by action-id pattern
///
/// Patterns are regular expressions matched against the whole `f_id`, so
/// `"(addScore|removeScore)"` matches exactly those two ids.
#[derive(Debug, Default, Clone)]
pub struct CompressorRegistry {
    entries: Vec<Entry>,
}

impl CompressorRegistry {
    /// Create new empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a compressor for all `f_id`s matching `pattern`
    ///
    /// # Errors
    /// Returns error if `pattern` is not a valid regular expression
    pub fn register<C>(&mut self, pattern: &str, compressor: C) -> Result<(), CompressionError>
    where
        C: Compressor + 'static,
    {
        let matcher = Regex::new(&format!("^(?:{pattern})$")).map_err(|source| CompressionError::InvalidPattern {
            pattern: pattern.to_owned(),
            source,
        })?;
        self.entries.push(Entry {
            pattern: pattern.to_owned(),
            matcher,
            compressor: Arc::new(compressor),
        });
        Ok(())
    }

    /// Builder-style [`register`](Self::register)
    ///
    /// # Errors
    /// Returns error if `pattern` is not a valid regular expression
    pub fn with<C>(mut self, pattern: &str, compressor: C) -> Result<Self, CompressionError>
    where
        C: Compressor + 'static,
    {
        self.register(pattern, compressor)?;
        Ok(self)
    }

    /// True if some registered pattern matches `f_id`
    #[must_use]
    pub fn matches(&self, f_id: &str) -> bool {
        self.entries.iter().any(|e| e.matcher.is_match(f_id))
    }

    /// Registered patterns in registration order
    #[must_use]
    pub fn patterns(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.pattern.as_str()).collect()
    }

    /// Number of registered compressors
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compress a copy of `path` with every compressor whose pattern matches
    /// at least one action in it
    #[must_use]
    pub fn compress(&self, path: &[ActionNode]) -> Vec<ActionNode> {
        self.entries.iter().fold(path.to_vec(), |acc, e| {
            compress(&acc, &e.matcher, e.compressor.as_ref())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{CancelPair, LastOnly};
    use crate::testing::{action, ids, view};
    use serde_json::json;

    #[test]
    fn invalid_pattern_is_rejected() {
        let mut reg = CompressorRegistry::new();
        let err = reg.register("(unclosed", CancelPair::new("a", "b")).unwrap_err();
        assert!(matches!(err, CompressionError::InvalidPattern { .. }));
        assert!(reg.is_empty());
    }

    #[test]
    fn patterns_match_whole_id() {
        let reg = CompressorRegistry::new()
            .with("setParameter", LastOnly::per_parameter("setParameter", "name"))
            .unwrap();
        assert!(reg.matches("setParameter"));
        assert!(!reg.matches("tdpSetParameter"));
        assert!(!reg.matches("setParameterOld"));
    }

    #[test]
    fn applies_in_registration_order() {
        let v = view(1);
        let reg = CompressorRegistry::new()
            .with("setParameter", LastOnly::per_parameter("setParameter", "name"))
            .unwrap()
            .with("(addScore|removeScore)", CancelPair::new("addScore", "removeScore"))
            .unwrap();
        assert_eq!(reg.patterns(), vec!["setParameter", "(addScore|removeScore)"]);

        let path = vec![
            action(1, "setParameter", &[&v], json!({"name": "x", "value": 1})),
            action(2, "addScore", &[], json!({"id": 1})),
            action(3, "setParameter", &[&v], json!({"name": "x", "value": 2})),
            action(4, "removeScore", &[], json!({"id": 1})),
        ];
        let out = reg.compress(&path);
        assert_eq!(ids(&out), vec![3]);
        // Input untouched
        assert_eq!(path.len(), 4);
    }

    #[test]
    fn unmatched_path_is_copied() {
        let reg = CompressorRegistry::new()
            .with("setParameter", LastOnly::per_parameter("setParameter", "name"))
            .unwrap();
        let path = vec![action(1, "other", &[], json!({})), action(2, "other", &[], json!({}))];
        assert_eq!(ids(&reg.compress(&path)), vec![1, 2]);
    }
}
