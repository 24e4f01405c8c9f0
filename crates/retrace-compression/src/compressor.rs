//! Compressor trait
//!
//! Provides the [`Compressor`] trait for pluggable path reduction, and the
//! pattern-gated [`compress`] entry point.

use regex::Regex;
use retrace_model::ActionNode;
use std::fmt;
use std::sync::Arc;

/// Reduces a linear action path
///
/// Implementations receive an owned copy of the path and return the
/// surviving actions in their original relative order. They must never
/// reorder or invent actions.
pub trait Compressor: Send + Sync + fmt::Debug {
    /// Compress the path
    fn compress(&self, path: Vec<ActionNode>) -> Vec<ActionNode>;

    /// Compressor name (for debugging/logging)
    fn name(&self) -> &str;
}

impl<C: Compressor + ?Sized> Compressor for Arc<C> {
    fn compress(&self, path: Vec<ActionNode>) -> Vec<ActionNode> {
        (**self).compress(path)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<C: Compressor + ?Sized> Compressor for Box<C> {
    fn compress(&self, path: Vec<ActionNode>) -> Vec<ActionNode> {
        (**self).compress(path)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Signature of closure-backed compressors
pub type CompressFn = Arc<dyn Fn(Vec<ActionNode>) -> Vec<ActionNode> + Send + Sync>;

/// Compressor backed by a closure
#[derive(Clone)]
pub struct FnCompressor {
    name: String,
    f: CompressFn,
}

impl FnCompressor {
    /// Wrap a closure
    #[must_use]
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<ActionNode>) -> Vec<ActionNode> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }
}

impl fmt::Debug for FnCompressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCompressor").field("name", &self.name).finish_non_exhaustive()
    }
}

impl Compressor for FnCompressor {
    fn compress(&self, path: Vec<ActionNode>) -> Vec<ActionNode> {
        (self.f)(path)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Apply `reducer` to a copy of `path` if the `f_id` of any action in it
/// matches `pattern`. The caller's path is never touched.
#[must_use]
pub fn compress(path: &[ActionNode], pattern: &Regex, reducer: &dyn Compressor) -> Vec<ActionNode> {
    if !path.iter().any(|a| pattern.is_match(a.f_id())) {
        return path.to_vec();
    }
    let before = path.len();
    let out = reducer.compress(path.to_vec());
    tracing::debug!(
        compressor = reducer.name(),
        before,
        after = out.len(),
        "compressed action path"
    );
    out
}
