//! Retrace Compression
//!
//! Reduces a linear action path to a smaller one with the same net effect.
//! Intermediate states of the input are not recoverable from the output.
//!
//! # Core Concepts
//!
//! - [`Compressor`]: trait for pluggable path reduction
//! - [`LastOnly`] / [`LastConsecutive`]: keep the last of repeated actions
//! - [`CancelPair`]: drop add/remove pairs with matching parameters
//! - [`CreateRemove`]: drop object lifetimes that start and end in the path
//! - [`CompressorRegistry`]: pattern-keyed compressors applied in order
//!
//! Compression never mutates the graph it came from. It works on copies of
//! [`ActionNode`](retrace_model::ActionNode)s.
//!
//! # Example
//!
//! ```rust
//! use retrace_compression::{CancelPair, CompressorRegistry, LastOnly};
//!
//! let registry = CompressorRegistry::new()
//!     .with("setParameter", LastOnly::per_parameter("setParameter", "name"))?
//!     .with("(addScore|removeScore)", CancelPair::new("addScore", "removeScore"))?;
//! assert_eq!(registry.len(), 2);
//! # Ok::<(), retrace_compression::CompressionError>(())
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod compressor;
mod error;
pub mod keys;
mod primitives;
mod registry;

#[cfg(test)]
mod testing;

// Re-exports
pub use compressor::{compress, CompressFn, Compressor, FnCompressor};
pub use error::CompressionError;
pub use keys::KeyFn;
pub use primitives::{
    cancel_pair, create_remove, last_consecutive, last_only, CancelPair, CreateRemove, LastConsecutive, LastOnly,
};
pub use registry::CompressorRegistry;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
