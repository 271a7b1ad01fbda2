//! Test support utilities for the page-cache workspace.
//!
//! Provides:
//! - Isolated test contexts with temporary storage and staging directories
//! - Patterned backing-file fixtures with a byte oracle for read assertions
//! - Property-based generators for request shapes
//!
//! # Example Usage
//!
//! ```no_run
//! use testsupport::prelude::*;
//!
//! let ctx = CacheContext::new().unwrap();
//! let path = ctx.patterned_file("data", 2 * 1024 * 1024).unwrap();
//! let mut engine = ctx.single_shard_engine(2).unwrap();
//!
//! let mut fh = open_rw(&path).unwrap();
//! let bytes = engine.read(&path, 10, 0, &mut fh).unwrap();
//! assert_eq!(bytes, pattern_at(0, 10));
//! ```

pub mod context;
pub mod fixtures;
pub mod proptest_generators;

/// Convenient re-exports for common testing patterns.
pub mod prelude {
    pub use crate::context::*;
    pub use crate::fixtures::*;
}
