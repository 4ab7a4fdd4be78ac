//! Suite construction
//!
//! Expands inputs into ordered script lists and recomputes rerun sets.

mod expand;
pub mod rerun;

pub use expand::{absolute, expand, Expansion, SuiteEntry};
