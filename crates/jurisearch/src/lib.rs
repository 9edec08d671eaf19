//! Public facade crate for `jurisearch`.
//!
//! This crate intentionally contains no IO or backend-specific logic.
//! It re-exports the backend-agnostic types/traits from `jurisearch-core`.

pub use jurisearch_core::*;
