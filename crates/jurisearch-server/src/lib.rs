//! `jurisearch-server` crate (library surface).
//!
//! The primary entrypoint for end users is the `jurisearch` binary (CLI +
//! HTTP service). This library module exists so contract tests and embedders
//! can build the router and configuration without going through the binary.

pub mod config;
pub mod http;

pub use jurisearch_core as core;
