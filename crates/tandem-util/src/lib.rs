//! Shared utilities for the Tandem resolver.
//!
//! This crate provides cross-cutting concerns used by the other Tandem crates:
//! the unified error type and lexical path helpers for local sources.

pub mod errors;
pub mod fs;
