//! Core data types for the Tandem resolver.
//!
//! This crate defines the constraint model shared by the resolver: package
//! identifiers scoped to the registry or the opam index, the two version
//! schemes, relational ranges over either scheme, dependency specs
//! (versions, ranges, `link:` and `path:` sources), manifests, resolver
//! configuration and the exported lockfile.
//!
//! This crate is intentionally free of async code and network I/O.

pub mod config;
pub mod lockfile;
pub mod manifest;
pub mod package;
pub mod range;
pub mod spec;
pub mod version;
