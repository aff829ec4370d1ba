//! Dependency resolution engine: concurrent request-graph discovery over the
//! registry and opam index, a lazily populated candidate index, a backtracking
//! solver and the diagnostics it produces when no solution exists.

pub mod graph;
pub mod index;
pub mod registry;
pub mod report;
pub mod resolver;
pub mod solution;
pub mod solver;

pub use report::Report;
pub use resolver::{resolve, ResolveError};
pub use solution::Solution;
