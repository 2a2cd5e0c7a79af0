//! A transitive dependency resolver for Maven repositories: fetches POMs and artifacts from a
//!  remote repository, caches them locally, and mediates version conflicts in the resulting
//!  dependency graph.

pub mod cache;
pub mod maven;
pub mod resolve;
pub mod util;
