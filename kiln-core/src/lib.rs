//! Kiln Core
//!
//! Core types for the Kiln build persistence layer.
//!
//! This crate contains:
//! - Domain types: Pipeline (read-side), Build, Stage and notification summaries
//! - Paths: the hierarchical key layout shared by every store-facing component

pub mod domain;
pub mod paths;
