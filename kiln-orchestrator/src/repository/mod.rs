//! Repository Module
//!
//! Data access layer over the metadata store.
//! Each repository maps one domain entity onto its key subtree.

pub mod build;
pub mod codec;
pub mod pipeline;
pub mod stage;

pub use build as build_repository;
pub use codec::DecodeMode;
pub use pipeline as pipeline_repository;
pub use stage as stage_repository;
