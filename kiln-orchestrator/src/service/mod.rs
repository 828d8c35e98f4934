//! Service Module
//!
//! Business logic over the repositories: build persistence with stage
//! materialization, and build notification.

pub mod build;
pub mod materialize;
pub mod notify;

pub use build::BuildService;
pub use notify::NotifyService;
