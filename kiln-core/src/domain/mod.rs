//! Core domain types
//!
//! These types are shared between the repositories (which persist them field by
//! field) and the services (which materialize, delete and report on them).

pub mod build;
pub mod notification;
pub mod pipeline;
pub mod stage;
pub mod vars;
