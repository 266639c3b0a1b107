//! # huddle-common
//!
//! Shared configuration, error handling, identity checks and validation used
//! across all Huddle crates. No signaling logic lives here.

pub mod auth;
pub mod config;
pub mod error;
pub mod validation;

pub use error::{HuddleError, HuddleResult};
