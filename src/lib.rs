//! bext - layer manager for image-based systems
//!
//! Keeps a content-addressed cache of system extension layers, activates
//! them into the extension store and mounts the activated layers into the
//! running system.

pub mod activation;
pub mod batch;
pub mod build;
pub mod clean;
pub mod cli;
pub mod config;
pub mod error;
pub mod mount;
pub mod shell;
pub mod store;
pub mod ui;

pub use error::{BextError, BextResult};
