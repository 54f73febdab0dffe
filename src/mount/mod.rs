//! Mount composition of activated layers
//!
//! Two surfaces are managed here:
//!
//! - [`PathMount`] exposes the `bin` directory of every mounted extension at a
//!   single path (bind mount for one layer, overlay for several).
//! - [`StoreMount`] places the layered package store over the host store
//!   while keeping the host store reachable through a loopback bind.
//!
//! Both talk to the kernel through [`MountProvider`] so the sequencing can be
//! tested with a recording fake. Unlike the batch commands, any failure here
//! aborts the command at once.

mod attr;
mod path;
mod provider;
mod store;

pub use attr::{FileAttributes, IoctlAttributes};
pub use path::{discover_layers, PathMount};
pub use provider::{lowerdir_option, MountProvider, SyscallMounts};
pub use store::StoreMount;
