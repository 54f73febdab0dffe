//! Content-addressed blob store for layer images
//!
//! Every layer file added to the cache is stored under its SHA256, so
//! re-adding identical content never produces a second copy. Each layer keeps
//! a `current` symlink naming the blob that activations resolve to.
//!
//! # Invariants
//!
//! - Blob file names are the hex hash of their content
//! - Blobs are never modified in place (only replaced with `--override`)
//! - After a successful add, `current` resolves to an existing, verified blob
//! - Removing a blob by hash does not touch `current`

pub mod blob;
mod cache;

pub use blob::{hash_bytes, hash_file, layer_name, CURRENT_BLOB_NAME};
pub use cache::{AddOptions, AddStage, BlobInfo, BlobRef, LayerCache, LayerInfo, RemovedLayer};
