//! Merged `bin` path composed from every mounted extension layer

use super::MountProvider;
use crate::error::{BextError, BextResult};
use crate::store::blob::clean_path;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Find the `bin` directory of every layer under `extensions_mount`
///
/// Layers without a `bin` directory are skipped. The result is sorted by
/// layer name so overlay order is stable between runs.
pub fn discover_layers(extensions_mount: &Path) -> BextResult<Vec<PathBuf>> {
    let entries = match fs::read_dir(extensions_mount) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(BextError::io(
                format!("reading {}", extensions_mount.display()),
                e,
            ))
        }
    };

    let mut layers = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| BextError::io("reading extension mount entry", e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let bin = path.join("bin");
        if bin.is_dir() {
            layers.push(bin);
        } else {
            debug!(layer = %path.display(), "Skipping layer without bin directory");
        }
    }
    layers.sort();
    Ok(layers)
}

/// Mount plan for the merged executable path
#[derive(Debug, Clone)]
pub struct PathMount {
    pub extensions_mount: PathBuf,
    pub target: PathBuf,
}

impl PathMount {
    /// Plan a path mount; both paths are made absolute and normalized
    pub fn new(extensions_mount: &Path, target: &Path) -> BextResult<Self> {
        Ok(Self {
            extensions_mount: clean_path(extensions_mount)?,
            target: clean_path(target)?,
        })
    }

    /// Expose every layer's `bin` at the target path
    ///
    /// A single layer is bind mounted, several are stacked in a read-only
    /// overlay. Returns the layer directories that were mounted.
    pub fn mount(&self, mounts: &dyn MountProvider) -> BextResult<Vec<PathBuf>> {
        let layers = discover_layers(&self.extensions_mount)?;
        if layers.is_empty() {
            return Err(BextError::NoValidLayers(self.extensions_mount.clone()));
        }

        fs::create_dir_all(&self.target).map_err(|e| {
            BextError::io(format!("creating mount path {}", self.target.display()), e)
        })?;

        if let Err(e) = mounts.unmount(&self.target) {
            debug!(target = %self.target.display(), error = %e, "No stale mount to remove");
        }

        match layers.as_slice() {
            [single] => mounts.bind(single, &self.target, true)?,
            many => mounts.overlay(many, &self.target)?,
        }

        info!(
            target = %self.target.display(),
            layers = layers.len(),
            "Mounted merged path"
        );
        Ok(layers)
    }

    pub fn unmount(&self, mounts: &dyn MountProvider) -> BextResult<()> {
        mounts.unmount(&self.target)?;
        info!(target = %self.target.display(), "Unmounted merged path");
        Ok(())
    }
}
