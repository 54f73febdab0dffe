//! Activation links in the system extension store
//!
//! A layer is active when `<extensions_dir>/<layer>.raw` exists. For cached
//! layers the link points at the layer's `current` pointer, so re-adding a
//! layer updates the activated version without touching the link. File
//! activations link straight to an image outside the cache.

use crate::config::SYSEXT_EXTENSION;
use crate::error::{BextError, BextResult};
use crate::store::{blob, LayerCache};
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The directory systemd-sysext scans for extension images
#[derive(Debug, Clone)]
pub struct ExtensionStore {
    dir: PathBuf,
}

impl ExtensionStore {
    /// Refer to an extension store without touching the filesystem
    pub fn new(dir: &Path) -> BextResult<Self> {
        Ok(Self {
            dir: blob::clean_path(dir)?,
        })
    }

    /// Refer to an extension store, creating the directory if needed
    pub fn open(dir: &Path) -> BextResult<Self> {
        let store = Self::new(dir)?;
        fs::create_dir_all(&store.dir).map_err(|e| {
            BextError::io(format!("creating extensions directory {}", store.dir.display()), e)
        })?;
        Ok(store)
    }

    /// Extension store directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the activation link for a layer
    pub fn link_path(&self, layer: &str) -> PathBuf {
        self.dir.join(format!("{}{}", layer, SYSEXT_EXTENSION))
    }

    /// Whether a layer currently has an activation link
    pub fn is_active(&self, layer: &str) -> bool {
        fs::symlink_metadata(self.link_path(layer)).is_ok()
    }

    /// Activate a cached layer by linking its `current` pointer
    pub fn activate_from_cache(
        &self,
        cache: &LayerCache,
        layer: &str,
        override_existing: bool,
    ) -> BextResult<PathBuf> {
        let current = cache.current(layer)?;
        let link = self.link_path(layer);

        self.replace_link(layer, &current, &link, override_existing)?;
        Ok(link)
    }

    /// Activate an image file directly, bypassing the cache
    pub fn activate_from_file(&self, file: &Path, override_existing: bool) -> BextResult<PathBuf> {
        let base = file
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| n.ends_with(SYSEXT_EXTENSION))
            .ok_or_else(|| BextError::InvalidExtension {
                path: file.to_path_buf(),
                expected: SYSEXT_EXTENSION.to_string(),
            })?;
        let layer = blob::layer_name(file)?;

        let target = fs::canonicalize(file).map_err(|e| BextError::SourceNotFound {
            path: file.to_path_buf(),
            source: e,
        })?;
        if !target.is_file() {
            return Err(BextError::InvalidInput(format!(
                "{} is not a regular file",
                file.display()
            )));
        }
        fs::File::open(&target).map_err(|e| {
            BextError::io(format!("opening layer image {}", target.display()), e)
        })?;

        let link = self.dir.join(base);
        self.replace_link(&layer, &target, &link, override_existing)?;
        Ok(link)
    }

    /// Remove a layer's activation link
    ///
    /// Accepts either the layer name or the link file name.
    pub fn deactivate(&self, target: &str) -> BextResult<PathBuf> {
        let layer = target.strip_suffix(SYSEXT_EXTENSION).unwrap_or(target);
        blob::validate_component(layer, "layer name")?;
        let link = self.link_path(layer);

        let meta = fs::symlink_metadata(&link).map_err(|e| match e.kind() {
            ErrorKind::NotFound => BextError::ActivationNotFound(layer.to_string()),
            _ => BextError::io(format!("inspecting {}", link.display()), e),
        })?;
        if !meta.file_type().is_symlink() {
            return Err(BextError::InvalidInput(format!(
                "{} is not an activation link, refusing to remove it",
                link.display()
            )));
        }

        debug!(link = %link.display(), "Removing activation link");
        fs::remove_file(&link)
            .map_err(|e| BextError::io(format!("removing {}", link.display()), e))?;
        Ok(link)
    }

    fn replace_link(
        &self,
        layer: &str,
        target: &Path,
        link: &Path,
        override_existing: bool,
    ) -> BextResult<()> {
        if fs::symlink_metadata(link).is_ok() {
            if !override_existing {
                return Err(BextError::AlreadyActive(layer.to_string()));
            }
            debug!(link = %link.display(), "Removing previous activation");
            fs::remove_file(link)
                .map_err(|e| BextError::io(format!("removing {}", link.display()), e))?;
        }

        debug!(link = %link.display(), target = %target.display(), "Creating activation link");
        symlink(target, link)
            .map_err(|e| BextError::io(format!("creating symlink {}", link.display()), e))
    }
}
