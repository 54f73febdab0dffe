//! Content-addressed layer cache
//!
//! Layout on disk:
//!
//! ```text
//! <cache_dir>/<layer>/<sha256>   blob, never modified in place
//! <cache_dir>/<layer>/current    symlink to the active blob (absolute path)
//! ```

use crate::activation::ExtensionStore;
use crate::error::{BextError, BextResult};
use crate::store::blob::{self, CURRENT_BLOB_NAME};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io::{self, ErrorKind};
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Options controlling [`LayerCache::add`]
#[derive(Debug, Clone, Copy)]
pub struct AddOptions {
    /// Write over a blob that already exists with different content
    pub override_existing: bool,
    /// Re-read and hash the written blob
    pub verify_checksum: bool,
    /// Point the layer's `current` symlink at the new blob
    pub update_current: bool,
}

impl Default for AddOptions {
    fn default() -> Self {
        Self {
            override_existing: false,
            verify_checksum: true,
            update_current: true,
        }
    }
}

/// Progress stages reported while adding a blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddStage {
    Reading,
    Copying,
    Verifying,
    Linking,
}

impl fmt::Display for AddStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reading => write!(f, "Reading layer"),
            Self::Copying => write!(f, "Copying blob"),
            Self::Verifying => write!(f, "Checking blob"),
            Self::Linking => write!(f, "Refreshing symlink"),
        }
    }
}

/// A blob stored in the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef {
    /// Layer the blob belongs to
    pub layer: String,
    /// Hex content hash, also the file name
    pub hash: String,
    /// Absolute path of the blob
    pub path: PathBuf,
    /// False when identical content was already cached
    pub copied: bool,
}

/// Blob listing entry
#[derive(Debug, Clone, Serialize)]
pub struct BlobInfo {
    pub hash: String,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Layer listing entry
#[derive(Debug, Clone, Serialize)]
pub struct LayerInfo {
    pub name: String,
    pub blobs: Vec<BlobInfo>,
    /// Hash `current` points at, if the pointer resolves
    pub current: Option<String>,
}

/// What [`LayerCache::remove_layer`] deleted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedLayer {
    pub dir: PathBuf,
    /// Activation link removed alongside, if there was one
    pub deactivated: Option<PathBuf>,
}

/// Handle to the cache directory
#[derive(Debug, Clone)]
pub struct LayerCache {
    root: PathBuf,
}

impl LayerCache {
    /// Refer to a cache rooted at `root` without touching the filesystem
    pub fn new(root: &Path) -> BextResult<Self> {
        Ok(Self {
            root: blob::clean_path(root)?,
        })
    }

    /// Refer to a cache rooted at `root`, creating the directory if needed
    pub fn open(root: &Path) -> BextResult<Self> {
        let cache = Self::new(root)?;
        fs::create_dir_all(&cache.root).map_err(|e| {
            BextError::io(format!("creating cache directory {}", cache.root.display()), e)
        })?;
        Ok(cache)
    }

    /// Cache root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding all blobs of a layer
    pub fn layer_dir(&self, layer: &str) -> PathBuf {
        self.root.join(layer)
    }

    /// Path of a layer's `current` symlink
    pub fn current_path(&self, layer: &str) -> PathBuf {
        self.layer_dir(layer).join(CURRENT_BLOB_NAME)
    }

    /// Copy a layer file into the cache
    pub fn add(&self, source: &Path, options: AddOptions) -> BextResult<BlobRef> {
        self.add_with(source, options, |_| {})
    }

    /// Copy a layer file into the cache, reporting each stage to `on_stage`
    pub fn add_with(
        &self,
        source: &Path,
        options: AddOptions,
        on_stage: impl Fn(AddStage),
    ) -> BextResult<BlobRef> {
        self.add_using(source, options, on_stage, |path, data| fs::write(path, data))
    }

    /// Shared add path; `write_blob` persists the bytes at the blob path
    fn add_using(
        &self,
        source: &Path,
        options: AddOptions,
        on_stage: impl Fn(AddStage),
        write_blob: impl Fn(&Path, &[u8]) -> io::Result<()>,
    ) -> BextResult<BlobRef> {
        on_stage(AddStage::Reading);
        let data = fs::read(source).map_err(|e| BextError::SourceNotFound {
            path: source.to_path_buf(),
            source: e,
        })?;

        let layer = blob::layer_name(source)?;
        let hash = blob::hash_bytes(&data);
        let layer_dir = self.layer_dir(&layer);
        let blob_path = layer_dir.join(&hash);

        fs::create_dir_all(&layer_dir).map_err(|e| {
            BextError::io(format!("creating layer directory {}", layer_dir.display()), e)
        })?;

        let already_cached = match fs::symlink_metadata(&blob_path) {
            Ok(_) if options.override_existing => false,
            Ok(_) => {
                if blob::hash_file(&blob_path)? != hash {
                    return Err(BextError::BlobExists { layer, hash });
                }
                debug!(blob = %blob_path.display(), "Blob already cached with identical content");
                true
            }
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                return Err(BextError::io(
                    format!("inspecting blob {}", blob_path.display()),
                    e,
                ))
            }
        };

        if !already_cached {
            on_stage(AddStage::Copying);
            debug!(source = %source.display(), target = %blob_path.display(), "Copying blob");
            write_blob(&blob_path, &data).map_err(|e| {
                BextError::io(format!("writing blob {}", blob_path.display()), e)
            })?;

            if options.verify_checksum {
                on_stage(AddStage::Verifying);
                // The copy is left in place on mismatch for manual inspection.
                if blob::hash_file(&blob_path)? != hash {
                    return Err(BextError::IntegrityMismatch {
                        source_path: source.to_path_buf(),
                        target_path: blob_path,
                    });
                }
            }
        }

        if options.update_current {
            on_stage(AddStage::Linking);
            self.point_current(&layer, &blob_path)?;
        }

        Ok(BlobRef {
            layer,
            hash,
            path: blob_path,
            copied: !already_cached,
        })
    }

    /// Atomically point a layer's `current` symlink at `blob_path`
    ///
    /// A temporary symlink is renamed over the old pointer, so readers see
    /// either the old or the new target, never a missing pointer. Concurrent
    /// swaps on the same layer are not ordered: the last rename wins.
    pub fn point_current(&self, layer: &str, blob_path: &Path) -> BextResult<()> {
        let current = self.current_path(layer);
        let staging = self
            .layer_dir(layer)
            .join(format!(".{}.{}.tmp", CURRENT_BLOB_NAME, Uuid::new_v4().simple()));

        debug!(path = %current.display(), target = %blob_path.display(), "Refreshing symlink");
        symlink(blob_path, &staging)
            .map_err(|e| BextError::io(format!("creating symlink {}", staging.display()), e))?;

        if let Err(e) = fs::rename(&staging, &current) {
            let _ = fs::remove_file(&staging);
            return Err(BextError::io(
                format!("replacing symlink {}", current.display()),
                e,
            ));
        }
        Ok(())
    }

    /// Path of a layer's `current` pointer, provided it resolves to a blob
    pub fn current(&self, layer: &str) -> BextResult<PathBuf> {
        blob::validate_component(layer, "layer name")?;
        let current = self.current_path(layer);
        match fs::metadata(&current) {
            Ok(meta) if meta.is_file() => Ok(current),
            Ok(_) => Err(BextError::LayerNotFound(layer.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(BextError::LayerNotFound(layer.to_string()))
            }
            Err(e) => Err(BextError::io(format!("resolving {}", current.display()), e)),
        }
    }

    /// Hash of the blob a layer's `current` pointer resolves to
    pub fn current_hash(&self, layer: &str) -> Option<String> {
        let target = fs::canonicalize(self.current_path(layer)).ok()?;
        target.file_name()?.to_str().map(str::to_string)
    }

    /// Delete one blob; `current` is left alone even if it pointed there
    pub fn remove_blob(&self, layer: &str, hash: &str) -> BextResult<PathBuf> {
        let blob_path = self.blob_path(layer, hash)?;

        fs::remove_file(&blob_path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => BextError::BlobNotFound(blob_path.clone()),
            _ => BextError::io(format!("removing blob {}", blob_path.display()), e),
        })?;
        Ok(blob_path)
    }

    /// Resolve and validate the path of a blob
    pub fn blob_path(&self, layer: &str, hash: &str) -> BextResult<PathBuf> {
        blob::validate_component(layer, "layer name")?;
        blob::validate_component(hash, "hash")?;
        if hash == CURRENT_BLOB_NAME {
            return Err(BextError::InvalidInput(format!(
                "{} is not a blob hash",
                CURRENT_BLOB_NAME
            )));
        }
        Ok(self.layer_dir(layer).join(hash))
    }

    /// Delete a layer's directory and its activation link, if any
    pub fn remove_layer(&self, layer: &str, extensions: &ExtensionStore) -> BextResult<RemovedLayer> {
        blob::validate_component(layer, "layer name")?;
        let dir = self.layer_dir(layer);

        fs::remove_dir_all(&dir).map_err(|e| match e.kind() {
            ErrorKind::NotFound => BextError::LayerNotFound(layer.to_string()),
            _ => BextError::io(format!("removing layer directory {}", dir.display()), e),
        })?;

        let deactivated = match extensions.deactivate(layer) {
            Ok(link) => Some(link),
            Err(BextError::ActivationNotFound(_)) => None,
            Err(e) => return Err(e),
        };

        Ok(RemovedLayer { dir, deactivated })
    }

    /// Names of all layer directories, sorted
    pub fn layer_names(&self) -> BextResult<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(BextError::io(
                    format!("reading cache directory {}", self.root.display()),
                    e,
                ))
            }
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| BextError::io("reading cache entry", e))?;
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if let (true, Some(name)) = (is_dir, entry.file_name().to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Describe every cached layer and its blobs
    pub fn list(&self) -> BextResult<Vec<LayerInfo>> {
        let mut layers = Vec::new();

        for name in self.layer_names()? {
            let dir = self.layer_dir(&name);
            let entries = fs::read_dir(&dir)
                .map_err(|e| BextError::io(format!("reading layer {}", dir.display()), e))?;

            let mut blobs = Vec::new();
            for entry in entries {
                let entry = entry.map_err(|e| BextError::io("reading layer entry", e))?;
                let file_name = entry.file_name().to_string_lossy().to_string();
                let meta = entry
                    .metadata()
                    .map_err(|e| BextError::io(format!("inspecting {}", file_name), e))?;
                if file_name == CURRENT_BLOB_NAME || !meta.is_file() {
                    continue;
                }
                blobs.push(BlobInfo {
                    hash: file_name,
                    size_bytes: meta.len(),
                    modified: meta.modified().ok().map(DateTime::<Utc>::from),
                });
            }
            blobs.sort_by(|a, b| a.hash.cmp(&b.hash));

            layers.push(LayerInfo {
                current: self.current_hash(&name),
                name,
                blobs,
            });
        }

        Ok(layers)
    }
}
