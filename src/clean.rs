//! Garbage collection of unreferenced blobs
//!
//! A blob survives cleaning when it is the resolved target of its layer's
//! `current` pointer or when its path is in the caller's exclusion list.
//! Everything else in a layer directory is deleted, concurrently, and layer
//! directories left empty are removed afterwards.

use crate::batch::{run_batch, BatchReport};
use crate::error::{BextError, BextResult};
use crate::store::{blob, LayerCache, CURRENT_BLOB_NAME};
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What cleaning decided for a single layer
#[derive(Debug, Clone, Default)]
pub struct LayerPlan {
    pub layer: String,
    pub dir: PathBuf,
    /// Paths that will be deleted
    pub candidates: Vec<PathBuf>,
    /// Blobs preserved by `current` or an exclusion
    pub kept: Vec<PathBuf>,
}

/// Cleaning decisions for the whole cache
#[derive(Debug, Clone, Default)]
pub struct CleanPlan {
    pub layers: Vec<LayerPlan>,
}

impl CleanPlan {
    /// Every path scheduled for deletion
    pub fn candidates(&self) -> impl Iterator<Item = &PathBuf> {
        self.layers.iter().flat_map(|l| l.candidates.iter())
    }
}

/// Outcome of [`CacheCleaner::clean`]
#[derive(Debug)]
pub struct CleanReport {
    pub plan: CleanPlan,
    /// Per-blob deletion outcomes; `None` on dry runs
    pub deletions: Option<BatchReport<PathBuf>>,
    /// Layer directories removed because they ended up empty
    pub removed_dirs: Vec<PathBuf>,
}

/// Removes cache blobs nothing refers to
pub struct CacheCleaner<'a> {
    cache: &'a LayerCache,
    exclusions: HashSet<PathBuf>,
}

impl<'a> CacheCleaner<'a> {
    /// Create a cleaner with user-supplied exclusion paths
    ///
    /// Exclusions are made absolute and lexically cleaned; existing paths are
    /// also excluded under their canonical form.
    pub fn new(cache: &'a LayerCache, exclude: &[PathBuf]) -> BextResult<Self> {
        let mut exclusions = HashSet::new();
        for path in exclude {
            let cleaned = blob::clean_path(path)?;
            if let Ok(canonical) = fs::canonicalize(&cleaned) {
                exclusions.insert(canonical);
            }
            exclusions.insert(cleaned);
        }
        Ok(Self { cache, exclusions })
    }

    /// Decide what to delete without changing anything
    pub fn plan(&self) -> BextResult<CleanPlan> {
        let mut plan = CleanPlan::default();
        for layer in self.cache.layer_names()? {
            plan.layers.push(self.plan_layer(&layer)?);
        }
        Ok(plan)
    }

    fn plan_layer(&self, layer: &str) -> BextResult<LayerPlan> {
        let dir = canonical_or_self(&self.cache.layer_dir(layer));
        let entries = fs::read_dir(&dir)
            .map_err(|e| BextError::io(format!("reading layer {}", dir.display()), e))?;

        let mut exclusions = self.exclusions.clone();
        let mut blobs = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| BextError::io("reading layer entry", e))?;
            let path = entry.path();
            let file_type = entry
                .file_type()
                .map_err(|e| BextError::io(format!("inspecting {}", path.display()), e))?;

            if file_type.is_dir() {
                continue;
            }

            if file_type.is_symlink() && entry.file_name() == CURRENT_BLOB_NAME {
                match fs::canonicalize(&path) {
                    Ok(target) => {
                        exclusions.insert(target);
                        exclusions.insert(path);
                    }
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        debug!(layer, "Current pointer is dangling, layer is fully cleanable");
                        blobs.push(path);
                    }
                    Err(e) => {
                        return Err(BextError::io(format!("resolving {}", path.display()), e))
                    }
                }
                continue;
            }

            blobs.push(path);
        }

        let (mut kept, mut candidates): (Vec<_>, Vec<_>) =
            blobs.into_iter().partition(|p| exclusions.contains(p));
        kept.sort();
        candidates.sort();

        Ok(LayerPlan {
            layer: layer.to_string(),
            dir,
            candidates,
            kept,
        })
    }

    /// Delete every candidate blob, then prune empty layer directories
    pub async fn clean(&self, dry_run: bool) -> BextResult<CleanReport> {
        let plan = self.plan()?;

        if dry_run {
            for path in plan.candidates() {
                info!(path = %path.display(), "Would clean path");
            }
            return Ok(CleanReport {
                plan,
                deletions: None,
                removed_dirs: Vec::new(),
            });
        }

        let targets: Vec<String> = plan
            .candidates()
            .map(|p| p.to_string_lossy().to_string())
            .collect();

        let deletions = run_batch("clean", targets, |target| {
            let path = PathBuf::from(target);
            fs::remove_file(&path)
                .map_err(|e| BextError::io(format!("removing {}", path.display()), e))?;
            debug!(path = %path.display(), "Cleaned path");
            Ok(path)
        })
        .await;

        let mut removed_dirs = Vec::new();
        for layer in &plan.layers {
            if remove_if_empty(&layer.dir)? {
                debug!(layer = %layer.layer, "Removed empty layer directory");
                removed_dirs.push(layer.dir.clone());
            }
        }

        Ok(CleanReport {
            plan,
            deletions: Some(deletions),
            removed_dirs,
        })
    }
}

fn canonical_or_self(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn remove_if_empty(dir: &Path) -> BextResult<bool> {
    let mut entries =
        fs::read_dir(dir).map_err(|e| BextError::io(format!("reading {}", dir.display()), e))?;
    if entries.next().is_some() {
        return Ok(false);
    }
    fs::remove_dir(dir).map_err(|e| BextError::io(format!("removing {}", dir.display()), e))?;
    Ok(true)
}
