//! Package store passthrough
//!
//! Layers ship their store paths under the layered store. That directory is
//! bind mounted read-only over the host package store, after the store's
//! original contents have been looped through an auxiliary bind mount so
//! they stay reachable.

use super::{FileAttributes, MountProvider};
use crate::error::{BextError, BextResult};
use crate::store::blob::clean_path;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Paths involved in the store passthrough
#[derive(Debug, Clone)]
pub struct StoreMount {
    /// Host package store mountpoint
    pub store: PathBuf,
    /// Store contents contributed by activated layers
    pub layered_store: PathBuf,
    /// Auxiliary path keeping the original store reachable
    pub bindmount: PathBuf,
}

impl StoreMount {
    /// Plan a store mount; every path is made absolute and normalized
    pub fn new(store: &Path, layered_store: &Path, bindmount: &Path) -> BextResult<Self> {
        Ok(Self {
            store: clean_path(store)?,
            layered_store: clean_path(layered_store)?,
            bindmount: clean_path(bindmount)?,
        })
    }

    /// Mount the layered store over the package store
    pub fn mount(&self, mounts: &dyn MountProvider, attrs: &dyn FileAttributes) -> BextResult<()> {
        self.ensure_mountpoint(attrs)?;

        if has_entries(&self.store)? {
            if let Err(e) = mounts.unmount(&self.store) {
                debug!(store = %self.store.display(), error = %e, "No existing store mount");
            }

            if has_entries(&self.bindmount)? {
                debug!(
                    bindmount = %self.bindmount.display(),
                    "Loopback already in place, skipping"
                );
            } else {
                fs::create_dir_all(&self.bindmount).map_err(|e| {
                    BextError::io(format!("creating {}", self.bindmount.display()), e)
                })?;
                if let Err(e) = mounts.unmount(&self.bindmount) {
                    debug!(bindmount = %self.bindmount.display(), error = %e, "No stale loopback");
                }
                mounts.bind(&self.store, &self.bindmount, false)?;
                mounts.bind(&self.bindmount, &self.store, false)?;
                debug!(bindmount = %self.bindmount.display(), "Store loopback mounted");
            }
        }

        if !self.layered_store.is_dir() {
            return Err(BextError::LayeredStoreMissing(self.layered_store.clone()));
        }
        mounts.bind(&self.layered_store, &self.store, true)?;

        info!(
            store = %self.store.display(),
            layered = %self.layered_store.display(),
            "Mounted layered store"
        );
        Ok(())
    }

    /// Tear down the store mount, then the loopback
    pub fn unmount(&self, mounts: &dyn MountProvider) -> BextResult<()> {
        mounts.unmount(&self.store)?;
        mounts.unmount(&self.bindmount)?;
        info!(store = %self.store.display(), "Unmounted layered store");
        Ok(())
    }

    /// Create the store mountpoint
    ///
    /// When the store's parent does not exist yet, the closest existing
    /// ancestor may be immutable. The flag is lifted for the `mkdir` and put
    /// back only if it was set.
    fn ensure_mountpoint(&self, attrs: &dyn FileAttributes) -> BextResult<()> {
        if self.store.is_dir() {
            return Ok(());
        }

        let parent_exists = self.store.parent().map_or(true, Path::exists);
        if parent_exists {
            return create_dir(&self.store);
        }

        let anchor = existing_ancestor(&self.store);
        let was_immutable = attrs.is_immutable(&anchor)?;
        if was_immutable {
            debug!(path = %anchor.display(), "Clearing immutable attribute");
            attrs.set_immutable(&anchor, false)?;
        }

        let created = create_dir(&self.store);

        if was_immutable {
            debug!(path = %anchor.display(), "Restoring immutable attribute");
            attrs.set_immutable(&anchor, true)?;
        }
        created
    }
}

fn create_dir(path: &Path) -> BextResult<()> {
    fs::create_dir_all(path)
        .map_err(|e| BextError::io(format!("creating mountpoint {}", path.display()), e))
}

fn existing_ancestor(path: &Path) -> PathBuf {
    path.ancestors()
        .skip(1)
        .find(|p| p.exists())
        .map_or_else(|| PathBuf::from("/"), Path::to_path_buf)
}

fn has_entries(dir: &Path) -> BextResult<bool> {
    match fs::read_dir(dir) {
        Ok(mut entries) => Ok(entries.next().is_some()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(BextError::io(format!("reading {}", dir.display()), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::attr::testing::FakeAttributes;
    use crate::mount::provider::testing::{MountCall, RecordingMounts};
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        plan: StoreMount,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let plan = StoreMount::new(
            &dir.path().join("nix/store"),
            &dir.path().join("usr/store"),
            &dir.path().join("tmp/nix-store-bindmount"),
        )
        .unwrap();
        fs::create_dir_all(&plan.layered_store).unwrap();
        Fixture { dir, plan }
    }

    fn bind(source: &Path, target: &Path, readonly: bool) -> MountCall {
        MountCall::Bind {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
            readonly,
        }
    }

    #[test]
    fn new_normalizes_bindmount() {
        let dir = TempDir::new().unwrap();
        let plan = StoreMount::new(
            &dir.path().join("nix/./store"),
            &dir.path().join("usr/store"),
            &dir.path().join("tmp/x/../nix-store-bindmount"),
        )
        .unwrap();

        assert_eq!(plan.store, dir.path().join("nix/store"));
        assert_eq!(plan.bindmount, dir.path().join("tmp/nix-store-bindmount"));
    }

    #[test]
    fn empty_store_gets_layered_store_only() {
        let fx = fixture();
        fs::create_dir_all(&fx.plan.store).unwrap();
        let mounts = RecordingMounts::new();

        fx.plan.mount(&mounts, &FakeAttributes::default()).unwrap();

        assert_eq!(
            mounts.calls(),
            vec![bind(&fx.plan.layered_store, &fx.plan.store, true)]
        );
    }

    #[test]
    fn populated_store_is_looped_before_replacement() {
        let fx = fixture();
        fs::create_dir_all(fx.plan.store.join("abc-glibc")).unwrap();
        let mounts = RecordingMounts::new();

        fx.plan.mount(&mounts, &FakeAttributes::default()).unwrap();

        assert_eq!(
            mounts.mounts(),
            vec![
                bind(&fx.plan.store, &fx.plan.bindmount, false),
                bind(&fx.plan.bindmount, &fx.plan.store, false),
                bind(&fx.plan.layered_store, &fx.plan.store, true),
            ]
        );
        assert_eq!(mounts.calls()[0], MountCall::Unmount(fx.plan.store.clone()));
        assert!(fx.plan.bindmount.is_dir());
    }

    #[test]
    fn existing_loopback_is_not_stacked() {
        let fx = fixture();
        fs::create_dir_all(fx.plan.store.join("abc-glibc")).unwrap();
        fs::create_dir_all(fx.plan.bindmount.join("abc-glibc")).unwrap();
        let mounts = RecordingMounts::new();

        fx.plan.mount(&mounts, &FakeAttributes::default()).unwrap();

        assert_eq!(
            mounts.mounts(),
            vec![bind(&fx.plan.layered_store, &fx.plan.store, true)]
        );
    }

    #[test]
    fn missing_layered_store_fails() {
        let fx = fixture();
        fs::remove_dir(&fx.plan.layered_store).unwrap();
        let mounts = RecordingMounts::new();

        let err = fx.plan.mount(&mounts, &FakeAttributes::default()).unwrap_err();
        assert!(matches!(err, BextError::LayeredStoreMissing(_)));
        assert!(mounts.mounts().is_empty());
    }

    #[test]
    fn immutable_ancestor_is_toggled_and_restored() {
        let fx = fixture();
        let attrs = FakeAttributes::with_immutable(fx.dir.path());

        fx.plan.mount(&RecordingMounts::new(), &attrs).unwrap();

        assert!(fx.plan.store.is_dir());
        assert_eq!(
            attrs.history(),
            vec![
                (fx.dir.path().to_path_buf(), false),
                (fx.dir.path().to_path_buf(), true),
            ]
        );
        assert!(attrs.is_immutable(fx.dir.path()).unwrap());
    }

    #[test]
    fn mutable_ancestor_is_left_alone() {
        let fx = fixture();
        let attrs = FakeAttributes::default();

        fx.plan.mount(&RecordingMounts::new(), &attrs).unwrap();

        assert!(fx.plan.store.is_dir());
        assert!(attrs.history().is_empty());
    }

    #[test]
    fn existing_parent_skips_attribute_checks() {
        let fx = fixture();
        fs::create_dir_all(fx.plan.store.parent().unwrap()).unwrap();
        let attrs = FakeAttributes::with_immutable(fx.dir.path());

        fx.plan.mount(&RecordingMounts::new(), &attrs).unwrap();
        assert!(attrs.history().is_empty());
    }

    #[test]
    fn mount_failure_aborts_sequence() {
        let fx = fixture();
        fs::create_dir_all(fx.plan.store.join("abc-glibc")).unwrap();
        let mounts = RecordingMounts::new().failing_on(&fx.plan.bindmount);

        let err = fx.plan.mount(&mounts, &FakeAttributes::default()).unwrap_err();

        assert!(matches!(err, BextError::Mount { .. }));
        assert_eq!(
            mounts.mounts(),
            vec![bind(&fx.plan.store, &fx.plan.bindmount, false)]
        );
    }

    #[test]
    fn unmount_reverses_in_order() {
        let fx = fixture();
        let mounts = RecordingMounts::new()
            .with_mounted(&fx.plan.store)
            .with_mounted(&fx.plan.bindmount);

        fx.plan.unmount(&mounts).unwrap();

        assert_eq!(
            mounts.calls(),
            vec![
                MountCall::Unmount(fx.plan.store.clone()),
                MountCall::Unmount(fx.plan.bindmount.clone()),
            ]
        );
    }

    #[test]
    fn unmount_fails_fast() {
        let fx = fixture();
        let mounts = RecordingMounts::new().with_mounted(&fx.plan.bindmount);

        let err = fx.plan.unmount(&mounts).unwrap_err();

        assert!(matches!(err, BextError::Unmount { .. }));
        assert_eq!(mounts.calls(), vec![MountCall::Unmount(fx.plan.store.clone())]);
    }
}
