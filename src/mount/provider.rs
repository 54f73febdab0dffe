//! Mount capability used by the orchestrators
//!
//! The orchestrators only decide *what* to mount and in which order; the
//! [`MountProvider`] performs it. [`SyscallMounts`] talks to the kernel
//! directly and needs `CAP_SYS_ADMIN`.

use crate::error::{BextError, BextResult};
use nix::mount::{mount, umount2, MntFlags, MsFlags};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Abstract mount interface
pub trait MountProvider: Send + Sync {
    /// Bind `source` onto `target`, optionally read-only
    fn bind(&self, source: &Path, target: &Path, readonly: bool) -> BextResult<()>;

    /// Mount a read-only overlay of `lower_dirs` (top-most first) onto `target`
    fn overlay(&self, lower_dirs: &[PathBuf], target: &Path) -> BextResult<()>;

    /// Unmount whatever is mounted on `target`
    fn unmount(&self, target: &Path) -> BextResult<()>;
}

/// Build the `lowerdir=` option for an overlay mount
///
/// `:` separates layers and `,` separates options, so both are escaped
/// inside individual paths.
pub fn lowerdir_option(lower_dirs: &[PathBuf]) -> String {
    let joined: Vec<String> = lower_dirs
        .iter()
        .map(|p| {
            p.to_string_lossy()
                .replace('\\', "\\\\")
                .replace(':', "\\:")
                .replace(',', "\\,")
        })
        .collect();
    format!("lowerdir={}", joined.join(":"))
}

/// Bind, then remount read-only when asked
///
/// `MS_RDONLY` is ignored on the initial bind and only applies on remount.
/// If the remount fails the writable bind is detached again before the
/// error is returned.
fn bind_sequence(
    readonly: bool,
    mount_with: impl Fn(MsFlags) -> nix::Result<()>,
    detach: impl Fn() -> nix::Result<()>,
) -> io::Result<()> {
    mount_with(MsFlags::MS_BIND)?;
    if !readonly {
        return Ok(());
    }

    if let Err(e) = mount_with(MsFlags::MS_BIND | MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY) {
        if let Err(undo) = detach() {
            warn!("Failed to detach writable bind after remount error: {}", undo);
        }
        return Err(e.into());
    }
    Ok(())
}

/// Mount provider backed by `mount(2)` and `umount2(2)`
#[derive(Debug, Clone, Copy, Default)]
pub struct SyscallMounts;

impl SyscallMounts {
    pub fn new() -> Self {
        Self
    }
}

impl MountProvider for SyscallMounts {
    fn bind(&self, source: &Path, target: &Path, readonly: bool) -> BextResult<()> {
        debug!(source = %source.display(), target = %target.display(), readonly, "Bind mounting");
        bind_sequence(
            readonly,
            |flags| mount(Some(source), target, None::<&str>, flags, None::<&str>),
            || umount2(target, MntFlags::empty()),
        )
        .map_err(|e| BextError::Mount {
            source_path: source.display().to_string(),
            target: target.to_path_buf(),
            source: e,
        })
    }

    fn overlay(&self, lower_dirs: &[PathBuf], target: &Path) -> BextResult<()> {
        let option = lowerdir_option(lower_dirs);
        debug!(target = %target.display(), %option, "Mounting overlay");

        let flags = MsFlags::MS_RDONLY | MsFlags::MS_NODEV | MsFlags::MS_NOATIME;
        mount(Some("overlay"), target, Some("overlay"), flags, Some(option.as_str())).map_err(|e| {
            BextError::Mount {
                source_path: option.clone(),
                target: target.to_path_buf(),
                source: e.into(),
            }
        })
    }

    fn unmount(&self, target: &Path) -> BextResult<()> {
        debug!(target = %target.display(), "Unmounting");
        umount2(target, MntFlags::empty()).map_err(|e| BextError::Unmount {
            target: target.to_path_buf(),
            source: e.into(),
        })
    }
}
