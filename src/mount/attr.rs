//! Inode attribute flags (`chattr`)
//!
//! Image-based systems mark `/` immutable, which blocks creating top-level
//! directories such as `/nix` even for root. The flag is cleared for the
//! duration of the `mkdir` and restored afterwards.

use crate::error::{BextError, BextResult};
use nix::libc::c_long;
use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;
use std::path::Path;
use tracing::debug;

/// `FS_IMMUTABLE_FL` from `linux/fs.h`
pub const FS_IMMUTABLE_FL: c_long = 0x0000_0010;

nix::ioctl_read!(fs_ioc_getflags, b'f', 1, c_long);
nix::ioctl_write_ptr!(fs_ioc_setflags, b'f', 2, c_long);

/// Access to the immutable attribute of a directory
pub trait FileAttributes: Send + Sync {
    fn is_immutable(&self, path: &Path) -> BextResult<bool>;

    fn set_immutable(&self, path: &Path, immutable: bool) -> BextResult<()>;
}

/// Attribute access through the `FS_IOC_{GET,SET}FLAGS` ioctls
#[derive(Debug, Clone, Copy, Default)]
pub struct IoctlAttributes;

impl IoctlAttributes {
    pub fn new() -> Self {
        Self
    }

    fn get_flags(file: &File) -> io::Result<c_long> {
        let mut flags: c_long = 0;
        // SAFETY: the fd stays open for the call and `flags` outlives it.
        unsafe { fs_ioc_getflags(file.as_raw_fd(), &mut flags) }?;
        Ok(flags)
    }

    fn set_flags(file: &File, flags: c_long) -> io::Result<()> {
        // SAFETY: as above, the kernel only reads `flags`.
        unsafe { fs_ioc_setflags(file.as_raw_fd(), &flags) }?;
        Ok(())
    }
}

impl FileAttributes for IoctlAttributes {
    fn is_immutable(&self, path: &Path) -> BextResult<bool> {
        let attr_err = |source| BextError::Attribute {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(attr_err)?;
        let flags = Self::get_flags(&file).map_err(attr_err)?;
        Ok(flags & FS_IMMUTABLE_FL != 0)
    }

    fn set_immutable(&self, path: &Path, immutable: bool) -> BextResult<()> {
        let attr_err = |source| BextError::Attribute {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(attr_err)?;
        let flags = Self::get_flags(&file).map_err(attr_err)?;
        let updated = if immutable {
            flags | FS_IMMUTABLE_FL
        } else {
            flags & !FS_IMMUTABLE_FL
        };

        debug!(path = %path.display(), immutable, "Setting immutable attribute");
        if updated != flags {
            Self::set_flags(&file, updated).map_err(attr_err)?;
        }
        Ok(())
    }
}
