//! Blob naming and hashing
//!
//! Blobs are named by the lowercase hex SHA256 of their content, so two adds
//! of identical bytes always land on the same file.

use crate::error::{BextError, BextResult};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

/// Name of the symlink marking the active blob of a layer
pub const CURRENT_BLOB_NAME: &str = "current";

/// Hash raw layer bytes into a blob name
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hash a file on disk, streaming its content
pub fn hash_file(path: &Path) -> BextResult<String> {
    let mut file = fs::File::open(path)
        .map_err(|e| BextError::io(format!("opening blob {}", path.display()), e))?;

    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut buf)
            .map_err(|e| BextError::io(format!("reading blob {}", path.display()), e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Derive a layer name from a layer file: its base name up to the first `.`
///
/// `/tmp/htop.sysext.raw` and `htop.raw` both name the layer `htop`.
pub fn layer_name(path: &Path) -> BextResult<String> {
    let base = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| BextError::InvalidInput(format!("{} has no file name", path.display())))?;

    let name = base.split('.').next().unwrap_or_default();
    validate_component(name, "layer name")?;
    Ok(name.to_string())
}

/// Reject names that would escape their directory or collide with the pointer
pub fn validate_component(name: &str, what: &str) -> BextResult<()> {
    let mut components = Path::new(name).components();
    let single_normal = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );

    if name.is_empty() || !single_normal || name.contains('/') {
        return Err(BextError::InvalidInput(format!("invalid {}: {:?}", what, name)));
    }
    Ok(())
}

/// Make a path absolute and lexically drop `.` and `..` components
pub fn clean_path(path: &Path) -> BextResult<PathBuf> {
    let absolute = std::path::absolute(path)
        .map_err(|e| BextError::io(format!("resolving {}", path.display()), e))?;

    let mut cleaned = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    Ok(cleaned)
}
