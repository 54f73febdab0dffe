//! Error types for bext
//!
//! All modules use `BextResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for bext operations
pub type BextResult<T> = Result<T, BextError>;

/// All errors that can occur in bext
#[derive(Error, Debug)]
pub enum BextError {
    // Lookup errors
    #[error("Source layer not found: {path}")]
    SourceNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Target layer {0} could not be found in cache")]
    LayerNotFound(String),

    #[error("Layer {0} is not activated")]
    ActivationNotFound(String),

    #[error("Blob not found: {0}")]
    BlobNotFound(PathBuf),

    // Conflict errors
    #[error("Blob {hash} is already in cache for layer {layer}")]
    BlobExists { layer: String, hash: String },

    #[error("Layer {0} is already activated")]
    AlreadyActive(String),

    // Integrity errors
    #[error("Copied blobs did not match. source: {source_path}; target: {target_path}")]
    IntegrityMismatch {
        source_path: PathBuf,
        target_path: PathBuf,
    },

    // Input errors
    #[error("Invalid sysext extension for {path}, should be {expected}")]
    InvalidExtension { path: PathBuf, expected: String },

    #[error("Could not find shell {shell}, valid shells are: {valid}")]
    UnknownShell { shell: String, valid: String },

    #[error("{0}")]
    InvalidInput(String),

    // Mount errors
    #[error("No valid layers are mounted in {0}")]
    NoValidLayers(PathBuf),

    #[error("No layered store could be found in {0}")]
    LayeredStoreMissing(PathBuf),

    #[error("Failed mounting {source_path} to {target}: {source}")]
    Mount {
        source_path: String,
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed unmounting {target}: {source}")]
    Unmount {
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed changing attributes of {path}: {source}")]
    Attribute {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Build errors
    #[error("Podman socket not reachable at {socket}")]
    BuildRuntimeUnavailable { socket: String },

    #[error("Invalid build recipe {path}: {reason}")]
    RecipeInvalid { path: PathBuf, reason: String },

    #[error("Image pull failed: {image}: {reason}")]
    ImagePull { image: String, reason: String },

    #[error("Layer build failed in container {container}: {output}")]
    BuildFailed { container: String, output: String },

    // Batch errors
    #[error("{failed} of {total} {operation} target(s) failed")]
    BatchFailed {
        operation: String,
        failed: usize,
        total: usize,
    },

    // IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BextError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Whether the underlying OS error was a permission failure
    pub fn is_permission_denied(&self) -> bool {
        let source = match self {
            Self::Mount { source, .. }
            | Self::Unmount { source, .. }
            | Self::Attribute { source, .. }
            | Self::Io { source, .. } => source,
            _ => return false,
        };
        source.kind() == std::io::ErrorKind::PermissionDenied
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        if self.is_permission_denied() {
            return Some("Mounting and changing file attributes requires root, try again with sudo");
        }
        match self {
            Self::LayerNotFound(_) => Some("Add the layer first: bext layer add <FILE>"),
            Self::AlreadyActive(_) => Some("Pass --override to replace the existing activation"),
            Self::BlobExists { .. } => Some("Pass --override to write over the cached blob"),
            Self::IntegrityMismatch { .. } => {
                Some("The written blob was left in place, remove it with: bext layer remove <LAYER> --hash <HASH>")
            }
            Self::NoValidLayers(_) => Some("Activate a layer that ships a bin directory and refresh sysext"),
            Self::BuildRuntimeUnavailable { .. } => {
                Some("Enable the podman socket: systemctl enable --now --user podman.socket")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = BextError::AlreadyActive("htop".to_string());
        assert_eq!(err.to_string(), "Layer htop is already activated");
    }

    #[test]
    fn error_hint() {
        let err = BextError::LayerNotFound("htop".to_string());
        assert_eq!(err.hint(), Some("Add the layer first: bext layer add <FILE>"));
        assert_eq!(BextError::Internal("x".to_string()).hint(), None);
    }

    #[test]
    fn permission_denied_hint() {
        let err = BextError::Unmount {
            target: PathBuf::from("/nix/store"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(err.is_permission_denied());
        assert!(err.hint().unwrap().contains("sudo"));
    }

    #[test]
    fn batch_failed_display() {
        let err = BextError::BatchFailed {
            operation: "activate".to_string(),
            failed: 1,
            total: 5,
        };
        assert_eq!(err.to_string(), "1 of 5 activate target(s) failed");
    }
}
