//! Configuration schema for bext
//!
//! Configuration is stored at `~/.config/bext/config.toml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Suffix the systemd-sysext loader recognizes for image extensions
pub const SYSEXT_EXTENSION: &str = ".raw";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache and extension store locations
    pub paths: PathsConfig,

    /// Mount targets
    pub mount: MountConfig,

    /// Layer build settings
    pub build: BuildConfig,
}

impl Config {
    /// Anchor relative paths at `base`, the directory holding the config file
    pub fn anchor_paths(&mut self, base: &Path) {
        for path in [
            &mut self.paths.cache_dir,
            &mut self.paths.extensions_dir,
            &mut self.paths.extensions_mount,
            &mut self.mount.path,
            &mut self.mount.store_path,
            &mut self.mount.layered_store_path,
            &mut self.mount.bindmount_path,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Exit non-zero when any item of a batch command fails
    pub strict: bool,

    /// Never draw progress bars
    pub no_progress: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            strict: false,
            no_progress: false,
        }
    }
}

/// Filesystem locations for the layer cache and the extension store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of the content-addressed blob cache
    pub cache_dir: PathBuf,

    /// Directory scanned by systemd-sysext for activation links
    pub extensions_dir: PathBuf,

    /// Directory where merged layers expose their contents
    pub extensions_mount: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("/var/cache/bext"),
            extensions_dir: PathBuf::from("/var/lib/extensions"),
            extensions_mount: PathBuf::from("/usr/bext"),
        }
    }
}

/// Mount target configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Where the merged layer binaries are mounted
    pub path: PathBuf,

    /// Host package store that layers are overlaid onto
    pub store_path: PathBuf,

    /// Store shipped by activated layers
    pub layered_store_path: PathBuf,

    /// Auxiliary path keeping an already populated store reachable
    pub bindmount_path: PathBuf,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/tmp/extensions.d/bin"),
            store_path: PathBuf::from("/nix/store"),
            layered_store_path: PathBuf::from("/usr/store"),
            bindmount_path: PathBuf::from("/tmp/nix-store-bindmount"),
        }
    }
}

/// Layer build configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Image used for the build container
    pub image: String,

    /// Tag of the build image
    pub tag: String,

    /// Nix flake providing the recipe builder
    pub recipe_flake: String,

    /// Derivation built from the recipe flake
    pub recipe_action: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            image: "docker.io/nixos/nix".to_string(),
            tag: "latest".to_string(),
            recipe_flake: "github:ublue-os/bext".to_string(),
            recipe_action: "bake-recipe".to_string(),
        }
    }
}
