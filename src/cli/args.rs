//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// bext - layer manager for image-based systems
///
/// Caches, activates and mounts system extension layers on top of an
/// otherwise immutable OS.
#[derive(Parser, Debug)]
#[command(name = "bext")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Do not log anything
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Write logs to a file instead of stderr ("-" for stderr)
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Log output format (overrides general.log_format)
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// Configuration file path
    #[arg(short, long, global = true, env = "BEXT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Exit non-zero when any target of a batch command fails
    #[arg(long, global = true)]
    pub strict: bool,

    /// Do not draw progress bars
    #[arg(long, global = true)]
    pub no_progress: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage cached layers and their activation
    Layer(LayerArgs),

    /// Mount activated layers into the running system
    Mount(MountArgs),

    /// Add the merged layer binaries to your shell's PATH
    AddToPath(AddToPathArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the layer command
#[derive(Parser, Debug)]
pub struct LayerArgs {
    #[command(subcommand)]
    pub action: LayerAction,
}

/// Layer subcommands
#[derive(Subcommand, Debug)]
pub enum LayerAction {
    /// Add layer files to the cache
    Add(AddArgs),

    /// Activate cached layers (or image files) in the extension store
    Activate(ActivateArgs),

    /// Remove layers from the extension store
    Deactivate(DeactivateArgs),

    /// Remove layers, or single blobs, from the cache
    Remove(RemoveArgs),

    /// Delete blobs no layer points at
    Clean(CleanArgs),

    /// Build a layer image from a recipe
    Build(BuildArgs),

    /// List cached layers
    List(ListArgs),
}

/// Arguments for `layer add`
#[derive(Parser, Debug)]
pub struct AddArgs {
    /// Layer files to add
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Do not point the layer's current blob at the added file
    #[arg(long)]
    pub no_symlink: bool,

    /// Skip the sha256 check of the copied blob
    #[arg(long)]
    pub no_checksum: bool,

    /// Write over a cached blob with the same hash
    #[arg(long = "override")]
    pub override_existing: bool,
}

/// Arguments for `layer activate`
#[derive(Parser, Debug)]
pub struct ActivateArgs {
    /// Layer names (or image files with --file)
    #[arg(required = true, value_name = "TARGET")]
    pub targets: Vec<String>,

    /// Treat targets as image files and link them without caching
    #[arg(short, long)]
    pub file: bool,

    /// Replace an existing activation
    #[arg(long = "override")]
    pub override_existing: bool,
}

/// Arguments for `layer deactivate`
#[derive(Parser, Debug)]
pub struct DeactivateArgs {
    /// Layer names
    #[arg(required = true, value_name = "TARGET")]
    pub targets: Vec<String>,
}

/// Arguments for `layer remove`
#[derive(Parser, Debug)]
pub struct RemoveArgs {
    /// Layer names
    #[arg(required = true, value_name = "TARGET")]
    pub targets: Vec<String>,

    /// Remove only these blobs (requires exactly one layer)
    #[arg(long = "hash", value_name = "HASH", value_delimiter = ',')]
    pub hashes: Vec<String>,

    /// Show what would be removed
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for `layer clean`
#[derive(Parser, Debug)]
pub struct CleanArgs {
    /// Blob paths to keep even if unreferenced
    #[arg(short, long, value_name = "PATH", value_delimiter = ',')]
    pub exclude: Vec<PathBuf>,

    /// Show what would be cleaned
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for `layer build`
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Recipe file (JSON)
    #[arg(value_name = "CONFIG")]
    pub recipe: PathBuf,

    /// Image used for the build container
    #[arg(short, long)]
    pub image: Option<String>,

    /// Tag of the build image
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Nix flake providing the recipe builder
    #[arg(short, long)]
    pub recipe_flake: Option<String>,

    /// Derivation built from the recipe flake
    #[arg(short = 'a', long)]
    pub recipe_action: Option<String>,

    /// Path of the produced image (defaults to ./<name>.raw)
    #[arg(short, long)]
    pub output_path: Option<PathBuf>,

    /// Never pull the build image
    #[arg(long)]
    pub no_pull: bool,

    /// Keep the build container for debugging
    #[arg(long)]
    pub keep: bool,
}

/// Arguments for `layer list`
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the mount command
#[derive(Parser, Debug)]
pub struct MountArgs {
    #[command(subcommand)]
    pub action: MountAction,

    /// Unmount instead of mounting
    #[arg(short, long, global = true)]
    pub unmount: bool,
}

/// Mount subcommands
#[derive(Subcommand, Debug)]
pub enum MountAction {
    /// Merge every layer's bin directory into one path
    Path {
        /// Mount target (defaults to mount.path)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Mount the layered store over the package store
    Store {
        /// Auxiliary path keeping the host store reachable (defaults to mount.bindmount_path)
        #[arg(short, long)]
        bindmount_path: Option<PathBuf>,
    },
}

/// Arguments for the add-to-path command
#[derive(Parser, Debug)]
pub struct AddToPathArgs {
    /// Shells to write a snippet for (bash, zsh, nu)
    #[arg(required = true, value_name = "SHELL")]
    pub shells: Vec<String>,

    /// Merged binary path (defaults to mount.path)
    #[arg(short, long)]
    pub path: Option<PathBuf>,

    /// rc file to write to instead of the shell's default
    #[arg(short, long)]
    pub rc_path: Option<PathBuf>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for list command
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}
