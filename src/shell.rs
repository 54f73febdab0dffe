//! Shell rc snippets exposing the merged layer path

use crate::error::{BextError, BextResult};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Shells bext can write a `PATH` snippet for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellKind {
    Bash,
    Zsh,
    Nu,
}

impl ShellKind {
    pub const ALL: [ShellKind; 3] = [ShellKind::Bash, ShellKind::Zsh, ShellKind::Nu];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Bash => "bash",
            Self::Zsh => "zsh",
            Self::Nu => "nu",
        }
    }

    /// Line appended to the rc file
    pub fn snippet(&self, path: &Path) -> String {
        let path = path.display();
        match self {
            Self::Bash | Self::Zsh => format!("[ -e {path} ] && PATH=\"$PATH:{path}\"\n"),
            Self::Nu => {
                format!("$env.PATH = ($env.PATH | split row (char esep) | append {path})\n")
            }
        }
    }

    /// Default rc file, relative to the user's home and config directories
    pub fn rc_path(&self, home: &Path, config: &Path) -> PathBuf {
        match self {
            Self::Bash => home.join(".bashrc"),
            Self::Zsh => home.join(".zshrc"),
            Self::Nu => config.join("config.nu"),
        }
    }

    /// Default rc file for the current user
    pub fn default_rc_path(&self) -> BextResult<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| BextError::Internal("could not determine home directory".to_string()))?;
        let config = dirs::config_dir().unwrap_or_else(|| home.join(".config"));
        Ok(self.rc_path(&home, &config))
    }
}

impl fmt::Display for ShellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ShellKind {
    type Err = BextError;

    /// Accepts bare names as well as shell paths such as `/usr/bin/zsh`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim_end_matches('/');
        let base = Path::new(trimmed)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(trimmed);

        Self::ALL
            .into_iter()
            .find(|k| k.name() == base)
            .ok_or_else(|| BextError::UnknownShell {
                shell: base.to_string(),
                valid: Self::ALL.map(|k| k.name()).join(", "),
            })
    }
}

/// Append `snippet` to `rc_path` unless an identical line is already there
///
/// Returns whether the file was changed.
pub fn append_snippet(rc_path: &Path, snippet: &str) -> BextResult<bool> {
    let existing = match std::fs::read_to_string(rc_path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(BextError::io(format!("reading {}", rc_path.display()), e)),
    };

    let line = snippet.trim_end();
    if existing.lines().any(|l| l.trim_end() == line) {
        debug!(rc = %rc_path.display(), "Snippet already present");
        return Ok(false);
    }

    if let Some(parent) = rc_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| BextError::io(format!("creating {}", parent.display()), e))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(rc_path)
        .map_err(|e| BextError::io(format!("opening {}", rc_path.display()), e))?;

    let mut content = String::new();
    if !existing.is_empty() && !existing.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(snippet);

    file.write_all(content.as_bytes())
        .map_err(|e| BextError::io(format!("writing {}", rc_path.display()), e))?;
    Ok(true)
}
