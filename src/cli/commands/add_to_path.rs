//! Add-to-path command - write PATH snippets into shell rc files

use crate::cli::args::AddToPathArgs;
use crate::config::Config;
use crate::error::{BextError, BextResult};
use crate::shell::{append_snippet, ShellKind};
use crate::ui::{self, UiContext};
use tracing::{info, warn};

/// Execute the add-to-path command
pub async fn execute(args: AddToPathArgs, config: &Config) -> BextResult<()> {
    let ctx = UiContext::detect();

    if args.rc_path.is_some() && args.shells.len() > 1 {
        return Err(BextError::InvalidInput(
            "--rc-path can only be used with a single shell".to_string(),
        ));
    }

    // Reject unknown shells before touching any rc file
    let shells = args
        .shells
        .iter()
        .map(|s| s.parse::<ShellKind>())
        .collect::<BextResult<Vec<_>>>()?;

    let path = args.path.unwrap_or_else(|| config.mount.path.clone());

    for shell in shells {
        let rc_path = match args.rc_path {
            Some(ref p) => crate::store::blob::clean_path(p)?,
            None => shell.default_rc_path()?,
        };

        let changed = append_snippet(&rc_path, &shell.snippet(&path)).inspect_err(|e| {
            warn!(source = %shell, target = %rc_path.display(), error = %e, "Failed writing {} snippet", shell);
        })?;

        if changed {
            info!(shell = %shell, rc = %rc_path.display(), "Successfully written snippet");
            ui::step_ok(&ctx, &format!("Added {} snippet to {}", shell, rc_path.display()));
        } else {
            ui::step_info(&ctx, &format!("{} already has the {} snippet", rc_path.display(), shell));
        }
    }

    Ok(())
}
