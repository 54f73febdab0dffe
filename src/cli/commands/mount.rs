//! Mount command - compose activated layers into the running system

use crate::cli::args::{MountAction, MountArgs};
use crate::config::Config;
use crate::error::BextResult;
use crate::mount::{IoctlAttributes, PathMount, StoreMount, SyscallMounts};
use crate::ui::{self, UiContext};

/// Execute the mount command
pub async fn execute(args: MountArgs, config: &Config) -> BextResult<()> {
    let ctx = UiContext::detect();
    let mounts = SyscallMounts::new();

    match args.action {
        MountAction::Path { path } => {
            let target = path.unwrap_or_else(|| config.mount.path.clone());
            let plan = PathMount::new(&config.paths.extensions_mount, &target)?;

            if args.unmount {
                plan.unmount(&mounts)?;
                ui::step_ok(&ctx, &format!("Unmounted {}", plan.target.display()));
            } else {
                let layers = plan.mount(&mounts)?;
                ui::step_ok_detail(
                    &ctx,
                    &format!("Mounted {}", plan.target.display()),
                    &format!("{} layer(s)", layers.len()),
                );
            }
        }
        MountAction::Store { bindmount_path } => {
            let bindmount = bindmount_path.unwrap_or_else(|| config.mount.bindmount_path.clone());
            let plan = StoreMount::new(
                &config.mount.store_path,
                &config.mount.layered_store_path,
                &bindmount,
            )?;

            if args.unmount {
                plan.unmount(&mounts)?;
                ui::step_ok(&ctx, &format!("Unmounted {}", plan.store.display()));
            } else {
                plan.mount(&mounts, &IoctlAttributes::new())?;
                ui::step_ok_detail(
                    &ctx,
                    &format!("Mounted {}", plan.store.display()),
                    &plan.layered_store.display().to_string(),
                );
            }
        }
    }

    Ok(())
}
