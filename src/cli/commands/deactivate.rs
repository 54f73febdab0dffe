//! Deactivate command - remove activation links

use crate::activation::ExtensionStore;
use crate::batch::run_batch;
use crate::cli::args::DeactivateArgs;
use crate::config::Config;
use crate::error::BextResult;

/// Execute the layer deactivate command
pub async fn execute(args: DeactivateArgs, config: &Config) -> BextResult<()> {
    let ctx = super::ui_context(config);
    let extensions = ExtensionStore::new(&config.paths.extensions_dir)?;

    let report = run_batch("deactivate", args.targets, move |target| {
        extensions.deactivate(target)
    })
    .await;

    super::report_batch(&ctx, &report, |target, _| format!("Deactivated {}", target));
    report.into_result(config.general.strict)
}
