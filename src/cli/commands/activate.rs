//! Activate command - link layers into the extension store

use crate::activation::ExtensionStore;
use crate::batch::run_batch;
use crate::cli::args::ActivateArgs;
use crate::config::Config;
use crate::error::BextResult;
use crate::store::LayerCache;
use crate::ui::BatchProgress;
use std::path::Path;

/// Execute the layer activate command
pub async fn execute(args: ActivateArgs, config: &Config) -> BextResult<()> {
    let ctx = super::ui_context(config);
    let extensions = ExtensionStore::open(&config.paths.extensions_dir)?;
    let cache = LayerCache::new(&config.paths.cache_dir)?;
    let override_existing = args.override_existing;
    let from_file = args.file;
    let progress = BatchProgress::new(&ctx);

    let report = run_batch("activate", args.targets, move |target| {
        let item = progress.item(target);
        item.set_message("Linking");
        let result = if from_file {
            extensions.activate_from_file(Path::new(target), override_existing)
        } else {
            extensions.activate_from_cache(&cache, target, override_existing)
        };
        match &result {
            Ok(_) => item.finish_ok("activated"),
            Err(e) => item.finish_err(&e.to_string()),
        }
        result
    })
    .await;

    super::report_batch(&ctx, &report, |target, link| {
        format!("Activated {} ({})", target, link.display())
    });
    report.into_result(config.general.strict)
}
