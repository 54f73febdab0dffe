//! Add command - copy layer files into the cache

use crate::batch::run_batch;
use crate::cli::args::AddArgs;
use crate::config::Config;
use crate::error::BextResult;
use crate::store::{AddOptions, LayerCache};
use crate::ui::BatchProgress;
use std::path::Path;

/// Execute the layer add command
pub async fn execute(args: AddArgs, config: &Config) -> BextResult<()> {
    let ctx = super::ui_context(config);
    let cache = LayerCache::open(&config.paths.cache_dir)?;
    let options = AddOptions {
        override_existing: args.override_existing,
        verify_checksum: !args.no_checksum,
        update_current: !args.no_symlink,
    };

    let targets = args
        .files
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    let progress = BatchProgress::new(&ctx);

    let report = run_batch("add", targets, move |target| {
        let item = progress.item(target);
        let result = cache.add_with(Path::new(target), options, |stage| item.set_message(stage));
        match &result {
            Ok(blob) => item.finish_ok(&blob.layer),
            Err(e) => item.finish_err(&e.to_string()),
        }
        result
    })
    .await;

    super::report_batch(&ctx, &report, |target, blob| {
        let short = &blob.hash[..12.min(blob.hash.len())];
        if blob.copied {
            format!("Added {} as {} ({})", target, blob.layer, short)
        } else {
            format!("{} already cached as {} ({})", target, blob.layer, short)
        }
    });
    report.into_result(config.general.strict)
}
