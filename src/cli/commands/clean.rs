//! Clean command - delete blobs nothing points at

use crate::clean::CacheCleaner;
use crate::cli::args::CleanArgs;
use crate::config::Config;
use crate::error::BextResult;
use crate::store::LayerCache;
use crate::ui;

/// Execute the layer clean command
pub async fn execute(args: CleanArgs, config: &Config) -> BextResult<()> {
    let ctx = super::ui_context(config);
    let cache = LayerCache::new(&config.paths.cache_dir)?;
    let cleaner = CacheCleaner::new(&cache, &args.exclude)?;

    let report = cleaner.clean(args.dry_run).await?;

    let Some(deletions) = report.deletions else {
        let candidates: Vec<_> = report.plan.candidates().collect();
        if candidates.is_empty() {
            ui::step_info(&ctx, "Nothing to clean");
        }
        for path in candidates {
            ui::step_info(&ctx, &format!("Would clean {}", path.display()));
        }
        return Ok(());
    };

    if deletions.total() == 0 && report.removed_dirs.is_empty() {
        ui::step_info(&ctx, "Nothing to clean");
        return Ok(());
    }

    super::report_batch(&ctx, &deletions, |_, path| format!("Cleaned {}", path.display()));
    for dir in &report.removed_dirs {
        ui::remark(&ctx, &format!("Removed empty layer directory {}", dir.display()));
    }
    deletions.into_result(config.general.strict)
}
