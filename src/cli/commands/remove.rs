//! Remove command - delete layers or single blobs from the cache

use crate::activation::ExtensionStore;
use crate::batch::run_batch;
use crate::cli::args::RemoveArgs;
use crate::config::Config;
use crate::error::{BextError, BextResult};
use crate::store::LayerCache;
use crate::ui::{self, UiContext};

/// Execute the layer remove command
pub async fn execute(args: RemoveArgs, config: &Config) -> BextResult<()> {
    let ctx = super::ui_context(config);
    let cache = LayerCache::new(&config.paths.cache_dir)?;

    if args.hashes.is_empty() {
        remove_layers(&ctx, cache, args, config).await
    } else {
        remove_blobs(&ctx, cache, args, config).await
    }
}

async fn remove_layers(
    ctx: &UiContext,
    cache: LayerCache,
    args: RemoveArgs,
    config: &Config,
) -> BextResult<()> {
    let extensions = ExtensionStore::new(&config.paths.extensions_dir)?;

    if args.dry_run {
        for layer in &args.targets {
            let dir = cache.layer_dir(layer);
            if dir.is_dir() {
                ui::step_info(ctx, &format!("Would remove {}", dir.display()));
                if extensions.is_active(layer) {
                    ui::remark(ctx, &format!("and deactivate {}", layer));
                }
            } else {
                ui::step_warn(ctx, &format!("Layer {} is not cached", layer));
            }
        }
        return Ok(());
    }

    let report = run_batch("remove", args.targets, move |layer| {
        cache.remove_layer(layer, &extensions)
    })
    .await;

    super::report_batch(ctx, &report, |layer, removed| match &removed.deactivated {
        Some(_) => format!("Removed and deactivated {}", layer),
        None => format!("Removed {}", layer),
    });
    report.into_result(config.general.strict)
}

async fn remove_blobs(
    ctx: &UiContext,
    cache: LayerCache,
    args: RemoveArgs,
    config: &Config,
) -> BextResult<()> {
    let layer = match args.targets.as_slice() {
        [layer] => layer.clone(),
        _ => {
            return Err(BextError::InvalidInput(
                "--hash can only be used with exactly one layer".to_string(),
            ))
        }
    };

    if args.dry_run {
        for hash in &args.hashes {
            let path = cache.blob_path(&layer, hash)?;
            if path.is_file() {
                ui::step_info(ctx, &format!("Would remove {}", path.display()));
            } else {
                ui::step_warn(ctx, &format!("Blob {} is not cached for {}", hash, layer));
            }
        }
        return Ok(());
    }

    let report = run_batch("remove", args.hashes, move |hash| {
        cache.remove_blob(&layer, hash)
    })
    .await;

    super::report_batch(ctx, &report, |_, path| format!("Removed {}", path.display()));
    report.into_result(config.general.strict)
}
