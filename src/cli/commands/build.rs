//! Build command - produce a layer image from a recipe

use crate::build::{build_layer, BuildRequest, PodmanBuilder};
use crate::cli::args::BuildArgs;
use crate::config::Config;
use crate::error::BextResult;
use crate::ui::{self, BuildProgress};

/// Execute the layer build command
pub async fn execute(args: BuildArgs, config: &Config) -> BextResult<()> {
    let ctx = super::ui_context(config);

    let mut settings = config.build.clone();
    if let Some(image) = args.image {
        settings.image = image;
    }
    if let Some(tag) = args.tag {
        settings.tag = tag;
    }
    if let Some(flake) = args.recipe_flake {
        settings.recipe_flake = flake;
    }
    if let Some(action) = args.recipe_action {
        settings.recipe_action = action;
    }

    let mut request = BuildRequest::new(&args.recipe, &settings, args.output_path.as_deref())?;
    request.pull = !args.no_pull;
    request.keep = args.keep;

    let runtime = PodmanBuilder::default();
    let progress = BuildProgress::new(&ctx, &request.recipe.name);

    let result = build_layer(
        &runtime,
        &request,
        &|stage| progress.on_stage(stage),
        &|line| progress.on_line(line),
    )
    .await;
    progress.finish();

    let image = result?;
    ui::step_ok_detail(
        &ctx,
        &format!("Built layer {}", request.recipe.name),
        &image.display().to_string(),
    );
    Ok(())
}
