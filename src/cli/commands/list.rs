//! List command - show cached layers

use crate::activation::ExtensionStore;
use crate::cli::args::{ListArgs, OutputFormat};
use crate::config::Config;
use crate::error::BextResult;
use crate::store::{LayerCache, LayerInfo};
use crate::ui::{self, UiContext};
use console::style;
use serde::Serialize;

/// A cached layer together with its activation state
#[derive(Debug, Serialize)]
struct LayerRow {
    #[serde(flatten)]
    info: LayerInfo,
    active: bool,
}

/// Execute the layer list command
pub async fn execute(args: ListArgs, config: &Config) -> BextResult<()> {
    let cache = LayerCache::new(&config.paths.cache_dir)?;
    let extensions = ExtensionStore::new(&config.paths.extensions_dir)?;

    let rows: Vec<LayerRow> = cache
        .list()?
        .into_iter()
        .map(|info| LayerRow {
            active: extensions.is_active(&info.name),
            info,
        })
        .collect();

    if rows.is_empty() {
        match args.format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Plain => {}
            OutputFormat::Table => {
                let ctx = UiContext::detect();
                ui::step_info(&ctx, "No cached layers");
            }
        }
        return Ok(());
    }

    match args.format {
        OutputFormat::Table => print_table(&rows),
        OutputFormat::Json => print_json(&rows)?,
        OutputFormat::Plain => print_plain(&rows),
    }

    Ok(())
}

fn print_table(rows: &[LayerRow]) {
    let ctx = UiContext::detect();
    ui::section(&ctx, "Layers");

    println!(
        "{:<24} {:<8} {:<10} {:<14} {:<12}",
        style("NAME").bold(),
        style("BLOBS").bold(),
        style("SIZE").bold(),
        style("CURRENT").bold(),
        style("STATUS").bold()
    );
    println!("{}", "-".repeat(72));

    for row in rows {
        let size: u64 = row.info.blobs.iter().map(|b| b.size_bytes).sum();
        let current = row
            .info
            .current
            .as_deref()
            .map(|h| h[..12.min(h.len())].to_string())
            .unwrap_or_else(|| "-".to_string());
        let status = if row.active {
            style("active").green()
        } else {
            style("inactive").dim()
        };

        println!(
            "{:<24} {:<8} {:<10} {:<14} {:<12}",
            row.info.name,
            row.info.blobs.len(),
            format_size(size),
            current,
            status
        );
    }

    println!();
    println!("{} layer(s)", rows.len());
}

fn print_json(rows: &[LayerRow]) -> BextResult<()> {
    let json = serde_json::to_string_pretty(rows)?;
    println!("{}", json);
    Ok(())
}

fn print_plain(rows: &[LayerRow]) {
    for row in rows {
        println!("{}", row.info.name);
    }
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
