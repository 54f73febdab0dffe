//! Progress indicators with CI fallback

use super::context::UiContext;
use crate::build::BuildStage;
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ";

/// Shared progress sink for a batch command
///
/// Cloned into every worker; each worker draws its own line. Without a
/// terminal (or with `--no-progress`) nothing is drawn at all.
#[derive(Clone)]
pub struct BatchProgress {
    multi: Option<MultiProgress>,
}

impl BatchProgress {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            multi: ctx.show_progress().then(MultiProgress::new),
        }
    }

    /// Start a progress line for one batch item
    pub fn item(&self, label: &str) -> ItemProgress {
        let bar = self.multi.as_ref().map(|multi| {
            let bar = multi.add(ProgressBar::new_spinner());
            bar.set_style(
                ProgressStyle::with_template("  {spinner:.cyan} {prefix:.bold} {msg:.dim}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_chars(TICK_CHARS),
            );
            bar.set_prefix(label.to_string());
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        });
        ItemProgress { bar }
    }
}

/// Progress line of a single batch item
pub struct ItemProgress {
    bar: Option<ProgressBar>,
}

impl ItemProgress {
    pub fn set_message(&self, message: impl std::fmt::Display) {
        if let Some(ref bar) = self.bar {
            bar.set_message(message.to_string());
        }
    }

    pub fn finish_ok(&self, message: &str) {
        if let Some(ref bar) = self.bar {
            bar.set_style(
                ProgressStyle::with_template("  {prefix:.bold} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.finish_with_message(format!("{} {}", style("✓").green(), message));
        }
    }

    pub fn finish_err(&self, message: &str) {
        if let Some(ref bar) = self.bar {
            bar.set_style(
                ProgressStyle::with_template("  {prefix:.bold} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.finish_with_message(format!("{} {}", style("✗").red(), message));
        }
    }
}

/// Spinner for layer builds.
///
/// Shows the current build stage and the latest nix log line in interactive
/// mode, plain stage lines in CI.
pub struct BuildProgress {
    bar: Option<ProgressBar>,
}

impl BuildProgress {
    pub fn new(ctx: &UiContext, label: &str) -> Self {
        let bar = if ctx.show_progress() {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("  {spinner:.cyan} Building {prefix}  {msg:.dim}  {elapsed:.dim}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_chars(TICK_CHARS),
            );
            bar.set_prefix(label.to_string());
            bar.enable_steady_tick(Duration::from_millis(120));
            Some(bar)
        } else {
            println!("Building {}...", label);
            None
        };
        Self { bar }
    }

    pub fn on_stage(&self, stage: BuildStage) {
        match self.bar {
            Some(ref bar) => bar.set_message(stage.to_string()),
            None => println!("  {} {}", style("...").dim(), stage),
        }
    }

    /// Process a build output line
    pub fn on_line(&self, line: String) {
        if let Some(ref bar) = self.bar {
            let trimmed = line.trim();
            if !trimmed.is_empty() && !is_build_noise(trimmed) {
                bar.set_message(truncate(trimmed, 60));
            }
        }
    }

    /// Finish and clear the spinner.
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

/// Nix and shell trace lines that say nothing about build progress
fn is_build_noise(line: &str) -> bool {
    line.starts_with("+ ")
        || line.starts_with("warning: Git tree")
        || line.starts_with("evaluation warning:")
}

fn truncate(line: &str, max: usize) -> String {
    if line.chars().count() <= max {
        return line.to_string();
    }
    let head: String = line.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", head)
}
