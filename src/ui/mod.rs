//! UI module for consistent CLI output
//!
//! Uses `cliclack` log lines in interactive terminals and `indicatif` bars
//! for per-item batch progress, with automatic fallback to plain output in
//! CI/non-interactive environments.
//!
//! # Example
//!
//! ```rust,ignore
//! use bext::ui::{self, BatchProgress, UiContext};
//!
//! let ctx = UiContext::detect().with_progress(!config.general.no_progress);
//! let progress = BatchProgress::new(&ctx);
//!
//! let item = progress.item("htop.raw");
//! item.set_message("Copying blob");
//! item.finish_ok("htop");
//!
//! ui::step_ok(&ctx, "Added htop.raw as htop");
//! ```

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{
    remark, section, step_error_detail, step_error_hint, step_info, step_ok, step_ok_detail,
    step_warn, step_warn_hint,
};
pub use progress::{BatchProgress, BuildProgress, ItemProgress};
