//! CLI command implementations

pub mod activate;
pub mod add;
pub mod add_to_path;
pub mod build;
pub mod clean;
pub mod config;
pub mod deactivate;
pub mod list;
pub mod mount;
pub mod remove;

pub use activate::execute as activate;
pub use add::execute as add;
pub use add_to_path::execute as add_to_path;
pub use build::execute as build;
pub use clean::execute as clean;
pub use config::execute as config;
pub use deactivate::execute as deactivate;
pub use list::execute as list;
pub use mount::execute as mount;
pub use remove::execute as remove;

use crate::batch::BatchReport;
use crate::config::Config;
use crate::ui::{self, UiContext};

/// UI context honouring the progress settings
pub(crate) fn ui_context(config: &Config) -> UiContext {
    UiContext::detect().with_progress(!config.general.no_progress)
}

/// Log a finished batch and print one step line per target
pub(crate) fn report_batch<T>(
    ctx: &UiContext,
    report: &BatchReport<T>,
    describe: impl Fn(&str, &T) -> String,
) {
    report.log();

    for outcome in report.outcomes() {
        match &outcome.result {
            Ok(value) => ui::step_ok(ctx, &describe(&outcome.target, value)),
            Err(e) => match e.hint() {
                Some(hint) => ui::step_error_hint(ctx, &format!("{}: {}", outcome.target, e), hint),
                None => ui::step_error_detail(ctx, &outcome.target, &e.to_string()),
            },
        }
    }
}
