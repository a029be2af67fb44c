//! Progress indicators with CI fallback

use super::context::UiContext;
use crate::build::BuildStage;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// A task spinner with CI fallback
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    interactive: bool,
}

impl TaskSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
        }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            println!("{} {}", style("...").dim(), message);
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else {
            println!("{} {}", style("[OK]").green(), message);
        }
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.error(message);
        } else {
            println!("{} {}", style("[FAIL]").red(), message);
        }
    }
}

/// Stages shown on the progress bar, in pipeline order
const TRACKED_STAGES: &[BuildStage] = &[
    BuildStage::VendorResolving,
    BuildStage::WorkspacePopulating,
    BuildStage::Compiling,
    BuildStage::MetadataAggregating,
    BuildStage::Packaging,
];

/// Progress bar over pipeline stages.
///
/// An indicatif bar in interactive mode; one line per stage in CI.
pub struct StageProgress {
    bar: Option<ProgressBar>,
}

impl StageProgress {
    pub fn new(ctx: &UiContext, project: &str) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new(TRACKED_STAGES.len() as u64);
            let template = "  {spinner:.cyan} Building {prefix}  {bar:20.cyan/dim} {msg:.dim}  {elapsed:.dim}";
            let style = ProgressStyle::default_bar()
                .template(template)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                .progress_chars("━╸─");
            bar.set_style(style);
            bar.set_prefix(project.to_string());
            bar.enable_steady_tick(Duration::from_millis(120));
            Some(bar)
        } else {
            println!("Building {}...", project);
            None
        };
        Self { bar }
    }

    /// Advance to `stage`
    pub fn on_stage(&self, stage: BuildStage) {
        let Some(position) = stage_position(stage) else {
            return;
        };
        match self.bar {
            Some(ref bar) => {
                bar.set_position(position);
                bar.set_message(stage.to_string());
            }
            None => println!("  {} {}", style("-").dim(), stage),
        }
    }

    /// Finish and clear the progress bar
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

/// Zero-based bar position of a tracked stage
fn stage_position(stage: BuildStage) -> Option<u64> {
    TRACKED_STAGES
        .iter()
        .position(|s| *s == stage)
        .map(|i| i as u64)
}
