//! Watch command - rebuild on change until Ctrl-C

use super::build::{print_report, run_with_progress};
use crate::build::{BuildPipeline, BuildRequest};
use crate::cli::args::WatchArgs;
use crate::config::{Config, ConfigManager};
use crate::error::KilnResult;
use crate::ui::{self, UiContext};
use crate::watch::{watch_targets, BuildTrigger, ExcludeSet, Watcher};
use async_trait::async_trait;
use std::time::Duration;

/// Runs the pipeline and reports each attempt to the terminal
struct PipelineTrigger {
    ctx: UiContext,
    pipeline: BuildPipeline,
    request: BuildRequest,
}

#[async_trait]
impl BuildTrigger for PipelineTrigger {
    async fn build(&self) -> KilnResult<()> {
        match run_with_progress(&self.ctx, &self.pipeline, &self.request).await {
            Ok(report) => {
                print_report(&self.ctx, &report);
                Ok(())
            }
            Err(e) => {
                if let Some(lines) = e.captured_output() {
                    ui::tool_output(lines);
                }
                ui::step_error(&self.ctx, &e.to_string());
                Err(e)
            }
        }
    }
}

/// Execute the watch command
pub async fn execute(args: WatchArgs, manager: &ConfigManager, config: &Config) -> KilnResult<()> {
    let ctx = UiContext::detect();
    let request = args.flags.request(manager.project_root(), config);
    let window = Duration::from_millis(args.debounce_ms.unwrap_or(config.watch.debounce_ms));

    let watcher = Watcher::new(
        watch_targets(&request, &config.watch.paths),
        ExcludeSet::new(&config.watch.exclude)?,
        window,
    );

    ui::intro(&ctx, &format!("Watching {}", request.project_name));
    for target in watcher.targets() {
        if target.files.is_empty() {
            ui::remark(&ctx, &target.path.display().to_string());
        }
        for file in &target.files {
            ui::remark(&ctx, &file.display().to_string());
        }
    }

    let trigger = PipelineTrigger {
        ctx: ctx.clone(),
        pipeline: BuildPipeline::from_config(config),
        request,
    };
    let summary = watcher.run(&trigger).await?;

    ui::outro_success(
        &ctx,
        &format!(
            "Stopped after {} build(s), {} failed",
            summary.builds, summary.failures
        ),
    );
    Ok(())
}
