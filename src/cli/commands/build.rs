//! Build command - run the pipeline once

use crate::build::{BuildPipeline, BuildReport, BuildRequest};
use crate::cli::args::BuildArgs;
use crate::config::{Config, ConfigManager};
use crate::error::KilnResult;
use crate::fsutil::format_bytes;
use crate::ui::{self, StageProgress, UiContext};

/// Execute the build command
pub async fn execute(args: BuildArgs, manager: &ConfigManager, config: &Config) -> KilnResult<()> {
    let ctx = UiContext::detect();
    let request = args.flags.request(manager.project_root(), config);
    let pipeline = BuildPipeline::from_config(config);

    let report = run_with_progress(&ctx, &pipeline, &request).await?;
    print_report(&ctx, &report);
    Ok(())
}

/// Run one build with a stage progress bar
pub(crate) async fn run_with_progress(
    ctx: &UiContext,
    pipeline: &BuildPipeline,
    request: &BuildRequest,
) -> KilnResult<BuildReport> {
    let progress = StageProgress::new(ctx, &request.project_name);
    let result = pipeline
        .run(request, &|stage| progress.on_stage(stage))
        .await;
    progress.finish();
    result
}

/// Summarize a successful build
pub(crate) fn print_report(ctx: &UiContext, report: &BuildReport) {
    ui::step_ok_detail(
        ctx,
        &format!("Built {}", report.data_artifact.display()),
        &format_bytes(report.artifact_size),
    );
    if let Some(ref loader) = report.loader_artifact {
        ui::key_value(ctx, "Loader", &loader.display().to_string());
    }

    let cache_state = if report.cache_hit { "hit" } else { "miss" };
    ui::key_value(
        ctx,
        "Vendor cache",
        &format!("{} ({})", report.cache_entry.display(), cache_state),
    );

    if let Some(ref index) = report.debug_index {
        ui::key_value(
            ctx,
            "Debug metadata",
            &format!(
                "{} file(s), {} transform(s)",
                index.totals.file_count, index.totals.transforms
            ),
        );
    }

    ui::remark(
        ctx,
        &format!(
            "Workspace kept at {} ({:.1}s)",
            report.workspace.display(),
            report.duration.as_secs_f64()
        ),
    );
}
