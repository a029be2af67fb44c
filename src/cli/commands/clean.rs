//! Clean command - remove retained workspaces of this project

use crate::cli::args::CleanArgs;
use crate::config::{Config, ConfigManager};
use crate::error::KilnResult;
use crate::fsutil::{dir_size, format_bytes};
use crate::ui::{self, TaskSpinner, UiContext};
use crate::workspace::Workspace;

/// Execute the clean command
pub async fn execute(args: CleanArgs, manager: &ConfigManager, config: &Config) -> KilnResult<()> {
    let ctx = UiContext::detect().with_auto_yes(args.yes);
    let project = config.project_name(manager.project_root());
    let root = config.workspace_root();

    let retained = Workspace::list_retained(&root, &project).await?;
    if retained.is_empty() {
        ui::step_info(&ctx, &format!("No retained workspaces for {}", project));
        return Ok(());
    }

    let total: u64 = retained.iter().map(|w| dir_size(w.path())).sum();
    println!(
        "Found {} retained workspace(s) for {} ({}):",
        retained.len(),
        project,
        format_bytes(total)
    );
    for workspace in &retained {
        ui::remark(&ctx, &workspace.path().display().to_string());
    }

    if !ui::confirm(&ctx, "Remove these workspaces?").await? {
        ui::step_warn_hint(&ctx, "Aborted", "Pass --yes to skip the prompt");
        return Ok(());
    }

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start("Removing workspaces...");
    for workspace in &retained {
        if let Err(e) = workspace.destroy().await {
            spinner.stop_error(&format!("Failed to remove {}", workspace.path().display()));
            return Err(e);
        }
    }
    spinner.stop(&format!(
        "Removed {} workspace(s), freed {}",
        retained.len(),
        format_bytes(total)
    ));
    Ok(())
}
