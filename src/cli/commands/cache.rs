//! Cache command - inspect and prune the vendor cache

use crate::cache::{CacheEntry, VendorCache};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::{Config, ConfigManager};
use crate::error::KilnResult;
use crate::fsutil::{dir_size, format_bytes};
use crate::tools::CommandInstaller;
use crate::ui::{self, TaskSpinner, UiContext};
use chrono::Utc;
use console::style;
use std::sync::Arc;

/// Execute the cache command
pub async fn execute(args: CacheArgs, manager: &ConfigManager, config: &Config) -> KilnResult<()> {
    let cache = VendorCache::new(
        config.cache_root(),
        Arc::new(CommandInstaller::new(config.tools.installer.clone())),
    );
    let project = config.project_name(manager.project_root());

    match args.action {
        CacheAction::List { format, all } => {
            let scope = (!all).then_some(project.as_str());
            list_entries(&cache, scope, format).await
        }
        CacheAction::Info => show_project_info(&cache, manager, config).await,
        CacheAction::Gc { days, dry_run } => {
            gc_entries(&cache, &project, days.unwrap_or(config.cache.gc_days), dry_run).await
        }
        CacheAction::Clear { all, yes } => {
            let scope = (!all).then_some(project.as_str());
            clear_entries(&cache, scope, yes).await
        }
    }
}

async fn list_entries(
    cache: &VendorCache,
    project: Option<&str>,
    format: OutputFormat,
) -> KilnResult<()> {
    let entries = cache.entries(project).await?;

    if entries.is_empty() {
        match format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Plain => {}
            OutputFormat::Table => println!("No cache entries in {}.", cache.root().display()),
        }
        return Ok(());
    }

    match format {
        OutputFormat::Table => print_entry_table(&entries),
        OutputFormat::Json => print_entry_json(&entries)?,
        OutputFormat::Plain => entries.iter().for_each(|e| println!("{}", e.name)),
    }
    Ok(())
}

fn print_entry_table(entries: &[CacheEntry]) {
    println!("{:<44} {:<14} {:<10} {:<20}", "ENTRY", "KEY", "SIZE", "CREATED");
    println!("{}", "-".repeat(88));

    for entry in entries {
        println!(
            "{:<44} {:<14} {:<10} {:<20}",
            entry.name,
            entry.key,
            format_bytes(dir_size(&entry.path)),
            entry.created_at.format("%Y-%m-%d %H:%M")
        );
    }

    println!();
    println!("Total: {} entr{}", entries.len(), if entries.len() == 1 { "y" } else { "ies" });
}

fn print_entry_json(entries: &[CacheEntry]) -> KilnResult<()> {
    #[derive(serde::Serialize)]
    struct EntryJson<'a> {
        name: &'a str,
        project: &'a str,
        key: &'a str,
        path: String,
        size_bytes: u64,
        created_at: String,
    }

    let json: Vec<EntryJson<'_>> = entries
        .iter()
        .map(|e| EntryJson {
            name: &e.name,
            project: &e.project,
            key: &e.key,
            path: e.path.display().to_string(),
            size_bytes: dir_size(&e.path),
            created_at: e.created_at.to_rfc3339(),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

/// Show the key the current descriptors hash to and whether it is cached
async fn show_project_info(
    cache: &VendorCache,
    manager: &ConfigManager,
    config: &Config,
) -> KilnResult<()> {
    let ctx = UiContext::detect();
    let root = manager.project_root();
    let project = config.project_name(root);
    let descriptors: Vec<_> = config
        .project
        .descriptors
        .iter()
        .map(|d| root.join(d))
        .collect();

    let resolved = cache.lookup(&project, &descriptors).await?;

    ui::key_value(&ctx, "Project", &project);
    for descriptor in &descriptors {
        ui::key_value(&ctx, "Descriptor", &descriptor.display().to_string());
    }
    ui::key_value(&ctx, "Key", resolved.key.as_str());
    ui::key_value(&ctx, "Entry", &resolved.path.display().to_string());

    if resolved.hit {
        ui::step_ok_detail(&ctx, "Cached", &format_bytes(dir_size(&resolved.path)));
    } else {
        ui::step_info(&ctx, "Not cached (the next build installs dependencies)");
    }
    Ok(())
}

/// Remove this project's entries older than `days`
async fn gc_entries(cache: &VendorCache, project: &str, days: u32, dry_run: bool) -> KilnResult<()> {
    if days == 0 {
        println!("Cache GC is disabled (gc_days = 0)");
        return Ok(());
    }

    let stale = cache.evict_older_than(days, Some(project), true).await?;
    if stale.is_empty() {
        println!("No cache entries older than {} days.", days);
        return Ok(());
    }

    println!("Found {} entr(ies) older than {} days:", stale.len(), days);
    for entry in &stale {
        let age_days = (Utc::now() - entry.created_at).num_days();
        println!("  {} {} ({} days old)", style("•").red(), entry.name, age_days);
    }

    if dry_run {
        println!();
        println!("Dry run - no entries removed.");
        return Ok(());
    }

    let ctx = UiContext::detect();
    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start("Removing cache entries...");
    for entry in &stale {
        if let Err(e) = cache.remove(entry).await {
            spinner.stop_error(&format!("Failed to remove {}", entry.name));
            return Err(e);
        }
    }
    spinner.stop(&format!("Removed {} cache entr(ies)", stale.len()));
    Ok(())
}

/// Remove every entry in scope after confirmation
async fn clear_entries(cache: &VendorCache, project: Option<&str>, yes: bool) -> KilnResult<()> {
    let entries = cache.entries(project).await?;
    if entries.is_empty() {
        println!("No cache entries to clear.");
        return Ok(());
    }

    println!("This will remove {} cache entr(ies):", entries.len());
    for entry in &entries {
        println!("  {} {}", style("•").red(), entry.name);
    }
    println!();

    let ctx = UiContext::detect().with_auto_yes(yes);
    if !ui::confirm(&ctx, "Remove these entries?").await? {
        ui::step_warn_hint(&ctx, "Aborted", "Pass --yes to skip the prompt");
        return Ok(());
    }

    let removed = cache.clear(project).await?;
    ui::step_ok(&ctx, &format!("Cleared {} cache entr(ies)", removed));
    Ok(())
}
