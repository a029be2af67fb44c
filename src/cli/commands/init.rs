//! Init command - create kiln.toml

use crate::cli::args::InitArgs;
use crate::config::CONFIG_FILE;
use crate::error::{KilnError, KilnResult};
use crate::ui::{self, UiContext};
use std::path::Path;
use tokio::fs;

/// Template for a new project config
const INIT_TEMPLATE: &str = r#"# Kiln project configuration
# Every setting is optional; the values shown are the defaults.

[project]
# name = "my-app"                    # defaults to the directory name
# source_dir = "src"
# bootstrap = "index.php"
# descriptors = ["composer.json", "composer.lock"]
# output_dir = "build"

[cache]
# root = "~/.cache/kiln"             # defaults to the system temp dir
# gc_days = 30

[workspace]
# root = "/tmp"

[tools.installer]
# program = "composer"
# args = ["install", "--no-dev", "--no-interaction", "--no-scripts", "--no-progress"]
# output_env = "COMPOSER_VENDOR_DIR"

[tools.compiler]
# program = "kilnc"
# args = ["{src}", "{src}"]

[tools.packager]
# program = "file_packager"
# args = ["{data}", "--preload", "{preload}", "--js-output={loader}"]
# mount_point = "/app"

[watch]
# debounce_ms = 2000
# paths = []                         # empty: source dir, bootstrap and descriptors
"#;

/// Execute the init command
pub async fn execute(args: InitArgs) -> KilnResult<()> {
    let ctx = UiContext::detect();

    let target_dir = match args.path {
        Some(ref p) => p.clone(),
        None => {
            std::env::current_dir().map_err(|e| KilnError::io("getting current directory", e))?
        }
    };

    let config_path = target_dir.join(CONFIG_FILE);

    if config_path.exists() && !args.force {
        return Err(KilnError::User(format!(
            "{} already exists. Use --force to overwrite.",
            config_path.display()
        )));
    }

    ensure_dir(&target_dir).await?;

    fs::write(&config_path, INIT_TEMPLATE)
        .await
        .map_err(|e| KilnError::io(format!("writing {}", config_path.display()), e))?;

    ui::step_ok_detail(
        &ctx,
        "Created project config",
        &config_path.display().to_string(),
    );

    Ok(())
}

async fn ensure_dir(dir: &Path) -> KilnResult<()> {
    fs::create_dir_all(dir)
        .await
        .map_err(|e| KilnError::io(format!("creating directory {}", dir.display()), e))
}
