//! Config command - show the effective configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::KilnResult;

/// Execute the config command
pub async fn execute(args: ConfigArgs, manager: &ConfigManager, config: &Config) -> KilnResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => print!("{}", render(config)?),
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
    }
    Ok(())
}

/// Effective configuration as TOML, defaults filled in
fn render(config: &Config) -> KilnResult<String> {
    Ok(toml::to_string_pretty(config)?)
}
