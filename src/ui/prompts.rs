//! Confirmation prompts with CI/non-interactive fallback

use super::context::UiContext;
use crate::error::{KilnError, KilnResult};

/// Ask before a destructive action
///
/// `--yes` approves without asking. A non-interactive session cannot
/// answer and declines.
pub async fn confirm(ctx: &UiContext, message: &str) -> KilnResult<bool> {
    if ctx.auto_yes() {
        return Ok(true);
    }
    if !ctx.is_interactive() {
        return Ok(false);
    }

    let message = message.to_string();
    tokio::task::spawn_blocking(move || {
        cliclack::confirm(&message).initial_value(false).interact()
    })
    .await
    .map_err(|e| KilnError::User(format!("Prompt task failed: {}", e)))?
    .map_err(|e| KilnError::User(format!("Prompt failed: {}", e)))
}
