//! Terminal output
//!
//! Interactive terminals get `cliclack` framing and an `indicatif` stage
//! bar; CI and piped runs fall back to plain tagged lines.
//!
//! ```rust,ignore
//! use kiln::ui::{self, StageProgress, UiContext};
//!
//! let ctx = UiContext::detect();
//! let progress = StageProgress::new(&ctx, "shop");
//! let report = pipeline.run(&request, &|stage| progress.on_stage(stage)).await;
//! progress.finish();
//! ui::step_ok_detail(&ctx, "Built", "build/shop.data (1.2 MB)");
//! ```

mod context;
mod output;
mod progress;
mod prompts;

pub use context::UiContext;
pub use output::{
    intro, key_value, outro_success, remark, step_error, step_info, step_ok, step_ok_detail,
    step_warn_hint, tool_output,
};
pub use progress::{StageProgress, TaskSpinner};
pub use prompts::confirm;
