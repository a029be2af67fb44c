//! External tool invocation
//!
//! The dependency installer, compiler and packager are black-box
//! executables. Each is modelled as a trait with one operation returning a
//! [`ToolOutput`], so the pipeline can be exercised with fakes:
//! - [`Installer`]: populate a vendor directory from the project descriptors
//! - [`Compiler`]: transform a source subtree in place
//! - [`Packager`]: serialize a workspace into a data artifact plus loader

mod command;
pub mod compiler;
pub mod installer;
pub mod packager;

pub use command::{expand, CommandSpec};
pub use compiler::{
    compile, find_side_files, CommandCompiler, CompileOptions, CompileResult, Compiler,
    SIDE_FILE_SUFFIX,
};
pub use installer::{CommandInstaller, Installer};
pub use packager::{pack, real_path, CommandPackager, PackRequest, Packager};

use tokio::io::{AsyncBufReadExt, BufReader};

/// Exit status and combined stdout/stderr of a single tool run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code (`None` if terminated by a signal)
    pub code: Option<i32>,
    /// Output lines in arrival order
    pub lines: Vec<String>,
}

impl ToolOutput {
    /// Successful run with the given output
    pub fn success_with(lines: Vec<String>) -> Self {
        Self {
            code: Some(0),
            lines,
        }
    }

    /// Whether the tool exited with status 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Stream stdout+stderr from a child process, calling `on_output` for each line.
///
/// Returns all collected output lines in arrival order.
pub(crate) async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_output: &(dyn Fn(&str) + Send + Sync),
) -> Vec<String> {
    let mut all_output = Vec::new();
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return all_output;
    };

    let mut stderr_reader = BufReader::new(stderr).lines();
    let mut stdout_reader = BufReader::new(stdout).lines();

    let mut stderr_done = false;
    let mut stdout_done = false;

    while !stderr_done || !stdout_done {
        tokio::select! {
            line = stderr_reader.next_line(), if !stderr_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(&line);
                        all_output.push(line);
                    }
                    _ => stderr_done = true,
                }
            }
            line = stdout_reader.next_line(), if !stdout_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(&line);
                        all_output.push(line);
                    }
                    _ => stdout_done = true,
                }
            }
        }
    }

    all_output
}
