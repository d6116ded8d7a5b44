use crate::io::{StageInput, StageOutput};
use crate::session::Session;
use anyhow::Result;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
pub type ExitCode = i32;

/// Return code used when no resolver knows a command.
pub const NOT_FOUND: ExitCode = 127;

/// Terminal value of running one line.
///
/// `stdout` and `stderr` are only set when the output was captured; output that
/// went straight to the terminal is not repeated here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub return_code: ExitCode,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl CommandResult {
    pub fn new(return_code: ExitCode, stdout: Option<String>, stderr: Option<String>) -> Self {
        Self {
            return_code,
            stdout,
            stderr,
        }
    }

    /// The no-op result of a blank line.
    pub fn success() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.return_code == 0
    }

    /// Print whatever was captured to the user's terminal.
    pub fn display(&self) {
        if let Some(out) = &self.stdout {
            if out.ends_with('\n') {
                print!("{}", out);
            } else {
                println!("{}", out);
            }
        }
        if let Some(err) = &self.stderr {
            if err.ends_with('\n') {
                eprint!("{}", err);
            } else {
                eprintln!("{}", err);
            }
        }
    }
}

/// Object-safe trait for anything the shell can execute as one pipeline stage.
///
/// Implemented by builtins via a blanket impl, by external programs and by
/// script files.
pub trait ExecutableCommand {
    /// Executes the command.
    ///
    /// An `Err` means the command could not run at all; the runner turns it into
    /// stderr text and a non-zero code.
    fn execute(
        self: Box<Self>,
        stdin: StageInput,
        stdout: &mut StageOutput,
        stderr: &mut StageOutput,
        session: &mut Session,
    ) -> Result<ExitCode>;
}

/// Factory that creates a command instance from a name and its arguments.
///
/// Returns `None` when the factory doesn't recognize the `name`.
pub trait CommandFactory: Send + Sync {
    /// Name the factory answers to.
    fn name(&self) -> &'static str;

    /// Attempt to create a command instance for the provided name and arguments.
    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>>;
}
