use thiserror::Error;

/// Failures that abort the processing of a whole line.
///
/// Anything that goes wrong *inside* a command (bad arguments, a process that
/// cannot be spawned, an evaluator error) is folded into the
/// [`CommandResult`](crate::command::CommandResult) instead.
#[derive(Debug, Error)]
pub enum ShellError {
    /// A backtick-quoted word ran a command that failed. Carries its stderr.
    #[error("{0}")]
    CommandSubstitution(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
