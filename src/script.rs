use crate::command::{ExecutableCommand, ExitCode};
use crate::io::{StageInput, StageOutput};
use crate::session::Session;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::PathBuf;

/// A script file whose whole text is handed to the session's evaluator.
pub struct ScriptCommand {
    path: PathBuf,
}

impl ScriptCommand {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ExecutableCommand for ScriptCommand {
    fn execute(
        self: Box<Self>,
        _stdin: StageInput,
        stdout: &mut StageOutput,
        stderr: &mut StageOutput,
        session: &mut Session,
    ) -> Result<ExitCode> {
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("can't read script {}", self.path.display()))?;

        match session.engine().eval(&text) {
            Ok(value) => {
                if let Some(out) = value.into_output() {
                    writeln!(stdout, "{}", out)?;
                }
                Ok(0)
            }
            Err(e) => {
                writeln!(stderr, "{}: {}", self.path.display(), e)?;
                Ok(1)
            }
        }
    }
}
