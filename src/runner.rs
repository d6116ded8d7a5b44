use crate::builtin::Builtins;
use crate::command::{CommandResult, ExecutableCommand, ExitCode, NOT_FOUND};
use crate::error::ShellError;
use crate::external::ExternalCommand;
use crate::finder::{CommandFinder, CommandSearchResult};
use crate::io::{StageInput, StageOutput};
use crate::parser::{self, CommandContent, PipelineCommand, SimpleCommand, SimpleList};
use crate::script::ScriptCommand;
use crate::session::Session;
use crate::transform::{self, WordTransformer};
use std::ffi::OsString;
use std::io::Write;
use std::sync::Arc;
use std::thread;
use tracing::debug;

/// Runs one line of input. Prompts, backtick substitution and sub-shells all
/// come back through this entry point.
pub trait LineRunner {
    /// `inherit_io` connects the line to the terminal; otherwise its output is
    /// captured into the result.
    ///
    /// Only a failed command substitution or an I/O failure of the shell itself
    /// is returned as `Err`; failing commands produce a non-zero result.
    fn run_line(
        &self,
        line: &str,
        session: &mut Session,
        inherit_io: bool,
    ) -> Result<CommandResult, ShellError>;
}

/// The line runner: parses, transforms, resolves and executes.
///
/// Cloning is cheap; clones share the builtin table, the resolvers and the
/// transformers.
#[derive(Clone)]
pub struct Shell {
    builtins: Arc<Builtins>,
    finder: Arc<CommandFinder>,
    transformers: Arc<Vec<Box<dyn WordTransformer>>>,
}

impl Shell {
    pub fn new(
        builtins: Arc<Builtins>,
        finder: CommandFinder,
        transformers: Vec<Box<dyn WordTransformer>>,
    ) -> Self {
        Self {
            builtins,
            finder: Arc::new(finder),
            transformers: Arc::new(transformers),
        }
    }

    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    /// Hands the raw line to the session's evaluator.
    fn evaluate(&self, line: &str, session: &Session) -> CommandResult {
        debug!("evaluating {:?}", line);
        match session.engine().eval(line) {
            Ok(value) => CommandResult::new(0, value.into_output(), None),
            Err(e) => CommandResult::new(1, None, Some(e.to_string())),
        }
    }

    fn transform(&self, list: &mut SimpleList, session: &mut Session) -> Result<(), ShellError> {
        for command in list.simple_commands_mut() {
            transform::transform_command(&self.transformers, command, self, session)?;
        }
        Ok(())
    }

    /// Runs `list` on its own thread with a snapshot of the session. The
    /// outcome is only logged.
    fn run_background(&self, list: SimpleList, session: &Session) -> Result<CommandResult, ShellError> {
        let shell = self.clone();
        let mut snapshot = session.clone();
        thread::Builder::new()
            .name("kash-bg".to_string())
            .spawn(move || match shell.run_list(&list, &mut snapshot, false) {
                Ok(r) => debug!(code = r.return_code, "background line finished"),
                Err(e) => debug!("background line failed: {}", e),
            })?;
        Ok(CommandResult::success())
    }

    /// Runs every pipeline of `list` in order. Captured output is concatenated;
    /// the return code is the last pipeline's.
    fn run_list(
        &self,
        list: &SimpleList,
        session: &mut Session,
        inherit_io: bool,
    ) -> Result<CommandResult, ShellError> {
        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut code = 0;
        for pipeline in &list.content {
            let r = self.run_pipeline(pipeline, session, inherit_io)?;
            code = r.return_code;
            stdout.extend(r.stdout);
            stderr.extend(r.stderr);
            if session.should_exit {
                break;
            }
        }
        let non_empty = |s: String| if s.is_empty() { None } else { Some(s) };
        Ok(CommandResult::new(code, non_empty(stdout), non_empty(stderr)))
    }

    /// Connects the stages of `pipeline`, each stage's stdout feeding the next
    /// stage's stdin.
    fn run_pipeline(
        &self,
        pipeline: &PipelineCommand,
        session: &mut Session,
        inherit_io: bool,
    ) -> Result<CommandResult, ShellError> {
        let Some((last, init)) = pipeline.content.split_last() else {
            return Ok(CommandResult::success());
        };
        let mut stderr = if inherit_io {
            StageOutput::inherit_stderr()
        } else {
            StageOutput::capture()
        };
        let mut input = if inherit_io {
            StageInput::Inherit
        } else {
            StageInput::empty()
        };

        for stage in init {
            let mut out = StageOutput::capture();
            self.run_stage(stage, input, &mut out, &mut stderr, session)?;
            input = StageInput::bytes(out.take_bytes());
        }

        let mut stdout = if inherit_io {
            StageOutput::inherit_stdout()
        } else {
            StageOutput::capture()
        };
        let code = self.run_stage(last, input, &mut stdout, &mut stderr, session)?;
        Ok(CommandResult::new(code, stdout.into_text(), stderr.into_text()))
    }

    fn run_stage(
        &self,
        stage: &CommandContent,
        stdin: StageInput,
        stdout: &mut StageOutput,
        stderr: &mut StageOutput,
        session: &mut Session,
    ) -> Result<ExitCode, ShellError> {
        match stage {
            CommandContent::Simple(command) => self.run_simple(command, stdin, stdout, stderr, session),
            CommandContent::SubShell(inner) => {
                // `exit` ends the sub-shell only.
                let exiting = session.should_exit;
                let r = self.run_line(inner, session, !stdout.is_captured());
                session.should_exit = exiting;
                let r = r?;
                if let Some(out) = &r.stdout {
                    stdout.write_all(out.as_bytes())?;
                }
                if let Some(err) = &r.stderr {
                    stderr.write_all(err.as_bytes())?;
                }
                Ok(r.return_code)
            }
        }
    }

    fn run_simple(
        &self,
        command: &SimpleCommand,
        stdin: StageInput,
        stdout: &mut StageOutput,
        stderr: &mut StageOutput,
        session: &mut Session,
    ) -> Result<ExitCode, ShellError> {
        let Some((name, args)) = command.words.split_first() else {
            return Ok(0);
        };
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        let executable = self
            .finder
            .find_command(name, session)
            .and_then(|found| self.instantiate(found, &args));
        let Some(executable) = executable else {
            writeln!(stderr, "kash: command not found: {}", name)?;
            return Ok(NOT_FOUND);
        };

        match executable.execute(stdin, stdout, stderr, session) {
            Ok(code) => Ok(code),
            Err(e) => {
                writeln!(stderr, "{}: {:#}", name, e)?;
                Ok(1)
            }
        }
    }

    fn instantiate(
        &self,
        found: CommandSearchResult,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        match found {
            CommandSearchResult::Builtin { name } => self.builtins.create(&name, args),
            CommandSearchResult::Script { path } => Some(Box::new(ScriptCommand::new(path))),
            CommandSearchResult::Executable { path } => Some(Box::new(ExternalCommand::new(
                path,
                args.iter().map(OsString::from).collect(),
            ))),
        }
    }
}

impl Default for Shell {
    /// The builtin table, resolvers and transformers the binary runs with.
    fn default() -> Self {
        let builtins = Arc::new(Builtins::default());
        let finder = CommandFinder::with_builtins(builtins.clone());
        Self::new(builtins, finder, transform::default_transformers())
    }
}

impl LineRunner for Shell {
    fn run_line(
        &self,
        line: &str,
        session: &mut Session,
        inherit_io: bool,
    ) -> Result<CommandResult, ShellError> {
        let mut list = match parser::parse(line) {
            Ok(list) => list,
            Err(e) => {
                debug!("not shell syntax ({}): {:?}", e, line);
                return Ok(self.evaluate(line, session));
            }
        };
        if list.is_empty() {
            return Ok(CommandResult::success());
        }

        self.transform(&mut list, session)?;

        if let CommandContent::Simple(command) = &list.content[0].content[0] {
            let found = command
                .words
                .first()
                .and_then(|name| self.finder.find_command(name, session));
            if found.is_none() {
                return Ok(self.evaluate(line, session));
            }
        }

        if list.background {
            self.run_background(list, session)
        } else {
            self.run_list(&list, session, inherit_io)
        }
    }
}
