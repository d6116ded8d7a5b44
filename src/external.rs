use crate::command::{ExecutableCommand, ExitCode};
use crate::io::{StageInput, StageOutput};
use crate::session::Session;
use anyhow::{Context, Result};
use std::ffi::{OsStr, OsString};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::thread;

/// A program found on disk.
pub struct ExternalCommand {
    path: PathBuf,
    args: Vec<OsString>,
}

impl ExternalCommand {
    pub fn new(path: PathBuf, args: Vec<OsString>) -> Self {
        Self { path, args }
    }
}

impl ExecutableCommand for ExternalCommand {
    fn execute(
        self: Box<Self>,
        mut stdin: StageInput,
        stdout: &mut StageOutput,
        stderr: &mut StageOutput,
        session: &mut Session,
    ) -> Result<ExitCode> {
        let mut child = std::process::Command::new(&self.path)
            .args(&self.args)
            .stdin(stdin.stdio())
            .stdout(stdout.stdio())
            .stderr(stderr.stdio())
            .env_clear()
            .envs(session.vars.iter())
            .current_dir(session.cwd())
            .spawn()
            .with_context(|| format!("can't run {}", self.path.display()))?;

        // Feed buffered input from a separate thread so a child that fills its
        // stdout pipe before draining stdin cannot deadlock us.
        let feeder = child.stdin.take().map(|mut pipe| {
            let mut buf = Vec::new();
            let read = stdin.read_to_end(&mut buf);
            thread::spawn(move || {
                read?;
                pipe.write_all(&buf)
            })
        });

        let mut err_pipe = child.stderr.take();
        let err_reader = thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(pipe) = err_pipe.as_mut() {
                pipe.read_to_end(&mut buf)?;
            }
            Ok::<_, std::io::Error>(buf)
        });

        if let Some(mut out) = child.stdout.take() {
            std::io::copy(&mut out, stdout)?;
        }
        let exit_status = child.wait()?;

        if let Some(feeder) = feeder {
            // A child that exits without reading its input is not an error.
            let _ = feeder.join();
        }
        if let Ok(Ok(buf)) = err_reader.join() {
            stderr.write_all(&buf)?;
        }

        match exit_status.code() {
            Some(x) => Ok(x),
            None => Ok(terminated_by_signal(exit_status)),
        }
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it is a file.
/// - `./foo`, `../foo` or any relative path with several components: resolved
///   against `cwd`, returned if it is a file.
/// - Single path component (no separators): search each directory in
///   `search_paths` (PATH) and return the first file found.
/// - Empty path: returns `None`.
pub fn find_command_path(search_paths: &OsStr, cwd: &Path, path: &Path) -> Option<PathBuf> {
    if path.is_absolute() {
        return find_by_path(path);
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        // Empty path -> not found
        (None, _) => None,
        (Some(std::path::Component::Normal(x)), None) => find_in_path(search_paths, x),
        // Relative path with a directory part -> search from cwd
        _ => find_by_path(&cwd.join(path)),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .filter(|dir| !dir.as_os_str().is_empty())
        .find_map(|dir| find_by_path(&dir.join(cmd)))
}

fn find_by_path(path: &Path) -> Option<PathBuf> {
    if path.is_file() { Some(path.to_path_buf()) } else { None }
}
