use crate::engine::Engine;
use std::collections::HashMap;
use std::env as stdenv;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// LIFO stack of canonical directories. The top is the shell's working
/// directory; the stack is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryStack {
    dirs: Vec<PathBuf>,
}

impl DirectoryStack {
    pub fn new(start: PathBuf) -> Self {
        Self { dirs: vec![start] }
    }

    pub fn peek(&self) -> &Path {
        // The stack is seeded on construction and `pop` keeps the last entry.
        &self.dirs[self.dirs.len() - 1]
    }

    pub fn push(&mut self, dir: PathBuf) {
        self.dirs.push(dir);
    }

    /// Removes the top entry. Returns `None` rather than emptying the stack.
    pub fn pop(&mut self) -> Option<PathBuf> {
        if self.dirs.len() > 1 { self.dirs.pop() } else { None }
    }

    pub fn replace_top(&mut self, dir: PathBuf) {
        let last = self.dirs.len() - 1;
        self.dirs[last] = dir;
    }

    /// Entries from top to bottom.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.dirs.iter().rev().map(PathBuf::as_path)
    }
}

/// Everything one shell session carries from line to line.
///
/// A `Session` is passed explicitly (`&mut Session`) through every nested run:
/// prompt evaluation, backtick substitution and sub-shells all see the same
/// variables and directory stack. Background work gets its own clone.
#[derive(Clone)]
pub struct Session {
    /// Variables visible to `$NAME` expansion and to spawned processes.
    pub vars: HashMap<String, String>,
    pub dirs: DirectoryStack,
    /// Prompt template; blank, a literal, or a backtick-quoted command.
    pub prompt: String,
    /// Home directory, resolved once when the session starts.
    pub home: PathBuf,
    /// Extra directories searched for script files.
    pub script_paths: Vec<PathBuf>,
    /// Set by `exit`; the reader loop stops when it sees it.
    pub should_exit: bool,
    engine: Arc<dyn Engine>,
}

impl Session {
    /// Capture the current process state into a new session.
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        let cwd = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let cwd = cwd.canonicalize().unwrap_or(cwd);
        let home = dirs::home_dir()
            .or_else(|| stdenv::var_os("HOME").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("/"));
        Self::with_dir(engine, stdenv::vars().collect(), cwd, home)
    }

    /// Session with explicit variables, working directory and home.
    pub fn with_dir(
        engine: Arc<dyn Engine>,
        vars: HashMap<String, String>,
        cwd: PathBuf,
        home: PathBuf,
    ) -> Self {
        Self {
            vars,
            dirs: DirectoryStack::new(cwd),
            prompt: String::new(),
            home,
            script_paths: Vec::new(),
            should_exit: false,
            engine,
        }
    }

    pub fn cwd(&self) -> &Path {
        self.dirs.peek()
    }

    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Resolve `target` against the working directory and canonicalize it.
    pub fn resolve_dir(&self, target: &Path) -> std::io::Result<PathBuf> {
        let joined = if target.is_absolute() {
            target.to_path_buf()
        } else {
            self.cwd().join(target)
        };
        let canonical = joined.canonicalize()?;
        if canonical.is_dir() {
            Ok(canonical)
        } else {
            Err(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("not a directory: {}", canonical.display()),
            ))
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("dirs", &self.dirs)
            .field("prompt", &self.prompt)
            .field("home", &self.home)
            .field("script_paths", &self.script_paths)
            .field("should_exit", &self.should_exit)
            .finish_non_exhaustive()
    }
}
