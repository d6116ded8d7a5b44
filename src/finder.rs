use crate::builtin::Builtins;
use crate::external::find_command_path;
use crate::session::Session;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// File extension of shell scripts run through the evaluator.
pub const SCRIPT_EXTENSION: &str = "kash";

/// What a resolver found for a command name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSearchResult {
    Builtin { name: String },
    Script { path: PathBuf },
    Executable { path: PathBuf },
}

impl CommandSearchResult {
    pub fn kind(&self) -> &'static str {
        match self {
            CommandSearchResult::Builtin { .. } => "builtin",
            CommandSearchResult::Script { .. } => "script",
            CommandSearchResult::Executable { .. } => "executable",
        }
    }
}

/// Maps a command name to something runnable.
pub trait Resolver: Send + Sync {
    fn try_resolve(&self, name: &str, session: &Session) -> Option<CommandSearchResult>;
}

/// Asks its resolvers in order and returns the first answer.
///
/// The order is what makes builtins shadow scripts and scripts shadow programs
/// on the PATH.
pub struct CommandFinder {
    resolvers: Vec<Box<dyn Resolver>>,
}

impl CommandFinder {
    pub fn new(resolvers: Vec<Box<dyn Resolver>>) -> Self {
        Self { resolvers }
    }

    /// Builtins, then scripts, then executables.
    pub fn with_builtins(builtins: Arc<Builtins>) -> Self {
        Self::new(vec![
            Box::new(BuiltinFinder::new(builtins)),
            Box::new(ScriptFinder),
            Box::new(ExecutableFinder),
        ])
    }

    /// `None` is not an error: the caller falls back to the evaluator.
    pub fn find_command(&self, name: &str, session: &Session) -> Option<CommandSearchResult> {
        let found = self
            .resolvers
            .iter()
            .find_map(|r| r.try_resolve(name, session));
        debug!(name, found = ?found, "command lookup");
        found
    }
}

pub struct BuiltinFinder {
    builtins: Arc<Builtins>,
}

impl BuiltinFinder {
    pub fn new(builtins: Arc<Builtins>) -> Self {
        Self { builtins }
    }
}

impl Resolver for BuiltinFinder {
    fn try_resolve(&self, name: &str, _session: &Session) -> Option<CommandSearchResult> {
        self.builtins.get(name).map(|f| CommandSearchResult::Builtin {
            name: f.name().to_string(),
        })
    }
}

/// Finds `name` or `name.kash` in the working directory or the session's
/// script paths.
pub struct ScriptFinder;

impl ScriptFinder {
    fn file_name(name: &str) -> String {
        let suffix = format!(".{}", SCRIPT_EXTENSION);
        if name.ends_with(&suffix) {
            name.to_string()
        } else {
            format!("{}{}", name, suffix)
        }
    }
}

impl Resolver for ScriptFinder {
    fn try_resolve(&self, name: &str, session: &Session) -> Option<CommandSearchResult> {
        if name.is_empty() {
            return None;
        }
        let file_name = Self::file_name(name);
        std::iter::once(session.cwd())
            .chain(session.script_paths.iter().map(PathBuf::as_path))
            .map(|dir| dir.join(&file_name))
            .find(|path| path.is_file())
            .map(|path| CommandSearchResult::Script { path })
    }
}

/// Absolute and relative paths, or a lookup in the session's `PATH`.
pub struct ExecutableFinder;

impl Resolver for ExecutableFinder {
    fn try_resolve(&self, name: &str, session: &Session) -> Option<CommandSearchResult> {
        let search_paths = session.get_var("PATH").unwrap_or("");
        find_command_path(OsStr::new(search_paths), session.cwd(), Path::new(name))
            .map(|path| CommandSearchResult::Executable { path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Calculator;
    use std::collections::HashMap;
    use std::fs;

    fn session_in(dir: &Path, path_var: &str) -> Session {
        let mut vars = HashMap::new();
        vars.insert("PATH".to_string(), path_var.to_string());
        Session::with_dir(Arc::new(Calculator), vars, dir.to_path_buf(), PathBuf::from("/"))
    }

    #[cfg(unix)]
    fn make_executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        fs::write(path, "#!/bin/sh\necho fake\n").unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn test_builtin_shadows_executable() {
        let bin = tempfile::tempdir().unwrap();
        make_executable(&bin.path().join("echo"));
        let session = session_in(Path::new("/"), &bin.path().to_string_lossy());

        let finder = CommandFinder::with_builtins(Arc::new(Builtins::default()));
        assert_eq!(
            finder.find_command("echo", &session),
            Some(CommandSearchResult::Builtin {
                name: "echo".to_string()
            })
        );

        let externals_only = CommandFinder::new(vec![Box::new(ExecutableFinder)]);
        assert_eq!(
            externals_only.find_command("echo", &session),
            Some(CommandSearchResult::Executable {
                path: bin.path().join("echo")
            })
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_script_shadows_executable() {
        let bin = tempfile::tempdir().unwrap();
        make_executable(&bin.path().join("deploy"));
        let scripts = tempfile::tempdir().unwrap();
        fs::write(scripts.path().join("deploy.kash"), "1 + 1").unwrap();

        let mut session = session_in(Path::new("/"), &bin.path().to_string_lossy());
        let finder = CommandFinder::with_builtins(Arc::new(Builtins::default()));
        assert_eq!(finder.find_command("deploy", &session).unwrap().kind(), "executable");

        session.script_paths.push(scripts.path().to_path_buf());
        assert_eq!(
            finder.find_command("deploy", &session),
            Some(CommandSearchResult::Script {
                path: scripts.path().join("deploy.kash")
            })
        );
    }

    #[test]
    fn test_script_found_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("build.kash"), "\"ok\"").unwrap();
        let session = session_in(dir.path(), "");
        assert_eq!(
            ScriptFinder.try_resolve("build.kash", &session),
            Some(CommandSearchResult::Script {
                path: dir.path().join("build.kash")
            })
        );
        assert!(ScriptFinder.try_resolve("build", &session).is_some());
        assert!(ScriptFinder.try_resolve("other", &session).is_none());
    }

    #[test]
    fn test_unknown_name_is_not_found() {
        let session = session_in(Path::new("/"), "/nonexistent");
        let finder = CommandFinder::with_builtins(Arc::new(Builtins::default()));
        assert_eq!(finder.find_command("no-such-command-42", &session), None);
        assert_eq!(finder.find_command("2", &session), None);
    }
}
