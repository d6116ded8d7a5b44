use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::io::{StageInput, StageOutput};
use crate::session::Session;
use anyhow::{Context, Result, bail};
use argh::{EarlyExit, FromArgs};
use std::io::{Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// A command run inside the shell process.
///
/// Arguments are parsed with [`argh`]; an `Err` from `execute` is reported on
/// the stage's stderr as `name: error` with return code 1.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    fn name() -> &'static str;

    /// Runs against the stage's input and output and may change `session`.
    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        session: &mut Session,
    ) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        mut stdin: StageInput,
        stdout: &mut StageOutput,
        stderr: &mut StageOutput,
        session: &mut Session,
    ) -> Result<ExitCode> {
        match <T as BuiltinCommand>::execute(*self, &mut stdin, stdout, session) {
            Ok(x) => Ok(x),
            Err(e) => {
                writeln!(stderr, "{}: {:#}", T::name(), e)?;
                Ok(1)
            }
        }
    }
}

/// Stands in for a builtin whose arguments did not parse, or that was asked
/// for `--help`.
struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(
        self: Box<Self>,
        _stdin: StageInput,
        stdout: &mut StageOutput,
        stderr: &mut StageOutput,
        _session: &mut Session,
    ) -> Result<ExitCode> {
        if self.is_error {
            writeln!(stderr, "{}", self.output.trim_end())?;
            Ok(1)
        } else {
            writeln!(stdout, "{}", self.output.trim_end())?;
            Ok(0)
        }
    }
}

/// Creates instances of the builtin `T`.
pub(crate) struct Factory<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn name(&self) -> &'static str {
        T::name()
    }

    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>> {
        if name == T::name() {
            Some(match T::from_args(&[name], args) {
                Ok(cmd) => Box::new(cmd),
                Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                    output,
                    is_error: status.is_err(),
                }),
            })
        } else {
            None
        }
    }
}

/// The builtin table.
pub struct Builtins {
    factories: Vec<Box<dyn CommandFactory>>,
}

impl Builtins {
    pub fn new(factories: Vec<Box<dyn CommandFactory>>) -> Self {
        Self { factories }
    }

    pub fn get(&self, name: &str) -> Option<&dyn CommandFactory> {
        self.factories
            .iter()
            .find(|f| f.name() == name)
            .map(|f| f.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.iter().map(|f| f.name())
    }

    pub fn create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>> {
        self.get(name)?.try_create(name, args)
    }
}

impl Default for Builtins {
    fn default() -> Self {
        Self::new(vec![
            Box::new(Factory::<Echo>::default()),
            Box::new(Factory::<Pwd>::default()),
            Box::new(Factory::<Cd>::default()),
            Box::new(Factory::<Pushd>::default()),
            Box::new(Factory::<Popd>::default()),
            Box::new(Factory::<Dirs>::default()),
            Box::new(Factory::<Export>::default()),
            Box::new(Factory::<Unset>::default()),
            Box::new(Factory::<Prompt>::default()),
            Box::new(Factory::<Cat>::default()),
            Box::new(Factory::<WC>::default()),
            Box::new(Factory::<Exit>::default()),
        ])
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        session: &mut Session,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", session.cwd().to_string_lossy())?;
        Ok(0)
    }
}

fn target_dir(session: &Session, target: Option<&str>) -> Result<PathBuf> {
    let target = match target {
        Some(t) if !t.is_empty() => PathBuf::from(t),
        _ => session.home.clone(),
    };
    session
        .resolve_dir(&target)
        .with_context(|| format!("can't change to {}", target.display()))
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the home directory.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory. Defaults to home when omitted.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        session: &mut Session,
    ) -> Result<ExitCode> {
        let dir = target_dir(session, self.target.as_deref())?;
        session.dirs.replace_top(dir);
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Push a directory onto the directory stack and make it current.
pub struct Pushd {
    #[argh(positional)]
    /// directory to switch to. Defaults to home when omitted.
    pub target: Option<String>,
}

impl BuiltinCommand for Pushd {
    fn name() -> &'static str {
        "pushd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        session: &mut Session,
    ) -> Result<ExitCode> {
        let dir = target_dir(session, self.target.as_deref())?;
        session.dirs.push(dir);
        print_stack(stdout, session)
    }
}

#[derive(FromArgs)]
/// Pop the top of the directory stack.
pub struct Popd {}

impl BuiltinCommand for Popd {
    fn name() -> &'static str {
        "popd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        session: &mut Session,
    ) -> Result<ExitCode> {
        if session.dirs.pop().is_none() {
            bail!("directory stack empty");
        }
        print_stack(stdout, session)
    }
}

#[derive(FromArgs)]
/// Print the directory stack, most recent first.
pub struct Dirs {}

impl BuiltinCommand for Dirs {
    fn name() -> &'static str {
        "dirs"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        session: &mut Session,
    ) -> Result<ExitCode> {
        print_stack(stdout, session)
    }
}

fn print_stack(stdout: &mut dyn Write, session: &Session) -> Result<ExitCode> {
    let all: Vec<_> = session.dirs.iter().map(|d| d.to_string_lossy()).collect();
    writeln!(stdout, "{}", all.join(" "))?;
    Ok(0)
}

#[derive(FromArgs)]
/// Set shell variables. Without arguments, print all of them.
pub struct Export {
    #[argh(positional, greedy)]
    /// assignments of the form NAME=VALUE.
    pub assignments: Vec<String>,
}

impl BuiltinCommand for Export {
    fn name() -> &'static str {
        "export"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        session: &mut Session,
    ) -> Result<ExitCode> {
        if self.assignments.is_empty() {
            let mut vars: Vec<_> = session.vars.iter().collect();
            vars.sort();
            for (k, v) in vars {
                writeln!(stdout, "{}={}", k, v)?;
            }
            return Ok(0);
        }
        for assignment in &self.assignments {
            match assignment.split_once('=') {
                Some((name, value)) if !name.is_empty() => session.set_var(name, value),
                _ => bail!("expected NAME=VALUE, got '{}'", assignment),
            }
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Remove shell variables.
pub struct Unset {
    #[argh(positional, greedy)]
    /// names of the variables to remove.
    pub names: Vec<String>,
}

impl BuiltinCommand for Unset {
    fn name() -> &'static str {
        "unset"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        session: &mut Session,
    ) -> Result<ExitCode> {
        for name in &self.names {
            session.vars.remove(name);
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Set the prompt template. A template wrapped in backticks is run as a
/// command each time the prompt is shown; no template restores the default.
pub struct Prompt {
    #[argh(positional, greedy)]
    /// the template, joined with spaces.
    pub template: Vec<String>,
}

impl BuiltinCommand for Prompt {
    fn name() -> &'static str {
        "prompt"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        session: &mut Session,
    ) -> Result<ExitCode> {
        session.prompt = self.template.join(" ");
        Ok(0)
    }
}

#[derive(FromArgs)]
/// write the arguments to standard output, separated by spaces.
/// by default, a trailing newline is printed.
pub struct Echo {
    #[argh(switch, short = 'n')]
    /// do not output the trailing newline.
    pub no_newline: bool,

    #[argh(positional, greedy)]
    /// values to print as-is, separated by spaces.
    pub args: Vec<String>,
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _session: &mut Session,
    ) -> Result<ExitCode> {
        let s = self.args.join(" ");
        if self.no_newline {
            write!(stdout, "{}", s)?;
        } else {
            writeln!(stdout, "{}", s)?;
        }
        Ok(0)
    }
}

fn open_in(session: &Session, fname: &str) -> Result<std::fs::File> {
    let path = session.cwd().join(Path::new(fname));
    std::fs::File::open(&path).with_context(|| fname.to_string())
}

#[derive(FromArgs)]
/// count lines, words and bytes
pub struct WC {
    #[argh(positional, greedy)]
    /// files to count. If none provided, reads from stdin.
    pub files: Vec<String>,
}

impl BuiltinCommand for WC {
    fn name() -> &'static str {
        "wc"
    }

    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        session: &mut Session,
    ) -> Result<ExitCode> {
        if self.files.is_empty() {
            let mut buf = String::new();
            stdin.read_to_string(&mut buf)?;
            let lines = buf.lines().count();
            let words = buf.split_whitespace().count();
            let bytes = buf.len();
            writeln!(stdout, "{} {} {}", lines, words, bytes)?;
            return Ok(0);
        }
        for fname in self.files {
            let mut s = String::new();
            open_in(session, &fname)?.read_to_string(&mut s)?;
            let lines = s.lines().count();
            let words = s.split_whitespace().count();
            let bytes = s.len();
            writeln!(stdout, "{} {} {} {}", lines, words, bytes, fname)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// print file(s) to stdout
pub struct Cat {
    #[argh(positional, greedy)]
    /// files to print. If none provided, copies stdin.
    pub files: Vec<String>,
}

impl BuiltinCommand for Cat {
    fn name() -> &'static str {
        "cat"
    }

    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        session: &mut Session,
    ) -> Result<ExitCode> {
        if self.files.is_empty() {
            std::io::copy(stdin, stdout)?;
            return Ok(0);
        }
        for fname in self.files {
            std::io::copy(&mut open_in(session, &fname)?, stdout)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Leave the shell after the current line.
pub struct Exit {
    #[argh(positional)]
    /// return code of the line; 0 when omitted.
    pub code: Option<ExitCode>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        session: &mut Session,
    ) -> Result<ExitCode> {
        session.should_exit = true;
        Ok(self.code.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Calculator;
    use std::collections::HashMap;
    use std::fs;
    use std::io::Cursor;
    use std::sync::Arc;

    fn session_in(dir: &Path) -> Session {
        Session::with_dir(
            Arc::new(Calculator),
            HashMap::new(),
            dir.canonicalize().unwrap(),
            PathBuf::from("/"),
        )
    }

    fn no_input() -> Cursor<Vec<u8>> {
        Cursor::new(Vec::new())
    }

    #[test]
    fn test_pwd_prints_top_of_stack() {
        let tmp = tempfile::tempdir().unwrap();
        let mut session = session_in(tmp.path());

        let mut out = Vec::new();
        let res = Pwd {}.execute(&mut no_input(), &mut out, &mut session);

        assert!(res.is_ok());
        let expected = format!("{}\n", session.cwd().to_string_lossy());
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }

    #[test]
    fn test_echo_with_and_without_newline() {
        let mut session = session_in(Path::new("/"));

        let mut out1 = Vec::new();
        let echo1 = Echo {
            no_newline: false,
            args: vec!["hello".to_string(), "world".to_string()],
        };
        assert!(echo1.execute(&mut no_input(), &mut out1, &mut session).is_ok());
        assert_eq!(String::from_utf8(out1).unwrap(), "hello world\n");

        let mut out2 = Vec::new();
        let echo2 = Echo {
            no_newline: true,
            args: vec!["foo".to_string(), "bar".to_string()],
        };
        assert!(echo2.execute(&mut no_input(), &mut out2, &mut session).is_ok());
        assert_eq!(String::from_utf8(out2).unwrap(), "foo bar");
    }

    #[test]
    fn test_cd_relative_and_home() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        let mut session = session_in(tmp.path());
        let root = session.cwd().to_path_buf();
        session.home = root.clone();

        let cmd = Cd {
            target: Some("sub".to_string()),
        };
        assert!(cmd.execute(&mut no_input(), &mut Vec::new(), &mut session).is_ok());
        assert_eq!(session.cwd(), root.join("sub"));

        let cmd = Cd { target: None };
        assert!(cmd.execute(&mut no_input(), &mut Vec::new(), &mut session).is_ok());
        assert_eq!(session.cwd(), root);
        assert_eq!(session.dirs.iter().count(), 1, "cd replaces the top entry");
    }

    #[test]
    fn test_cd_nonexistent_path_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let mut session = session_in(tmp.path());
        let before = session.cwd().to_path_buf();
        let cmd = Cd {
            target: Some("does-not-exist".to_string()),
        };
        assert!(cmd.execute(&mut no_input(), &mut Vec::new(), &mut session).is_err());
        assert_eq!(session.cwd(), before);
    }

    #[test]
    fn test_pushd_popd_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("a")).unwrap();
        let mut session = session_in(tmp.path());
        let root = session.cwd().to_path_buf();

        let mut out = Vec::new();
        let pushd = Pushd {
            target: Some("a".to_string()),
        };
        pushd.execute(&mut no_input(), &mut out, &mut session).unwrap();
        assert_eq!(session.cwd(), root.join("a"));
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("{} {}\n", root.join("a").display(), root.display())
        );

        Popd {}.execute(&mut no_input(), &mut Vec::new(), &mut session).unwrap();
        assert_eq!(session.cwd(), root);
        assert!(Popd {}.execute(&mut no_input(), &mut Vec::new(), &mut session).is_err());
    }

    #[test]
    fn test_export_and_unset() {
        let mut session = session_in(Path::new("/"));
        let export = Export {
            assignments: vec!["A=1".to_string(), "B=x=y".to_string()],
        };
        export.execute(&mut no_input(), &mut Vec::new(), &mut session).unwrap();
        assert_eq!(session.get_var("A"), Some("1"));
        assert_eq!(session.get_var("B"), Some("x=y"));

        let mut out = Vec::new();
        Export { assignments: vec![] }
            .execute(&mut no_input(), &mut out, &mut session)
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "A=1\nB=x=y\n");

        let bad = Export {
            assignments: vec!["novalue".to_string()],
        };
        assert!(bad.execute(&mut no_input(), &mut Vec::new(), &mut session).is_err());

        let unset = Unset {
            names: vec!["A".to_string()],
        };
        unset.execute(&mut no_input(), &mut Vec::new(), &mut session).unwrap();
        assert_eq!(session.get_var("A"), None);
    }

    #[test]
    fn test_cat_reads_file_relative_to_cwd() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("f.txt"), "line1\nline2\n").unwrap();
        let mut session = session_in(tmp.path());

        let mut out = Vec::new();
        let cmd = Cat {
            files: vec!["f.txt".to_string()],
        };
        cmd.execute(&mut no_input(), &mut out, &mut session).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "line1\nline2\n");
    }

    #[test]
    fn test_cat_reads_stdin_when_no_args() {
        let mut session = session_in(Path::new("/"));
        let mut input = Cursor::new(b"from stdin".to_vec());
        let mut out = Vec::new();
        Cat { files: vec![] }
            .execute(&mut input, &mut out, &mut session)
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "from stdin");
    }

    #[test]
    fn test_wc_counts_stdin_and_files() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("w.txt"), "one two\nthree\n").unwrap();
        let mut session = session_in(tmp.path());

        let mut out = Vec::new();
        let mut input = Cursor::new(b"a b c\n".to_vec());
        WC { files: vec![] }
            .execute(&mut input, &mut out, &mut session)
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1 3 6\n");

        let mut out = Vec::new();
        WC {
            files: vec!["w.txt".to_string()],
        }
        .execute(&mut no_input(), &mut out, &mut session)
        .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "2 3 14 w.txt\n");
    }

    #[test]
    fn test_exit_sets_flag() {
        let mut session = session_in(Path::new("/"));
        let code = Exit { code: Some(4) }
            .execute(&mut no_input(), &mut Vec::new(), &mut session)
            .unwrap();
        assert_eq!(code, 4);
        assert!(session.should_exit);
    }

    #[test]
    fn test_factory_reports_bad_arguments_on_stderr() {
        let builtins = Builtins::default();
        let mut session = session_in(Path::new("/"));
        let cmd = builtins.create("cd", &["a", "b"]).unwrap();
        let mut out = StageOutput::capture();
        let mut err = StageOutput::capture();
        let code = cmd
            .execute(StageInput::empty(), &mut out, &mut err, &mut session)
            .unwrap();
        assert_eq!(code, 1);
        assert_eq!(out.into_text(), None);
        assert!(err.into_text().is_some());
    }

    #[test]
    fn test_failed_builtin_writes_named_error() {
        let builtins = Builtins::default();
        let mut session = session_in(Path::new("/"));
        let cmd = builtins.create("cat", &["/no/such/file"]).unwrap();
        let mut err = StageOutput::capture();
        let code = cmd
            .execute(StageInput::empty(), &mut StageOutput::capture(), &mut err, &mut session)
            .unwrap();
        assert_eq!(code, 1);
        assert!(err.into_text().unwrap().starts_with("cat: /no/such/file"));
    }

    #[test]
    fn test_names_cover_the_table() {
        let names: Vec<_> = Builtins::default().names().collect();
        for expected in ["echo", "cd", "pushd", "popd", "dirs", "export", "prompt", "exit"] {
            assert!(names.contains(&expected), "missing {}", expected);
        }
        assert!(Builtins::default().get("ls").is_none());
    }
}
