//! Word transformers.
//!
//! Once a line has been parsed, the words of every simple command are passed
//! through a fixed chain of transformers before the command is resolved. Each
//! transformer sees the previous one's output, so the order matters:
//! tilde, glob, backtick, then environment variables.

use crate::error::ShellError;
use crate::parser::{SimpleCommand, Word};
use crate::runner::LineRunner;
use crate::session::Session;
use glob::Pattern;
use regex::{Captures, Regex};
use std::fs;
use tracing::{trace, warn};

pub trait WordTransformer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Rewrites `words`. Only the backtick transformer uses `runner`.
    fn transform(
        &self,
        words: Vec<Word>,
        runner: &dyn LineRunner,
        session: &mut Session,
    ) -> Result<Vec<Word>, ShellError>;
}

/// The transformers in the order they must run.
pub fn default_transformers() -> Vec<Box<dyn WordTransformer>> {
    vec![
        Box::new(TildeTransformer),
        Box::new(GlobTransformer),
        Box::new(BackTickTransformer),
        Box::new(EnvVariableTransformer::new()),
    ]
}

/// Runs `transformers` over `command` and refreshes its argument vector.
pub fn transform_command(
    transformers: &[Box<dyn WordTransformer>],
    command: &mut SimpleCommand,
    runner: &dyn LineRunner,
    session: &mut Session,
) -> Result<(), ShellError> {
    trace!("transforming {:?}", command.content);
    let mut words = std::mem::take(&mut command.content);
    for t in transformers {
        words = t.transform(words, runner, session)?;
        trace!("after {}: {:?}", t.name(), words);
    }
    command.words = words.iter().map(|w| w.content.clone()).collect();
    command.content = words;
    Ok(())
}

/// Replaces `~` with the session's home directory in unquoted words.
pub struct TildeTransformer;

impl WordTransformer for TildeTransformer {
    fn name(&self) -> &'static str {
        "tilde"
    }

    fn transform(
        &self,
        words: Vec<Word>,
        _runner: &dyn LineRunner,
        session: &mut Session,
    ) -> Result<Vec<Word>, ShellError> {
        let home = session.home.to_string_lossy();
        Ok(words
            .into_iter()
            .map(|mut w| {
                if !w.is_quoted() && w.content.contains('~') {
                    w.content = w.content.replace('~', &home);
                }
                w
            })
            .collect())
    }
}

const GLOB_CHARACTERS: [char; 4] = ['*', '?', '[', ']'];

/// Expands unquoted glob patterns against the entries of the working
/// directory. A pattern that matches nothing disappears.
pub struct GlobTransformer;

impl GlobTransformer {
    fn expand(&self, pattern: &str, session: &Session) -> Option<Vec<Word>> {
        let matcher = Pattern::new(pattern).ok()?;
        let dir = session.cwd();
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("can't list {}: {}", dir.display(), e);
                return Some(Vec::new());
            }
        };
        let matches = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| matcher.matches(name))
            .map(Word::new)
            .collect();
        Some(matches)
    }
}

impl WordTransformer for GlobTransformer {
    fn name(&self) -> &'static str {
        "glob"
    }

    fn transform(
        &self,
        words: Vec<Word>,
        _runner: &dyn LineRunner,
        session: &mut Session,
    ) -> Result<Vec<Word>, ShellError> {
        let mut result = Vec::with_capacity(words.len());
        for w in words {
            if w.is_quoted() || !w.content.contains(GLOB_CHARACTERS) {
                result.push(w);
                continue;
            }
            match self.expand(&w.content, session) {
                Some(matches) => {
                    trace!("'{}' expanded to {:?}", w.content, matches);
                    result.extend(matches);
                }
                // Not a valid pattern, keep the text as typed.
                None => result.push(w),
            }
        }
        Ok(result)
    }
}

/// Replaces each backtick region of a word with the trimmed output of running
/// it. Text around the regions is kept, so `dir=`pwd`` stays one word.
pub struct BackTickTransformer;

impl BackTickTransformer {
    fn substitute(
        command: &str,
        runner: &dyn LineRunner,
        session: &mut Session,
    ) -> Result<String, ShellError> {
        let r = runner.run_line(command, session, false)?;
        let failure = if !r.is_success() {
            Some(format!("`{}` exited with {}", command, r.return_code))
        } else if r.stdout.is_none() {
            Some(format!("`{}` produced no output", command))
        } else {
            None
        };
        if let Some(fallback) = failure {
            let message = r.stderr.unwrap_or(fallback);
            return Err(ShellError::CommandSubstitution(message.trim_end().to_string()));
        }
        Ok(r.stdout.unwrap_or_default().trim_end().to_string())
    }
}

impl WordTransformer for BackTickTransformer {
    fn name(&self) -> &'static str {
        "backtick"
    }

    fn transform(
        &self,
        words: Vec<Word>,
        runner: &dyn LineRunner,
        session: &mut Session,
    ) -> Result<Vec<Word>, ShellError> {
        words
            .into_iter()
            .map(|w| {
                if w.substitutions.is_empty() {
                    return Ok(w);
                }
                let mut content = String::new();
                let mut rest = 0;
                for span in &w.substitutions {
                    content.push_str(&w.content[rest..span.start]);
                    content.push_str(&Self::substitute(&w.content[span.clone()], runner, session)?);
                    rest = span.end;
                }
                content.push_str(&w.content[rest..]);
                Ok(Word {
                    content,
                    surrounded_by: w.surrounded_by,
                    substitutions: Vec::new(),
                })
            })
            .collect()
    }
}

/// Substitutes `$NAME` and `${NAME}` with session variables; unbound names
/// become the empty string. Single-quoted and backtick words are left alone.
pub struct EnvVariableTransformer {
    re: Regex,
}

impl EnvVariableTransformer {
    pub fn new() -> Self {
        Self {
            re: Regex::new(r"\$(?:\{(\w+)\}|(\w+))").expect("valid variable regex"),
        }
    }

    pub fn expand(&self, text: &str, session: &Session) -> String {
        self.re
            .replace_all(text, |caps: &Captures| {
                let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
                session.get_var(name).unwrap_or("").to_string()
            })
            .into_owned()
    }
}

impl Default for EnvVariableTransformer {
    fn default() -> Self {
        Self::new()
    }
}

impl WordTransformer for EnvVariableTransformer {
    fn name(&self) -> &'static str {
        "env"
    }

    fn transform(
        &self,
        words: Vec<Word>,
        _runner: &dyn LineRunner,
        session: &mut Session,
    ) -> Result<Vec<Word>, ShellError> {
        Ok(words
            .into_iter()
            .map(|mut w| {
                if !matches!(w.surrounded_by, Some('\'') | Some('`')) && w.content.contains('$') {
                    w.content = self.expand(&w.content, session);
                }
                w
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandResult;
    use crate::engine::Calculator;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    /// Answers every nested line with a canned result and records the lines.
    struct StubRunner {
        result: CommandResult,
        lines: RefCell<Vec<String>>,
    }

    impl StubRunner {
        fn new(result: CommandResult) -> Self {
            Self {
                result,
                lines: RefCell::new(Vec::new()),
            }
        }
    }

    impl LineRunner for StubRunner {
        fn run_line(
            &self,
            line: &str,
            _session: &mut Session,
            inherit_io: bool,
        ) -> Result<CommandResult, ShellError> {
            assert!(!inherit_io);
            self.lines.borrow_mut().push(line.to_string());
            Ok(self.result.clone())
        }
    }

    fn session_in(dir: &Path) -> Session {
        Session::with_dir(
            Arc::new(Calculator),
            HashMap::new(),
            dir.to_path_buf(),
            PathBuf::from("/home/me"),
        )
    }

    fn contents(words: &[Word]) -> Vec<String> {
        words.iter().map(|w| w.content.clone()).collect()
    }

    fn run(t: &dyn WordTransformer, words: Vec<Word>, session: &mut Session) -> Vec<String> {
        let runner = StubRunner::new(CommandResult::success());
        contents(&t.transform(words, &runner, session).unwrap())
    }

    #[test]
    fn test_tilde_expands_unquoted_only() {
        let mut session = session_in(Path::new("/"));
        let words = vec![
            Word::new("~/src"),
            Word::new("a~b~"),
            Word::quoted("~", '"'),
            Word::new("plain"),
        ];
        assert_eq!(
            run(&TildeTransformer, words, &mut session),
            vec!["/home/me/src", "a/home/meb/home/me", "~", "plain"]
        );
    }

    #[test]
    fn test_glob_matches_and_nullglob() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["a.rs", "b.rs", "c.txt"] {
            fs::write(tmp.path().join(name), "").unwrap();
        }
        let mut session = session_in(tmp.path());

        let mut rs = run(&GlobTransformer, vec![Word::new("ls"), Word::new("*.rs")], &mut session);
        rs[1..].sort();
        assert_eq!(rs, vec!["ls", "a.rs", "b.rs"]);

        let none = run(&GlobTransformer, vec![Word::new("*.md")], &mut session);
        assert!(none.is_empty());

        let single = run(&GlobTransformer, vec![Word::new("c.tx?")], &mut session);
        assert_eq!(single, vec!["c.txt"]);
    }

    #[test]
    fn test_glob_leaves_quoted_and_invalid_patterns() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("x"), "").unwrap();
        let mut session = session_in(tmp.path());
        let out = run(
            &GlobTransformer,
            vec![Word::quoted("*", '"'), Word::new("["), Word::new("x")],
            &mut session,
        );
        assert_eq!(out, vec!["*", "[", "x"]);
    }

    #[test]
    fn test_backtick_substitutes_trimmed_output() {
        let mut session = session_in(Path::new("/"));
        let runner = StubRunner::new(CommandResult::new(0, Some("hi\n".to_string()), None));
        let out = BackTickTransformer
            .transform(vec![Word::new("echo"), Word::quoted("echo hi", '`')], &runner, &mut session)
            .unwrap();
        assert_eq!(contents(&out), vec!["echo", "hi"]);
        assert_eq!(*runner.lines.borrow(), vec!["echo hi".to_string()]);
    }

    #[test]
    fn test_backtick_failure_aborts() {
        let mut session = session_in(Path::new("/"));
        let runner = StubRunner::new(CommandResult::new(2, None, Some("boom\n".to_string())));
        let err = BackTickTransformer
            .transform(vec![Word::quoted("false", '`')], &runner, &mut session)
            .unwrap_err();
        match err {
            ShellError::CommandSubstitution(msg) => assert_eq!(msg, "boom"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_backtick_without_output_aborts() {
        let mut session = session_in(Path::new("/"));
        let runner = StubRunner::new(CommandResult::new(0, None, None));
        let err = BackTickTransformer
            .transform(vec![Word::quoted("cd .", '`')], &runner, &mut session)
            .unwrap_err();
        match err {
            ShellError::CommandSubstitution(msg) => assert_eq!(msg, "`cd .` produced no output"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_backtick_region_keeps_surrounding_text() {
        let mut session = session_in(Path::new("/"));
        let runner = StubRunner::new(CommandResult::new(0, Some("/tmp\n".to_string()), None));
        let word = Word {
            content: "dir=pwd!".to_string(),
            surrounded_by: Some('`'),
            substitutions: vec![4..7],
        };
        let out = BackTickTransformer.transform(vec![word], &runner, &mut session).unwrap();
        assert_eq!(contents(&out), vec!["dir=/tmp!"]);
        assert!(out[0].substitutions.is_empty());
        assert_eq!(*runner.lines.borrow(), vec!["pwd".to_string()]);
    }

    #[test]
    fn test_env_expansion() {
        let mut session = session_in(Path::new("/"));
        session.set_var("FOO", "bar");
        let t = EnvVariableTransformer::new();
        let out = run(
            &t,
            vec![
                Word::quoted("a${FOO}b$FOO c", '"'),
                Word::new("$MISSING-x"),
                Word::quoted("$FOO", '\''),
                Word::new("$ {FOO}"),
            ],
            &mut session,
        );
        assert_eq!(out, vec!["abarbbar c", "-x", "$FOO", "$ {FOO}"]);
    }

    #[test]
    fn test_env_is_idempotent_without_dollar() {
        let mut session = session_in(Path::new("/"));
        let t = EnvVariableTransformer::new();
        let once = run(&t, vec![Word::new("plain {x} text")], &mut session);
        let twice = run(&t, once.iter().map(Word::new).collect(), &mut session);
        assert_eq!(once, twice);
        assert_eq!(once, vec!["plain {x} text"]);
    }

    #[test]
    fn test_chain_flattens_words() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("only.log"), "").unwrap();
        let mut session = session_in(tmp.path());
        session.set_var("USER", "me");
        let runner = StubRunner::new(CommandResult::new(0, Some("x y\n".to_string()), None));
        let mut cmd = SimpleCommand::new(vec![
            Word::new("echo"),
            Word::new("~"),
            Word::new("*.log"),
            Word::new("*.none"),
            Word::quoted("cmd", '`'),
            Word::new("$USER"),
        ]);
        transform_command(&default_transformers(), &mut cmd, &runner, &mut session).unwrap();
        assert_eq!(cmd.words, vec!["echo", "/home/me", "only.log", "x y", "me"]);
    }
}
