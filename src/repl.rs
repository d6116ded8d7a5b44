use crate::prompt;
use crate::runner::{LineRunner, Shell};
use crate::session::Session;
use anyhow::Result;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{CompletionType, Context, Editor};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const HISTORY_FILE: &str = ".kash_history";

/// Reads lines until end of input or `exit`, running each one in `session`.
pub fn run(shell: &Shell, session: &mut Session) -> Result<()> {
    let config = rustyline::Config::builder()
        .history_ignore_space(true)
        .history_ignore_dups(true)?
        .completion_type(CompletionType::List)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<KashHelper, DefaultHistory> = Editor::with_config(config)?;
    rl.set_helper(Some(KashHelper::new(shell.builtins().names().collect())));

    let history = dirs::home_dir().map(|home| home.join(HISTORY_FILE));
    if let Some(path) = &history {
        if let Err(e) = rl.load_history(path) {
            debug!("no history loaded from {}: {}", path.display(), e);
        }
    }

    while !session.should_exit {
        if let Some(helper) = rl.helper_mut() {
            helper.sync(session);
        }
        let prompt = prompt::prompt(shell, session);
        match rl.readline(&prompt) {
            Ok(line) => handle_line(shell, session, &line, &mut std::io::stderr())?,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    if let Some(path) = &history {
        if let Err(e) = rl.save_history(path) {
            warn!("can't save history to {}: {}", path.display(), e);
        }
    }
    Ok(())
}

/// Runs one line read from the terminal. A line that fails is reported on
/// `err` and does not end the session.
fn handle_line(shell: &Shell, session: &mut Session, line: &str, err: &mut dyn Write) -> io::Result<()> {
    match shell.run_line(line, session, true) {
        Ok(result) => result.display(),
        Err(e) => writeln!(err, "kash: {}", e)?,
    }
    Ok(())
}

/// Tab completion: builtins in command position, `$NAME` for session
/// variables, and file names relative to the current directory.
pub struct KashHelper {
    commands: Vec<&'static str>,
    vars: Vec<String>,
    dir: PathBuf,
}

impl KashHelper {
    pub fn new(commands: Vec<&'static str>) -> Self {
        Self {
            commands,
            vars: Vec::new(),
            dir: PathBuf::from("."),
        }
    }

    /// Picks up the directory and variables the next line will run with.
    pub fn sync(&mut self, session: &Session) {
        self.dir = session.cwd().to_path_buf();
        self.vars = session.vars.keys().cloned().collect();
        self.vars.sort();
    }

    fn candidates(&self, line: &str, pos: usize) -> (usize, Vec<Pair>) {
        let start = line[..pos]
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_whitespace())
            .map_or(0, |(i, c)| i + c.len_utf8());
        let word = &line[start..pos];

        if let Some(name) = word.strip_prefix('$') {
            let vars = self
                .vars
                .iter()
                .filter(|v| v.starts_with(name))
                .map(|v| pair(format!("${}", v)))
                .collect();
            return (start, vars);
        }

        let mut found = Vec::new();
        let before = line[..start].trim_end();
        if before.is_empty() || before.ends_with(['|', ';', '(']) {
            found.extend(
                self.commands
                    .iter()
                    .filter(|c| c.starts_with(word))
                    .map(|c| pair(c.to_string())),
            );
        }
        found.extend(files_matching(&self.dir, word));
        (start, found)
    }
}

fn files_matching(cwd: &Path, word: &str) -> Vec<Pair> {
    let (dir_part, name_part) = match word.rfind('/') {
        Some(i) => word.split_at(i + 1),
        None => ("", word),
    };
    let Ok(entries) = fs::read_dir(cwd.join(dir_part)) else {
        return Vec::new();
    };

    let mut found: Vec<Pair> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().into_string().ok()?;
            let hidden = name.starts_with('.') && !name_part.starts_with('.');
            if hidden || !name.starts_with(name_part) {
                return None;
            }
            let slash = if e.path().is_dir() { "/" } else { "" };
            Some(pair(format!("{}{}{}", dir_part, name, slash)))
        })
        .collect();
    found.sort_by(|a, b| a.replacement.cmp(&b.replacement));
    found
}

fn pair(text: String) -> Pair {
    Pair {
        display: text.clone(),
        replacement: text,
    }
}

impl Completer for KashHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        Ok(self.candidates(line, pos))
    }
}

impl rustyline::Helper for KashHelper {}
impl rustyline::highlight::Highlighter for KashHelper {}
impl rustyline::hint::Hinter for KashHelper {
    type Hint = String;
}
impl rustyline::validate::Validator for KashHelper {}
