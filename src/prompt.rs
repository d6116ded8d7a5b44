use crate::runner::LineRunner;
use crate::session::Session;
use std::path::{Component, Path, PathBuf};

pub const GREEN: &str = "\x1b[32m";
pub const RESET: &str = "\x1b[0m";

/// Computes the text shown before each line from the session's template.
///
/// A blank template gives [`default_prompt`]. A template wrapped in backticks
/// is run as a command and its output becomes the prompt. Anything else is
/// shown as is.
pub fn prompt(runner: &dyn LineRunner, session: &mut Session) -> String {
    let template = session.prompt.clone();
    if template.trim().is_empty() {
        return default_prompt(session.cwd());
    }

    let Some(command) = backtick_command(&template) else {
        return template;
    };
    match runner.run_line(command, session, false) {
        Ok(r) if r.is_success() => r
            .stdout
            .map(|out| out.trim_end_matches('\n').to_string())
            .unwrap_or_default(),
        Ok(r) => format!(
            "Error running command {}: '{}'  ",
            template,
            r.stderr.unwrap_or_default().trim_end()
        ),
        Err(e) => format!("Error running command {}: '{}'  ", template, e),
    }
}

/// The last two segments of `dir` followed by a green `$ `.
pub fn default_prompt(dir: &Path) -> String {
    let names: Vec<_> = dir
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect();
    let shown = if names.len() > 2 {
        names[names.len() - 2..].iter().collect::<PathBuf>()
    } else {
        dir.to_path_buf()
    };
    format!("{}{}$ {}", shown.display(), GREEN, RESET)
}

fn backtick_command(template: &str) -> Option<&str> {
    let inner = template.strip_prefix('`')?.strip_suffix('`')?;
    Some(inner)
}
