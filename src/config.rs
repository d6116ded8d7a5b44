use crate::session::Session;
use argh::FromArgs;
use std::path::PathBuf;

pub const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(FromArgs, Debug, Default)]
/// A command shell that evaluates what it cannot run.
pub struct Options {
    #[argh(option, short = 'c')]
    /// run one line, print its output and exit with its return code.
    pub command: Option<String>,

    #[argh(option)]
    /// prompt template. Wrap it in backticks to use a command's output.
    pub prompt: Option<String>,

    #[argh(option)]
    /// directory searched for .kash scripts. May be repeated.
    pub script_path: Vec<PathBuf>,

    #[argh(option)]
    /// log filter such as `debug` or `kash::runner=trace`.
    pub log_level: Option<String>,
}

/// Startup settings: command line first, then `KASH_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub command: Option<String>,
    pub prompt: String,
    pub script_paths: Vec<PathBuf>,
    pub log_filter: String,
}

impl Config {
    pub fn from_env(options: Options) -> Self {
        Self::resolve(options, |name| std::env::var(name).ok())
    }

    fn resolve(options: Options, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let script_paths = if options.script_path.is_empty() {
            lookup("KASH_PATH")
                .map(|paths| {
                    std::env::split_paths(&paths)
                        .filter(|p| !p.as_os_str().is_empty())
                        .collect()
                })
                .unwrap_or_default()
        } else {
            options.script_path
        };

        Self {
            command: options.command,
            prompt: options
                .prompt
                .or_else(|| lookup("KASH_PROMPT"))
                .unwrap_or_default(),
            script_paths,
            log_filter: options
                .log_level
                .or_else(|| lookup("KASH_LOG"))
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        }
    }

    pub fn apply(&self, session: &mut Session) {
        session.prompt = self.prompt.clone();
        session.script_paths = self.script_paths.clone();
    }
}
