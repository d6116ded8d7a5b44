//! kash: a command shell that falls back to evaluating an expression.
//!
//! A line is tokenized and parsed into a [`parser::SimpleList`], the words of
//! every command are rewritten by the [`transform`] chain (tilde, glob,
//! backtick, variables) and the first word is looked up by the
//! [`finder::CommandFinder`]: builtins first, then `.kash` scripts, then
//! programs on the `PATH`. When nothing matches, or the line is not shell
//! syntax at all, the raw text goes to the session's [`engine::Engine`].
//!
//! [`Shell`] ties this together behind [`LineRunner::run_line`]; the same entry
//! point serves prompts, backtick substitution and sub-shells.

pub mod builtin;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod external;
pub mod finder;
pub mod io;
mod lexer;
pub mod parser;
pub mod prompt;
pub mod repl;
pub mod runner;
pub mod script;
pub mod session;
pub mod transform;

pub use command::{CommandResult, ExitCode};
pub use error::ShellError;
pub use runner::{LineRunner, Shell};
pub use session::Session;
