//! Turns a token stream into the structure the line runner works on.
//!
//! ```text
//! list     := pipeline (';' pipeline)* ';'? '&'?
//! pipeline := stage ('|' stage)*
//! stage    := '(' ... ')' | word+
//! ```

use crate::lexer::{self, Token};
use std::ops::Range;
use thiserror::Error;

/// A single token with its text and the quote character that surrounded it,
/// if any.
///
/// `substitutions` holds the byte ranges of `content` that were written inside
/// backticks; only those ranges are run by command substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub content: String,
    pub surrounded_by: Option<char>,
    pub substitutions: Vec<Range<usize>>,
}

impl Word {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            surrounded_by: None,
            substitutions: Vec::new(),
        }
    }

    /// A word written entirely inside `quote`. A backtick word is one
    /// substitution covering all of it.
    pub fn quoted(content: impl Into<String>, quote: char) -> Self {
        let content = content.into();
        let substitutions = if quote == '`' {
            vec![0..content.len()]
        } else {
            Vec::new()
        };
        Self {
            content,
            surrounded_by: Some(quote),
            substitutions,
        }
    }

    pub fn is_quoted(&self) -> bool {
        self.surrounded_by.is_some()
    }
}

/// A command name plus arguments.
///
/// `content` is rewritten in place by the word transformers; `words` holds the
/// flattened argument vector once they have run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleCommand {
    pub content: Vec<Word>,
    pub words: Vec<String>,
}

impl SimpleCommand {
    pub fn new(content: Vec<Word>) -> Self {
        let words = content.iter().map(|w| w.content.clone()).collect();
        Self { content, words }
    }
}

/// One stage of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandContent {
    Simple(SimpleCommand),
    /// Raw text between the parentheses of a `( ... )` stage.
    SubShell(String),
}

/// Stages joined by `|`. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineCommand {
    pub content: Vec<CommandContent>,
}

/// Everything on one input line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimpleList {
    pub content: Vec<PipelineCommand>,
    /// Set by a trailing `&`.
    pub background: bool,
}

impl SimpleList {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn simple_commands_mut(&mut self) -> impl Iterator<Item = &mut SimpleCommand> {
        self.content
            .iter_mut()
            .flat_map(|p| p.content.iter_mut())
            .filter_map(|c| match c {
                CommandContent::Simple(cmd) => Some(cmd),
                CommandContent::SubShell(_) => None,
            })
    }
}

/// The line is not valid shell syntax.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenizingError {
    #[error("unfinished {0} quote")]
    UnfinishedQuote(char),
    #[error("unbalanced parenthesis at column {0}")]
    UnbalancedParen(usize),
    #[error("empty command")]
    EmptyCommand,
    #[error("'&' is only allowed at the end of a line")]
    MisplacedAmpersand,
    #[error("a sub-shell must be a whole pipeline stage")]
    MisplacedSubShell,
}

struct ListBuilder {
    tokens: Vec<Token>,
    pos: usize,
}

impl ListBuilder {
    fn from(tokens: Vec<Token>) -> Self {
        ListBuilder { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn build_list(mut self) -> Result<SimpleList, TokenizingError> {
        let mut list = SimpleList::default();

        while self.peek().is_some() {
            list.content.push(self.parse_pipeline()?);
            match self.consume() {
                Some(Token::Semicolon) | None => {}
                Some(Token::Ampersand) => {
                    if self.peek().is_some() {
                        return Err(TokenizingError::MisplacedAmpersand);
                    }
                    list.background = true;
                }
                Some(_) => return Err(TokenizingError::MisplacedSubShell),
            }
        }

        Ok(list)
    }

    /// Parse a pipeline: stage ('|' stage)*
    fn parse_pipeline(&mut self) -> Result<PipelineCommand, TokenizingError> {
        let mut content = vec![self.parse_stage()?];
        while let Some(Token::Pipe) = self.peek() {
            self.consume();
            content.push(self.parse_stage()?);
        }
        Ok(PipelineCommand { content })
    }

    fn parse_stage(&mut self) -> Result<CommandContent, TokenizingError> {
        if let Some(Token::SubShell(inner)) = self.peek().cloned() {
            self.consume();
            return match self.peek() {
                Some(Token::Word(_)) | Some(Token::SubShell(_)) => {
                    Err(TokenizingError::MisplacedSubShell)
                }
                _ => Ok(CommandContent::SubShell(inner)),
            };
        }

        let mut words = Vec::new();
        while let Some(Token::Word(_)) = self.peek() {
            if let Some(Token::Word(w)) = self.consume() {
                words.push(w);
            }
        }
        match self.peek() {
            Some(Token::SubShell(_)) => Err(TokenizingError::MisplacedSubShell),
            _ if words.is_empty() => Err(TokenizingError::EmptyCommand),
            _ => Ok(CommandContent::Simple(SimpleCommand::new(words))),
        }
    }
}

/// Parses one input line. A blank line yields an empty list.
pub fn parse(line: &str) -> Result<SimpleList, TokenizingError> {
    let tokens = lexer::split_into_tokens(line)?;
    ListBuilder::from(tokens).build_list()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple(words: &[&str]) -> CommandContent {
        CommandContent::Simple(SimpleCommand::new(words.iter().map(|w| Word::new(*w)).collect()))
    }

    #[test]
    fn test_blank_line_is_empty() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("   \t").unwrap().is_empty());
    }

    #[test]
    fn test_pipelines_and_lists() {
        let list = parse("echo a | wc ; pwd").unwrap();
        assert!(!list.background);
        assert_eq!(list.content.len(), 2);
        assert_eq!(list.content[0].content, vec![simple(&["echo", "a"]), simple(&["wc"])]);
        assert_eq!(list.content[1].content, vec![simple(&["pwd"])]);
    }

    #[test]
    fn test_background_subshell() {
        let list = parse("(sleep 1; echo done) &").unwrap();
        assert!(list.background);
        assert_eq!(
            list.content[0].content,
            vec![CommandContent::SubShell("sleep 1; echo done".to_string())]
        );
    }

    #[test]
    fn test_trailing_semicolon_is_allowed() {
        let list = parse("pwd;").unwrap();
        assert_eq!(list.content.len(), 1);
    }

    #[test]
    fn test_syntax_errors() {
        assert_eq!(parse("| wc"), Err(TokenizingError::EmptyCommand));
        assert_eq!(parse("echo a |"), Err(TokenizingError::EmptyCommand));
        assert_eq!(parse("a & b"), Err(TokenizingError::MisplacedAmpersand));
        assert_eq!(parse("(1 + 2) * 3"), Err(TokenizingError::MisplacedSubShell));
        assert_eq!(parse("echo (x)"), Err(TokenizingError::MisplacedSubShell));
    }

    #[test]
    fn test_simple_commands_mut_skips_subshells() {
        let mut list = parse("(a) | b c").unwrap();
        let names: Vec<String> = list
            .simple_commands_mut()
            .map(|c| c.words[0].clone())
            .collect();
        assert_eq!(names, vec!["b".to_string()]);
    }
}
