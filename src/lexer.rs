//! Lexical analysis (tokenization) of one input line.

use crate::parser::{TokenizingError, Word};
use std::ops::Range;

/// Represents a token resulting from lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A word, possibly carrying the quote character that surrounded it.
    Word(Word),
    /// The pipe operator, `|`.
    Pipe,
    /// The background marker, `&`.
    Ampersand,
    /// The list separator, `;`.
    Semicolon,
    /// A parenthesized sub-shell. Contains the raw text inside the parentheses.
    SubShell(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
    /// Inside a quoted region closed by the given character.
    Quoted(char),
}

const QUOTES: [char; 3] = ['"', '\'', '`'];

struct LexingFSM {
    input: Vec<char>,
    pos: usize,
    state: LexingState,
    buffer: String,
    quote: Option<char>,
    substitutions: Vec<Range<usize>>,
}

impl LexingFSM {
    fn new(line: &str) -> Self {
        LexingFSM {
            input: line.chars().collect(),
            pos: 0,
            state: LexingState::Start,
            buffer: String::new(),
            quote: None,
            substitutions: Vec::new(),
        }
    }

    /// Runs the machine over the whole input.
    ///
    /// Fails on an unclosed quote or an unbalanced parenthesis.
    fn make_tokens(&mut self) -> Result<Vec<Token>, TokenizingError> {
        let mut out = Vec::new();

        while let Some(ch) = self.read_char() {
            match self.state {
                LexingState::Start => self.handle_start(ch, &mut out)?,
                LexingState::ReadingWord => self.handle_word(ch, &mut out)?,
                LexingState::Quoted(q) => self.handle_quoted(ch, q),
            }
        }

        match self.state {
            LexingState::Quoted(q) => Err(TokenizingError::UnfinishedQuote(q)),
            LexingState::ReadingWord => {
                self.finish_word(&mut out);
                Ok(out)
            }
            LexingState::Start => Ok(out),
        }
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn operator(ch: char) -> Option<Token> {
        match ch {
            '|' => Some(Token::Pipe),
            '&' => Some(Token::Ampersand),
            ';' => Some(Token::Semicolon),
            _ => None,
        }
    }

    fn handle_start(&mut self, ch: char, out: &mut Vec<Token>) -> Result<(), TokenizingError> {
        match ch {
            c if c.is_whitespace() => {}
            '(' => out.push(Token::SubShell(self.collect_subshell()?)),
            ')' => return Err(TokenizingError::UnbalancedParen(self.pos - 1)),
            c if QUOTES.contains(&c) => {
                self.quote = Some(c);
                self.open_quote(c);
            }
            c => match Self::operator(c) {
                Some(token) => out.push(token),
                None => {
                    self.buffer.push(c);
                    self.state = LexingState::ReadingWord;
                }
            },
        }
        Ok(())
    }

    fn handle_word(&mut self, ch: char, out: &mut Vec<Token>) -> Result<(), TokenizingError> {
        match ch {
            c if c.is_whitespace() => {
                self.finish_word(out);
                self.state = LexingState::Start;
            }
            ')' => return Err(TokenizingError::UnbalancedParen(self.pos - 1)),
            c if QUOTES.contains(&c) => {
                // The first quote of a word becomes its marker.
                self.quote.get_or_insert(c);
                self.open_quote(c);
            }
            c => match Self::operator(c) {
                Some(token) => {
                    self.finish_word(out);
                    out.push(token);
                    self.state = LexingState::Start;
                }
                None => self.buffer.push(c),
            },
        }
        Ok(())
    }

    fn open_quote(&mut self, quote: char) {
        if quote == '`' {
            let at = self.buffer.len();
            self.substitutions.push(at..at);
        }
        self.state = LexingState::Quoted(quote);
    }

    fn handle_quoted(&mut self, ch: char, quote: char) {
        if ch == quote {
            if quote == '`' {
                if let Some(span) = self.substitutions.last_mut() {
                    span.end = self.buffer.len();
                }
            }
            self.state = LexingState::ReadingWord;
        } else {
            self.buffer.push(ch);
        }
    }

    /// Collects the characters of a `( ... )` block, tracking nesting depth.
    /// Parentheses inside quotes do not count.
    fn collect_subshell(&mut self) -> Result<String, TokenizingError> {
        let open = self.pos - 1;
        let mut depth = 1;
        let mut quote: Option<char> = None;
        let mut s = String::new();
        while let Some(ch) = self.read_char() {
            match (quote, ch) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, c) if QUOTES.contains(&c) => quote = Some(c),
                (None, '(') => depth += 1,
                (None, ')') => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(s);
                    }
                }
                _ => {}
            }
            s.push(ch);
        }
        Err(TokenizingError::UnbalancedParen(open))
    }

    fn finish_word(&mut self, out: &mut Vec<Token>) {
        out.push(Token::Word(Word {
            content: std::mem::take(&mut self.buffer),
            surrounded_by: self.quote.take(),
            substitutions: std::mem::take(&mut self.substitutions),
        }));
    }
}

/// Splits `line` into tokens.
pub fn split_into_tokens(line: &str) -> Result<Vec<Token>, TokenizingError> {
    LexingFSM::new(line).make_tokens()
}
