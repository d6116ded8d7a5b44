//! The script evaluator a line falls back to when no command matches.
//!
//! The shell only needs the [`Engine`] trait; [`Calculator`] is the evaluator
//! the binary ships with. It understands:
//! - Integer arithmetic: `+`, `-`, `*`, `/`, `%`
//! - Unary minus and parentheses for grouping
//! - Double-quoted string literals
//!
//! A blank input evaluates to [`Value::Unit`].

use std::fmt;
use thiserror::Error;

/// Result of a successful evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Nothing to print.
    Unit,
    Int(i64),
    Str(String),
}

impl Value {
    /// Text written to stdout, if any.
    pub fn into_output(self) -> Option<String> {
        match self {
            Value::Unit => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => Ok(()),
            Value::Int(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("syntax error at {pos}: {message}")]
    Syntax { pos: usize, message: String },
    #[error("division by zero")]
    DivisionByZero,
    #[error("arithmetic overflow")]
    Overflow,
    #[error("cannot apply '{op}' to {left} and {right}")]
    Type {
        op: char,
        left: String,
        right: String,
    },
}

/// A pluggable expression evaluator.
pub trait Engine: Send + Sync {
    fn eval(&self, text: &str) -> Result<Value, EvalError>;
}

/// Default evaluator: integer arithmetic and string literals.
#[derive(Debug, Clone, Copy, Default)]
pub struct Calculator;

impl Engine for Calculator {
    fn eval(&self, text: &str) -> Result<Value, EvalError> {
        let mut parser = ExprParser::new(text);
        if parser.peek().is_none() {
            return Ok(Value::Unit);
        }
        let value = parser.parse_expr()?;
        parser.expect_end()?;
        Ok(value)
    }
}

/// Recursive descent parser for the calculator grammar.
struct ExprParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> ExprParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.input[self.pos..].chars().next() {
            if ch.is_whitespace() {
                self.pos += ch.len_utf8();
            } else {
                break;
            }
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        self.skip_whitespace();
        let ch = self.input[self.pos..].chars().next()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn error(&self, message: impl Into<String>) -> EvalError {
        EvalError::Syntax {
            pos: self.pos,
            message: message.into(),
        }
    }

    fn expect_end(&mut self) -> Result<(), EvalError> {
        match self.peek() {
            None => Ok(()),
            Some(ch) => Err(self.error(format!("unexpected '{}'", ch))),
        }
    }

    /// Handles + and - (lowest precedence).
    fn parse_expr(&mut self) -> Result<Value, EvalError> {
        let mut left = self.parse_term()?;
        while let Some(op @ ('+' | '-')) = self.peek() {
            self.advance();
            let right = self.parse_term()?;
            left = binary(op, left, right)?;
        }
        Ok(left)
    }

    /// Handles * / %.
    fn parse_term(&mut self) -> Result<Value, EvalError> {
        let mut left = self.parse_unary()?;
        while let Some(op @ ('*' | '/' | '%')) = self.peek() {
            self.advance();
            let right = self.parse_unary()?;
            left = binary(op, left, right)?;
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Value, EvalError> {
        if self.peek() == Some('-') {
            self.advance();
            return match self.parse_unary()? {
                Value::Int(n) => n.checked_neg().map(Value::Int).ok_or(EvalError::Overflow),
                other => Err(EvalError::Type {
                    op: '-',
                    left: String::new(),
                    right: describe(&other),
                }),
            };
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Value, EvalError> {
        match self.peek() {
            Some('(') => {
                self.advance();
                let value = self.parse_expr()?;
                match self.advance() {
                    Some(')') => Ok(value),
                    _ => Err(self.error("expected ')'")),
                }
            }
            Some('"') => {
                self.advance();
                let rest = &self.input[self.pos..];
                let end = rest.find('"').ok_or_else(|| self.error("unterminated string"))?;
                let s = rest[..end].to_string();
                self.pos += end + 1;
                Ok(Value::Str(s))
            }
            Some(ch) if ch.is_ascii_digit() => {
                let start = self.pos;
                while let Some(c) = self.input[self.pos..].chars().next() {
                    if c.is_ascii_digit() {
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                self.input[start..self.pos]
                    .parse()
                    .map(Value::Int)
                    .map_err(|_| EvalError::Overflow)
            }
            Some(ch) => Err(self.error(format!("unexpected '{}'", ch))),
            None => Err(self.error("unexpected end of input")),
        }
    }
}

fn binary(op: char, left: Value, right: Value) -> Result<Value, EvalError> {
    match (op, left, right) {
        (op, Value::Int(a), Value::Int(b)) => {
            let result = match op {
                '+' => a.checked_add(b),
                '-' => a.checked_sub(b),
                '*' => a.checked_mul(b),
                '/' | '%' if b == 0 => return Err(EvalError::DivisionByZero),
                '/' => a.checked_div(b),
                _ => a.checked_rem(b),
            };
            result.map(Value::Int).ok_or(EvalError::Overflow)
        }
        ('+', Value::Str(a), b) => Ok(Value::Str(format!("{}{}", a, b))),
        (op, left, right) => Err(EvalError::Type {
            op,
            left: describe(&left),
            right: describe(&right),
        }),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Unit => "unit".to_string(),
        Value::Int(_) => "int".to_string(),
        Value::Str(_) => "string".to_string(),
    }
}
