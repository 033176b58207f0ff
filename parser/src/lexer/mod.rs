pub mod tokens;

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

pub use tokens::{Loc, Token};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexerError {
    pub message: String,
    pub loc: Loc,
}

impl fmt::Display for LexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at line {}, col {}",
            self.message, self.loc.line, self.loc.col
        )
    }
}

impl std::error::Error for LexerError {}

/// Tokenizes an indentation-sensitive YAML subset: block maps, block and
/// inline lists, quoted and bare scalars. Streams one token at a time so
/// the parser can keep its single-token-lookahead shape.
pub struct Tokenizer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    col: usize,
    at_line_start: bool,
    done: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            col: 1,
            at_line_start: true,
            done: false,
        }
    }

    fn loc(&self) -> Loc {
        Loc {
            line: self.line,
            col: self.col,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    pub fn next_token(&mut self) -> Result<Token, LexerError> {
        if self.done {
            return Ok(Token::Eof);
        }

        if self.at_line_start {
            if let Some(tok) = self.consume_indent()? {
                self.at_line_start = false;
                return Ok(tok);
            }
            self.at_line_start = false;
        }

        self.skip_inline_space();

        let Some(ch) = self.peek() else {
            self.done = true;
            return Ok(Token::Eof);
        };

        match ch {
            '\n' => {
                self.bump();
                self.at_line_start = true;
                Ok(Token::NewLine)
            }
            '#' => {
                self.skip_comment();
                self.next_token()
            }
            ':' => {
                self.bump();
                Ok(Token::Colon)
            }
            ',' => {
                self.bump();
                Ok(Token::Comma)
            }
            '[' => {
                self.bump();
                Ok(Token::OpenBracket)
            }
            ']' => {
                self.bump();
                Ok(Token::CloseBracket)
            }
            '{' => {
                self.bump();
                Ok(Token::OpenBrace)
            }
            '}' => {
                self.bump();
                Ok(Token::CloseBrace)
            }
            '"' | '\'' => Ok(Token::Scalar(self.read_quoted(ch))),
            '-' => self.read_dash_or_text(),
            _ => self.read_identifier(),
        }
    }

    fn skip_inline_space(&mut self) {
        while let Some(c) = self.peek() {
            if c == ' ' || c == '\t' {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    /// Measures leading whitespace on a fresh line. Blank and comment-only
    /// lines are swallowed silently (no `Indent` token for them).
    fn consume_indent(&mut self) -> Result<Option<Token>, LexerError> {
        let mut spaces = 0usize;
        loop {
            match self.peek() {
                Some(' ') => {
                    spaces += 1;
                    self.bump();
                }
                Some('\t') => {
                    spaces += 4;
                    self.bump();
                }
                _ => break,
            }
        }
        match self.peek() {
            None => {
                self.done = true;
                Ok(None)
            }
            Some('\n') => {
                self.bump();
                self.at_line_start = true;
                Ok(None)
            }
            Some('#') => {
                self.skip_comment();
                self.at_line_start = true;
                Ok(None)
            }
            Some(_) => Ok(Some(Token::Indent(spaces))),
        }
    }

    fn read_quoted(&mut self, quote: char) -> String {
        self.bump();
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c == quote {
                self.bump();
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }

    fn read_dash_or_text(&mut self) -> Result<Token, LexerError> {
        self.bump();
        match self.peek() {
            Some(c) if !c.is_whitespace() => {
                let mut val = String::from("-");
                while let Some(c) = self.peek() {
                    if is_word_char(c) {
                        val.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                Ok(Token::Scalar(val))
            }
            _ => Ok(Token::Dash),
        }
    }

    fn read_identifier(&mut self) -> Result<Token, LexerError> {
        let loc = self.loc();
        let mut val = String::new();
        while let Some(c) = self.peek() {
            if is_word_char(c) {
                val.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if val.is_empty() {
            let c = self.peek().unwrap();
            self.bump();
            return Err(LexerError {
                message: format!("unexpected character '{}'", c),
                loc,
            });
        }
        Ok(Token::Identifier(val))
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '.' | '_' | '-' | '/' | '@')
}
