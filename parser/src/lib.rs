pub mod from_yaml;
pub mod lexer;

pub use from_yaml::*;

use std::collections::BTreeMap;
use std::fmt;

use lexer::{LexerError, Token, Tokenizer};

/// A parsed YAML-subset document. Owns its scalars rather than borrowing
/// from the source text, since configuration is parsed once at startup and
/// then lives for the rest of the process.
#[derive(Debug, Clone, PartialEq)]
pub enum YamlValue {
    Map(BTreeMap<String, YamlValue>),
    List(Vec<YamlValue>),
    Scalar(String),
}

impl YamlValue {
    pub fn get(&self, key: &str) -> Option<&YamlValue> {
        match self {
            YamlValue::Map(m) => m.get(key),
            _ => None,
        }
    }

    pub fn index(&self, i: usize) -> Option<&YamlValue> {
        match self {
            YamlValue::List(l) => l.get(i),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            YamlValue::Scalar(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum YamlError {
    Lexer(String),
    Generic(String),
}

impl fmt::Display for YamlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YamlError::Lexer(s) => write!(f, "yaml lexer error: {}", s),
            YamlError::Generic(s) => write!(f, "{}", s),
        }
    }
}

impl std::error::Error for YamlError {}

impl From<LexerError> for YamlError {
    fn from(e: LexerError) -> Self {
        YamlError::Lexer(e.to_string())
    }
}

impl From<String> for YamlError {
    fn from(s: String) -> Self {
        YamlError::Generic(s)
    }
}

pub struct Parser<'a> {
    tokenizer: Tokenizer<'a>,
    lookahead: Token,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Result<Self, YamlError> {
        let mut tokenizer = Tokenizer::new(source);
        let first = tokenizer.next_token()?;
        Ok(Self {
            tokenizer,
            lookahead: first,
        })
    }

    fn skip_junk(&mut self) -> Result<(), YamlError> {
        while self.lookahead == Token::NewLine {
            self.advance()?;
        }
        Ok(())
    }

    fn advance(&mut self) -> Result<(), YamlError> {
        self.lookahead = self.tokenizer.next_token()?;
        Ok(())
    }

    pub fn parse(&mut self) -> Result<YamlValue, YamlError> {
        self.skip_junk()?;
        if let Token::Indent(n) = self.lookahead {
            let start_indent = n;
            self.advance()?;
            self.parse_value(start_indent)
        } else {
            self.parse_value(0)
        }
    }

    fn parse_value(&mut self, current_indent: usize) -> Result<YamlValue, YamlError> {
        self.skip_junk()?;

        match self.lookahead.clone() {
            Token::Indent(n) => {
                if n > current_indent {
                    self.advance()?;
                    if self.lookahead == Token::Dash {
                        return self.parse_list(n, current_indent);
                    }
                    return self.parse_value(n);
                }
                Ok(YamlValue::Scalar(String::new()))
            }
            Token::Dash => self.parse_list(current_indent, current_indent),
            Token::OpenBracket => self.parse_bracket_list(),
            Token::OpenBrace => self.parse_brace_map(),
            Token::Identifier(s) => {
                self.advance()?;
                if self.lookahead == Token::Colon {
                    self.parse_map(s, current_indent)
                } else {
                    Ok(YamlValue::Scalar(s))
                }
            }
            Token::Scalar(s) => {
                self.advance()?;
                Ok(YamlValue::Scalar(s))
            }
            other => Err(YamlError::Generic(format!("expected value, found {:?}", other))),
        }
    }

    fn parse_list(
        &mut self,
        list_indent: usize,
        parent_indent: usize,
    ) -> Result<YamlValue, YamlError> {
        let mut items = Vec::new();

        loop {
            if self.lookahead != Token::Dash {
                break;
            }
            self.advance()?;
            items.push(self.parse_value(list_indent + 2)?);
            self.skip_junk()?;

            if let Token::Indent(n) = self.lookahead {
                if n == list_indent {
                    self.advance()?;
                    if self.lookahead != Token::Dash {
                        return Err(YamlError::Generic(format!(
                            "expected '-' for list item, found {:?}",
                            self.lookahead
                        )));
                    }
                    continue;
                } else if n <= parent_indent {
                    break;
                } else {
                    return Err(YamlError::Generic(format!(
                        "sequence items must align at column {}, found {}",
                        list_indent, n
                    )));
                }
            } else if self.lookahead != Token::Dash {
                break;
            }
        }
        Ok(YamlValue::List(items))
    }

    fn parse_brace_map(&mut self) -> Result<YamlValue, YamlError> {
        self.advance()?;
        let mut map = BTreeMap::new();
        while self.lookahead != Token::CloseBrace && self.lookahead != Token::Eof {
            if matches!(self.lookahead, Token::Indent(_) | Token::NewLine) {
                self.advance()?;
                continue;
            }

            let key = match self.lookahead.clone() {
                Token::Identifier(s) => {
                    self.advance()?;
                    s
                }
                _ => return Err(YamlError::Generic("expected identifier".into())),
            };

            if self.lookahead != Token::Colon {
                return Err(YamlError::Generic("expected ':'".into()));
            }
            self.advance()?;

            let value = self.parse_value(0)?;
            map.insert(key, value);

            if self.lookahead == Token::Comma {
                self.advance()?;
                while matches!(self.lookahead, Token::Indent(_) | Token::NewLine) {
                    self.advance()?;
                }
            }
        }

        if self.lookahead != Token::CloseBrace {
            return Err(YamlError::Generic("expected closing brace '}'".into()));
        }
        self.advance()?;
        Ok(YamlValue::Map(map))
    }

    fn parse_bracket_list(&mut self) -> Result<YamlValue, YamlError> {
        self.advance()?;
        let mut items = Vec::new();
        while self.lookahead != Token::CloseBracket && self.lookahead != Token::Eof {
            if matches!(self.lookahead, Token::Indent(_) | Token::NewLine) {
                self.advance()?;
                continue;
            }

            items.push(self.parse_value(0)?);

            if self.lookahead == Token::Comma {
                self.advance()?;
                while matches!(self.lookahead, Token::Indent(_) | Token::NewLine) {
                    self.advance()?;
                }
            }
        }

        if self.lookahead != Token::CloseBracket {
            return Err(YamlError::Generic("expected closing bracket ']'".into()));
        }
        self.advance()?;
        Ok(YamlValue::List(items))
    }

    fn parse_map(&mut self, first_key: String, map_indent: usize) -> Result<YamlValue, YamlError> {
        let mut map = BTreeMap::new();
        let mut current_key = first_key;

        loop {
            if self.lookahead != Token::Colon {
                return Err(YamlError::Generic(format!(
                    "expected ':' after '{}', found {:?}",
                    current_key, self.lookahead
                )));
            }
            self.advance()?;
            self.skip_junk()?;

            let value = self.parse_value(map_indent)?;
            if map.insert(current_key.clone(), value).is_some() {
                return Err(YamlError::Generic(format!(
                    "duplicate key found: {}",
                    current_key
                )));
            }

            self.skip_junk()?;

            if let Token::Indent(n) = self.lookahead {
                if n == map_indent {
                    self.advance()?;
                    match self.lookahead.clone() {
                        Token::Identifier(s) => {
                            current_key = s;
                            self.advance()?;
                            continue;
                        }
                        other => {
                            return Err(YamlError::Generic(format!(
                                "expected identifier for map key, found {:?}",
                                other
                            )));
                        }
                    }
                } else {
                    break;
                }
            }
            break;
        }
        Ok(YamlValue::Map(map))
    }
}
