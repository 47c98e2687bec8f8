//! Hand-written lexer and recursive-descent parser for filter expressions

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{CompareOp, Literal, Predicate};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Comma,
    Str(String),
    Word(String),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::LParen => "`(`".to_string(),
            Self::RParen => "`)`".to_string(),
            Self::Comma => "`,`".to_string(),
            Self::Str(s) => format!("'{s}'"),
            Self::Word(w) => format!("`{w}`"),
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Self::Word(w) if w.eq_ignore_ascii_case(keyword))
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '\'' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('\'') if chars.peek() == Some(&'\'') => {
                            chars.next();
                            text.push('\'');
                        }
                        Some('\'') => break,
                        Some(ch) => text.push(ch),
                        None => {
                            return Err(Error::ParseError(format!(
                                "Unterminated string literal '{text}"
                            )))
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            _ => {
                let mut word = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || matches!(ch, '(' | ')' | ',' | '\'') {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }
    Ok(tokens)
}

fn compare_op(word: &str) -> Option<CompareOp> {
    match word.to_ascii_lowercase().as_str() {
        "eq" => Some(CompareOp::Eq),
        "ne" => Some(CompareOp::Ne),
        "lt" => Some(CompareOp::Lt),
        "le" => Some(CompareOp::Le),
        "gt" => Some(CompareOp::Gt),
        "ge" => Some(CompareOp::Ge),
        _ => None,
    }
}

/// Interpret an unquoted word as a literal.
fn unquoted_literal(word: &str) -> Result<Literal> {
    if word.eq_ignore_ascii_case("true") {
        return Ok(Literal::Bool(true));
    }
    if word.eq_ignore_ascii_case("false") {
        return Ok(Literal::Bool(false));
    }
    if let Ok(i) = word.parse::<i64>() {
        return Ok(Literal::Int(i));
    }
    if word.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+' || c == '.') {
        if let Ok(v) = word.parse::<f64>() {
            if v.is_finite() {
                return Ok(Literal::Float(v));
            }
        }
    }
    if let Ok(instant) = DateTime::parse_from_rfc3339(word) {
        return Ok(Literal::DateTime(instant.with_timezone(&Utc)));
    }
    if Uuid::parse_str(word).is_ok() {
        return Ok(Literal::Guid(word.to_string()));
    }
    Err(Error::ParseError(format!(
        "`{word}` is not a literal (quote strings with '...')"
    )))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        match self.next() {
            Some(token) if &token == expected => Ok(()),
            Some(token) => Err(Error::ParseError(format!(
                "Expected {}, found {}",
                expected.describe(),
                token.describe()
            ))),
            None => Err(Error::ParseError(format!(
                "Expected {}, found end of filter",
                expected.describe()
            ))),
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_keyword(keyword)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or_expr(&mut self) -> Result<Predicate> {
        let mut left = self.and_expr()?;
        while self.eat_keyword("or") {
            let right = self.and_expr()?;
            left = Predicate::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Predicate> {
        let mut left = self.not_expr()?;
        while self.eat_keyword("and") {
            let right = self.not_expr()?;
            left = Predicate::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Predicate> {
        if self.eat_keyword("not") {
            return Ok(Predicate::Not(Box::new(self.not_expr()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Predicate> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.or_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Word(word))
                if word.eq_ignore_ascii_case("contains") && self.peek() == Some(&Token::LParen) =>
            {
                self.expect(&Token::LParen)?;
                let field = self.field()?;
                self.expect(&Token::Comma)?;
                let value = self.literal()?;
                self.expect(&Token::RParen)?;
                Ok(Predicate::Contains { field, value })
            }
            Some(Token::Word(field)) => {
                let op = match self.next() {
                    Some(Token::Word(w)) => compare_op(&w).ok_or_else(|| {
                        Error::ParseError(format!("Unknown operator `{w}` after `{field}`"))
                    })?,
                    Some(other) => {
                        return Err(Error::ParseError(format!(
                            "Expected an operator after `{field}`, found {}",
                            other.describe()
                        )))
                    }
                    None => {
                        return Err(Error::ParseError(format!(
                            "Expected an operator after `{field}`"
                        )))
                    }
                };
                let value = self.literal()?;
                Ok(Predicate::Compare { field, op, value })
            }
            Some(other) => Err(Error::ParseError(format!(
                "Expected a comparison, found {}",
                other.describe()
            ))),
            None => Err(Error::ParseError("Filter ended unexpectedly".to_string())),
        }
    }

    fn field(&mut self) -> Result<String> {
        match self.next() {
            Some(Token::Word(w)) => Ok(w),
            Some(other) => Err(Error::ParseError(format!(
                "Expected a field name, found {}",
                other.describe()
            ))),
            None => Err(Error::ParseError("Expected a field name".to_string())),
        }
    }

    fn literal(&mut self) -> Result<Literal> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Literal::String(s)),
            Some(Token::Word(w)) => unquoted_literal(&w),
            Some(other) => Err(Error::ParseError(format!(
                "Expected a literal, found {}",
                other.describe()
            ))),
            None => Err(Error::ParseError("Expected a literal".to_string())),
        }
    }
}

/// Parse a filter expression.
pub(super) fn parse_filter(input: &str) -> Result<Predicate> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(Error::ParseError("Empty filter expression".to_string()));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let predicate = parser.or_expr()?;
    match parser.next() {
        None => Ok(predicate),
        Some(token) => Err(Error::ParseError(format!(
            "Unexpected {} after complete expression",
            token.describe()
        ))),
    }
}

/// Split `$a=..&$b=..` on `&` outside quoted strings.
pub(super) fn split_options(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in text.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            '&' if !quoted => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts.into_iter().filter(|p| !p.trim().is_empty()).collect()
}
