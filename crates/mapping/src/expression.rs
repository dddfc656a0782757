//! Column expressions.
//!
//! An expression is a field reference, a literal, a call of a built-in
//! function or a `+` of two expressions:
//!
//! ```text
//! html_untag(description)
//! "shoes-" + id
//! name.strip.downcase
//! ```
//!
//! Functions can be called as `f(x)` or `x.f`. Evaluation only sees the
//! fields of the source row.

use delta_core::{SourceRow, Value};
use std::fmt;

use crate::error::ConfigError;

/// Built-in functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    /// Remove `<...>` tags
    HtmlUntag,
    /// Backslash escape Groonga query syntax characters
    EscapeQuery,
    Downcase,
    Upcase,
    Strip,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "html_untag" => Function::HtmlUntag,
            "escape_query" => Function::EscapeQuery,
            "downcase" => Function::Downcase,
            "upcase" => Function::Upcase,
            "strip" => Function::Strip,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::HtmlUntag => "html_untag",
            Function::EscapeQuery => "escape_query",
            Function::Downcase => "downcase",
            Function::Upcase => "upcase",
            Function::Strip => "strip",
        }
    }

    fn apply(&self, text: &str) -> String {
        match self {
            Function::HtmlUntag => html_untag(text),
            Function::EscapeQuery => escape_query(text),
            Function::Downcase => text.to_lowercase(),
            Function::Upcase => text.to_uppercase(),
            Function::Strip => text.trim().to_string(),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    #[error("undefined field: {0}")]
    UndefinedField(String),

    #[error("{function}: invalid UTF-8 text")]
    InvalidText { function: String },

    #[error("can't add {left} and {right}")]
    InvalidAddition { left: String, right: String },

    #[error("integer overflow: {0} + {1}")]
    Overflow(i64, i64),
}

/// Parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    Field(String),
    Call(Function, Box<Expression>),
    Add(Box<Expression>, Box<Expression>),
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, ConfigError> {
        let tokens = tokenize(source)?;
        let mut parser = ExpressionParser {
            source,
            tokens,
            position: 0,
        };
        let expression = parser.parse_sum()?;
        if parser.position != parser.tokens.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(expression)
    }

    /// Field names the expression reads, in order of appearance.
    pub fn field_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_field_names(&mut names);
        names
    }

    fn collect_field_names<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Expression::Literal(_) => {}
            Expression::Field(name) => names.push(name),
            Expression::Call(_, argument) => argument.collect_field_names(names),
            Expression::Add(left, right) => {
                left.collect_field_names(names);
                right.collect_field_names(names);
            }
        }
    }

    pub fn evaluate(&self, row: &SourceRow) -> Result<Value, EvaluationError> {
        match self {
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Field(name) => row
                .get(name)
                .cloned()
                .ok_or_else(|| EvaluationError::UndefinedField(name.clone())),
            Expression::Call(function, argument) => {
                let value = argument.evaluate(row)?;
                if value.is_null() {
                    return Ok(Value::Null);
                }
                let text = value
                    .to_template_string()
                    .map_err(|_| EvaluationError::InvalidText {
                        function: function.name().to_string(),
                    })?;
                Ok(Value::Text(function.apply(&text)))
            }
            Expression::Add(left, right) => add(left.evaluate(row)?, right.evaluate(row)?),
        }
    }
}

fn add(left: Value, right: Value) -> Result<Value, EvaluationError> {
    match (&left, &right) {
        (Value::Int(l), Value::Int(r)) => l
            .checked_add(*r)
            .map(Value::Int)
            .ok_or(EvaluationError::Overflow(*l, *r)),
        (Value::Float(l), Value::Float(r)) => Ok(Value::Float(l + r)),
        (Value::Float(l), Value::Int(r)) => Ok(Value::Float(l + *r as f64)),
        (Value::Int(l), Value::Float(r)) => Ok(Value::Float(*l as f64 + r)),
        (Value::Null, _) | (_, Value::Null) => Err(EvaluationError::InvalidAddition {
            left: format!("{left:?}"),
            right: format!("{right:?}"),
        }),
        _ => {
            let invalid = || EvaluationError::InvalidText {
                function: "+".to_string(),
            };
            let mut text = left.to_template_string().map_err(|_| invalid())?;
            text.push_str(&right.to_template_string().map_err(|_| invalid())?);
            Ok(Value::Text(text))
        }
    }
}

fn html_untag(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('<') {
        output.push_str(&rest[..start]);
        let tag = &rest[start..];
        match tag.find(['>', '\n']) {
            Some(end) if tag.as_bytes()[end] == b'>' => rest = &tag[end + 1..],
            _ => {
                output.push('<');
                rest = &tag[1..];
            }
        }
    }
    output.push_str(rest);
    output
}

fn escape_query(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '+' | '-' | '<' | '>' | '~' | '*' | '(' | ')' | '"' | '\\' | ':'
        ) {
            output.push('\\');
        }
        output.push(c);
    }
    output
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Identifier(String),
    Text(String),
    Integer(i64),
    Float(f64),
    LeftParen,
    RightParen,
    Dot,
    Plus,
}

fn tokenize(source: &str) -> Result<Vec<Token>, ConfigError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' | ')' | '.' | '+' => {
                chars.next();
                tokens.push(match c {
                    '(' => Token::LeftParen,
                    ')' => Token::RightParen,
                    '.' => Token::Dot,
                    _ => Token::Plus,
                });
            }
            '"' | '\'' => {
                chars.next();
                let quote = c;
                let mut text = String::new();
                let mut terminated = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some((_, 'n')) => text.push('\n'),
                            Some((_, 't')) => text.push('\t'),
                            Some((_, escaped)) => text.push(escaped),
                            None => break,
                        },
                        c if c == quote => {
                            terminated = true;
                            break;
                        }
                        c => text.push(c),
                    }
                }
                if !terminated {
                    return Err(ConfigError::new(format!(
                        "unterminated string in expression: {source}"
                    )));
                }
                tokens.push(Token::Text(text));
            }
            c if c.is_ascii_digit() => {
                let mut end = start;
                let mut is_float = false;
                while let Some(&(index, c)) = chars.peek() {
                    let is_fraction = c == '.'
                        && !is_float
                        && source[index + 1..].starts_with(|c: char| c.is_ascii_digit());
                    if c.is_ascii_digit() || c == '_' || is_fraction {
                        is_float |= is_fraction;
                        end = index + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let literal = source[start..end].replace('_', "");
                let invalid =
                    || ConfigError::new(format!("invalid number {literal} in expression: {source}"));
                tokens.push(if is_float {
                    Token::Float(literal.parse().map_err(|_| invalid())?)
                } else {
                    Token::Integer(literal.parse().map_err(|_| invalid())?)
                });
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = start;
                while let Some(&(index, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        end = index + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Identifier(source[start..end].to_string()));
            }
            other => {
                return Err(ConfigError::new(format!(
                    "unexpected character {other:?} in expression: {source}"
                )))
            }
        }
    }
    Ok(tokens)
}

struct ExpressionParser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    position: usize,
}

impl ExpressionParser<'_> {
    fn error(&self, message: &str) -> ConfigError {
        ConfigError::new(format!("{message} in expression: {}", self.source))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ConfigError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            _ => Err(self.error(&format!("expected {expected:?}"))),
        }
    }

    fn parse_sum(&mut self) -> Result<Expression, ConfigError> {
        let mut expression = self.parse_postfix()?;
        while self.peek() == Some(&Token::Plus) {
            self.position += 1;
            let right = self.parse_postfix()?;
            expression = Expression::Add(Box::new(expression), Box::new(right));
        }
        Ok(expression)
    }

    fn parse_postfix(&mut self) -> Result<Expression, ConfigError> {
        let mut expression = self.parse_primary()?;
        while self.peek() == Some(&Token::Dot) {
            self.position += 1;
            let Some(Token::Identifier(name)) = self.next() else {
                return Err(self.error("expected a function name after '.'"));
            };
            let function = self.function(&name)?;
            if self.peek() == Some(&Token::LeftParen) {
                self.position += 1;
                self.expect(Token::RightParen)?;
            }
            expression = Expression::Call(function, Box::new(expression));
        }
        Ok(expression)
    }

    fn parse_primary(&mut self) -> Result<Expression, ConfigError> {
        match self.next() {
            Some(Token::Text(text)) => Ok(Expression::Literal(Value::Text(text))),
            Some(Token::Integer(i)) => Ok(Expression::Literal(Value::Int(i))),
            Some(Token::Float(f)) => Ok(Expression::Literal(Value::Float(f))),
            Some(Token::LeftParen) => {
                let expression = self.parse_sum()?;
                self.expect(Token::RightParen)?;
                Ok(expression)
            }
            Some(Token::Identifier(name)) => {
                if self.peek() == Some(&Token::LeftParen) {
                    self.position += 1;
                    let function = self.function(&name)?;
                    let argument = self.parse_sum()?;
                    self.expect(Token::RightParen)?;
                    return Ok(Expression::Call(function, Box::new(argument)));
                }
                Ok(match name.as_str() {
                    "nil" => Expression::Literal(Value::Null),
                    "true" => Expression::Literal(Value::Bool(true)),
                    "false" => Expression::Literal(Value::Bool(false)),
                    _ => Expression::Field(name),
                })
            }
            _ => Err(self.error("expected a value")),
        }
    }

    fn function(&self, name: &str) -> Result<Function, ConfigError> {
        Function::from_name(name).ok_or_else(|| self.error(&format!("unknown function {name}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[(&str, Value)]) -> SourceRow {
        fields
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    fn evaluate(source: &str, row: &SourceRow) -> Value {
        Expression::parse(source).unwrap().evaluate(row).unwrap()
    }

    #[test]
    fn test_field_reference_passes_value_through() {
        let row = row(&[("id", Value::UInt(7))]);
        assert_eq!(evaluate("id", &row), Value::UInt(7));
    }

    #[test]
    fn test_html_untag() {
        let row = row(&[("description", Value::from("<p>Hello <b>world</b></p> a < b"))]);
        assert_eq!(
            evaluate("html_untag(description)", &row),
            Value::from("Hello world a < b")
        );
    }

    #[test]
    fn test_escape_query() {
        let row = row(&[("q", Value::from("a (b) \"c\" -d"))]);
        assert_eq!(
            evaluate("escape_query(q)", &row),
            Value::from("a \\(b\\) \\\"c\\\" \\-d")
        );
    }

    #[test]
    fn test_method_chain_and_concatenation() {
        let row = row(&[("name", Value::from("  Shoes ")), ("id", Value::Int(3))]);
        assert_eq!(
            evaluate("'item-' + id + ':' + name.strip.downcase()", &row),
            Value::from("item-3:shoes")
        );
        assert_eq!(evaluate("id + 1", &row), Value::Int(4));
        assert_eq!(evaluate("upcase(\"a\")", &row), Value::from("A"));
    }

    #[test]
    fn test_field_names() {
        let expression = Expression::parse("html_untag(title) + body.strip").unwrap();
        assert_eq!(expression.field_names(), vec!["title", "body"]);
    }

    #[test]
    fn test_undefined_field() {
        let expression = Expression::parse("missing").unwrap();
        assert_eq!(
            expression.evaluate(&row(&[])).unwrap_err(),
            EvaluationError::UndefinedField("missing".to_string())
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(Expression::parse("system('rm')").is_err());
        assert!(Expression::parse("a +").is_err());
        assert!(Expression::parse("'open").is_err());
        assert!(Expression::parse("a b").is_err());
        assert!(Expression::parse("a; b").is_err());
    }
}
