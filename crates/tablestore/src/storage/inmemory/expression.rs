//! Parser and evaluator for store-side condition expressions.
//!
//! Understands the dialect the expression builders emit: comparisons,
//! `BETWEEN`, `begins_with`, `contains`, `attribute_exists`,
//! `attribute_not_exists`, `NOT`, `AND`, `OR` and parentheses over `#name`
//! and `:value` placeholders. Precedence follows the real store: comparisons
//! bind tighter than `NOT`, which binds tighter than `AND`, then `OR`.

use std::cmp::Ordering;
use std::collections::HashMap;

use tablestore_core::expression::CompareOp;
use tablestore_core::storage::{StoreError, StoreResult};
use tablestore_core::{AttrValue, Item};

/// Maximum nesting depth accepted by the parser.
const MAX_EXPRESSION_DEPTH: usize = 32;

/// A parsed condition with every placeholder resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
    Compare(Operand, CompareOp, Operand),
    Between(Operand, Operand, Operand),
    BeginsWith(Operand, Operand),
    Contains(Operand, Operand),
    Exists(Vec<String>),
    NotExists(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Path(Vec<String>),
    Value(AttrValue),
}

impl Condition {
    /// Parses `expression`, resolving placeholders from `names` and `values`.
    pub fn parse(
        expression: &str,
        names: &HashMap<String, String>,
        values: &HashMap<String, AttrValue>,
    ) -> StoreResult<Condition> {
        let tokens = tokenize(expression)?;
        let mut parser = Parser {
            tokens,
            position: 0,
            names,
            values,
        };
        let condition = parser.or_expr(0)?;
        match parser.peek() {
            None => Ok(condition),
            Some(token) => Err(invalid(format!("unexpected token {token:?}"))),
        }
    }

    /// Evaluates the condition against an item. Missing items are empty.
    pub fn matches(&self, item: &Item) -> bool {
        match self {
            Condition::And(left, right) => left.matches(item) && right.matches(item),
            Condition::Or(left, right) => left.matches(item) || right.matches(item),
            Condition::Not(inner) => !inner.matches(item),
            Condition::Compare(left, op, right) => {
                let ordering = match (left.resolve(item), right.resolve(item)) {
                    (Some(l), Some(r)) => l.compare(r),
                    _ => None,
                };
                match op {
                    CompareOp::Eq => ordering == Some(Ordering::Equal),
                    CompareOp::Ne => ordering != Some(Ordering::Equal),
                    CompareOp::Lt => ordering == Some(Ordering::Less),
                    CompareOp::Lte => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
                    CompareOp::Gt => ordering == Some(Ordering::Greater),
                    CompareOp::Gte => {
                        matches!(ordering, Some(Ordering::Greater | Ordering::Equal))
                    }
                }
            }
            Condition::Between(value, low, high) => {
                match (value.resolve(item), low.resolve(item), high.resolve(item)) {
                    (Some(v), Some(lo), Some(hi)) => {
                        matches!(v.compare(lo), Some(Ordering::Greater | Ordering::Equal))
                            && matches!(v.compare(hi), Some(Ordering::Less | Ordering::Equal))
                    }
                    _ => false,
                }
            }
            Condition::BeginsWith(value, prefix) => {
                match (value.resolve(item), prefix.resolve(item)) {
                    (Some(AttrValue::S(s)), Some(AttrValue::S(p))) => s.starts_with(p.as_str()),
                    (Some(AttrValue::B(b)), Some(AttrValue::B(p))) => b.starts_with(p),
                    _ => false,
                }
            }
            Condition::Contains(haystack, needle) => {
                match (haystack.resolve(item), needle.resolve(item)) {
                    (Some(AttrValue::S(s)), Some(AttrValue::S(n))) => s.contains(n.as_str()),
                    (Some(AttrValue::L(list)), Some(n)) => {
                        list.iter().any(|v| v.compare(n) == Some(Ordering::Equal))
                    }
                    _ => false,
                }
            }
            Condition::Exists(path) => resolve_path(item, path).is_some(),
            Condition::NotExists(path) => resolve_path(item, path).is_none(),
        }
    }
}

impl Operand {
    fn resolve<'a>(&'a self, item: &'a Item) -> Option<&'a AttrValue> {
        match self {
            Operand::Path(path) => resolve_path(item, path),
            Operand::Value(value) => Some(value),
        }
    }
}

/// Follows a document path through nested maps.
pub fn resolve_path<'a>(item: &'a Item, path: &[String]) -> Option<&'a AttrValue> {
    let (first, rest) = path.split_first()?;
    let mut current = item.get(first)?;
    for segment in rest {
        match current {
            AttrValue::M(map) => current = map.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Comma,
    Dot,
    Op(CompareOp),
    Name(String),
    Value(String),
    Word(String),
}

fn tokenize(expression: &str) -> StoreResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();

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
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Op(CompareOp::Eq));
            }
            '<' => {
                chars.next();
                let op = match chars.peek() {
                    Some('=') => CompareOp::Lte,
                    Some('>') => CompareOp::Ne,
                    _ => CompareOp::Lt,
                };
                if op != CompareOp::Lt {
                    chars.next();
                }
                tokens.push(Token::Op(op));
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Op(CompareOp::Gte));
                } else {
                    tokens.push(Token::Op(CompareOp::Gt));
                }
            }
            '#' | ':' => {
                chars.next();
                let word = take_word(&mut chars);
                if word.is_empty() {
                    return Err(invalid(format!("empty placeholder after {c}")));
                }
                tokens.push(if c == '#' {
                    Token::Name(format!("#{word}"))
                } else {
                    Token::Value(format!(":{word}"))
                });
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                tokens.push(Token::Word(take_word(&mut chars)));
            }
            other => return Err(invalid(format!("unexpected character {other:?}"))),
        }
    }

    Ok(tokens)
}

fn take_word(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut word = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == '_' {
            word.push(c);
            chars.next();
        } else {
            break;
        }
    }
    word
}

// ============================================================================
// Parser
// ============================================================================

struct Parser<'a> {
    tokens: Vec<Token>,
    position: usize,
    names: &'a HashMap<String, String>,
    values: &'a HashMap<String, AttrValue>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> StoreResult<()> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            other => Err(invalid(format!("expected {expected:?}, found {other:?}"))),
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(word)) if word.eq_ignore_ascii_case(keyword))
    }

    fn or_expr(&mut self, depth: usize) -> StoreResult<Condition> {
        if depth > MAX_EXPRESSION_DEPTH {
            return Err(invalid("expression nested too deeply".to_string()));
        }
        let mut left = self.and_expr(depth)?;
        while self.is_keyword("OR") {
            self.next();
            let right = self.and_expr(depth)?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self, depth: usize) -> StoreResult<Condition> {
        let mut left = self.not_expr(depth)?;
        while self.is_keyword("AND") {
            self.next();
            let right = self.not_expr(depth)?;
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self, depth: usize) -> StoreResult<Condition> {
        if self.is_keyword("NOT") {
            self.next();
            let inner = self.not_expr(depth + 1)?;
            return Ok(Condition::Not(Box::new(inner)));
        }
        self.primary(depth)
    }

    fn primary(&mut self, depth: usize) -> StoreResult<Condition> {
        if self.peek() == Some(&Token::LParen) {
            self.next();
            let inner = self.or_expr(depth + 1)?;
            self.expect(Token::RParen)?;
            return Ok(inner);
        }

        if let Some(Token::Word(word)) = self.peek().cloned() {
            if self.tokens.get(self.position + 1) == Some(&Token::LParen) {
                return self.function(&word);
            }
        }

        let left = self.operand()?;
        match self.next() {
            Some(Token::Op(op)) => {
                let right = self.operand()?;
                Ok(Condition::Compare(left, op, right))
            }
            Some(Token::Word(word)) if word.eq_ignore_ascii_case("BETWEEN") => {
                let low = self.operand()?;
                if !self.is_keyword("AND") {
                    return Err(invalid("BETWEEN without AND".to_string()));
                }
                self.next();
                let high = self.operand()?;
                Ok(Condition::Between(left, low, high))
            }
            other => Err(invalid(format!("expected comparator, found {other:?}"))),
        }
    }

    fn function(&mut self, name: &str) -> StoreResult<Condition> {
        self.next();
        self.expect(Token::LParen)?;
        let condition = match name {
            "attribute_exists" => Condition::Exists(self.path()?),
            "attribute_not_exists" => Condition::NotExists(self.path()?),
            "begins_with" | "contains" => {
                let subject = Operand::Path(self.path()?);
                self.expect(Token::Comma)?;
                let argument = self.operand()?;
                if name == "contains" {
                    Condition::Contains(subject, argument)
                } else {
                    Condition::BeginsWith(subject, argument)
                }
            }
            other => return Err(invalid(format!("unsupported function {other}"))),
        };
        self.expect(Token::RParen)?;
        Ok(condition)
    }

    fn operand(&mut self) -> StoreResult<Operand> {
        if let Some(Token::Value(placeholder)) = self.peek().cloned() {
            self.next();
            let value = self
                .values
                .get(&placeholder)
                .cloned()
                .ok_or_else(|| invalid(format!("undefined value placeholder {placeholder}")))?;
            return Ok(Operand::Value(value));
        }
        Ok(Operand::Path(self.path()?))
    }

    fn path(&mut self) -> StoreResult<Vec<String>> {
        let mut path = vec![self.segment()?];
        while self.peek() == Some(&Token::Dot) {
            self.next();
            path.push(self.segment()?);
        }
        Ok(path)
    }

    fn segment(&mut self) -> StoreResult<String> {
        match self.next() {
            Some(Token::Name(placeholder)) => self
                .names
                .get(&placeholder)
                .cloned()
                .ok_or_else(|| invalid(format!("undefined name placeholder {placeholder}"))),
            Some(Token::Word(word)) => Ok(word),
            other => Err(invalid(format!("expected attribute, found {other:?}"))),
        }
    }
}

fn invalid(message: String) -> StoreError {
    StoreError::Validation(message)
}
