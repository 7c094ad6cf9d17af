//! Tokenizer and normalizer for query strings.
//!
//! Turns a raw query into a whitespace-free token stream: parentheses and
//! operators become standalone tokens, binding markers are recognized,
//! backtick keyword segments are decoded, redundant single-clause
//! parentheses are removed and the whole expression ends up inside exactly
//! one top-level group.

use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::{Config, Error, Result};

/// Characters escaped when a keyword segment is rendered back to text.
const KEYWORD_ESCAPES: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'%')
    .add(b'&')
    .add(b'=')
    .add(b'`')
    .add(b'(')
    .add(b')');

/// A lexical token of the query language.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// `(`
    Open,
    /// `)`
    Close,
    /// Any configured AND literal
    And,
    /// Any configured OR literal
    Or,
    /// Bare word: attribute path, predicate name, `not`, or literal argument
    Word(String),
    /// Positional binding marker `?`
    Positional,
    /// Named binding marker `:name`
    Named(String),
    /// Backtick keyword segment `` `k=v&k2` ``, already percent-decoded
    Keywords(Vec<KeywordPair>),
}

/// One `key[=value]` entry of a keyword segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordPair {
    pub key: String,
    pub value: Option<String>,
}

/// A binding marker, wherever it appears.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Positional,
    Named(String),
}

/// The AND/OR literal sets in effect for one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operators {
    and: Vec<String>,
    or: Vec<String>,
}

impl Operators {
    pub fn new(and: Vec<String>, or: Vec<String>) -> Self {
        Self { and, or }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.and_ops.clone(), config.or_ops.clone())
    }

    /// Classify a complete word as an operator.
    fn classify(&self, word: &str) -> Option<Token> {
        if self.and.iter().any(|op| op == word) {
            Some(Token::And)
        } else if self.or.iter().any(|op| op == word) {
            Some(Token::Or)
        } else {
            None
        }
    }

    /// Longest symbolic operator (e.g. `&&`) starting at the head of `input`.
    fn symbolic_at(&self, input: &str) -> Option<(Token, usize)> {
        let and = self.and.iter().map(|op| (op, Token::And));
        let or = self.or.iter().map(|op| (op, Token::Or));
        and.chain(or)
            .filter(|(op, _)| is_symbolic(op) && input.starts_with(op.as_str()))
            .max_by_key(|(op, _)| op.len())
            .map(|(op, token)| (token, op.len()))
    }
}

/// Word operators (`and`) only match whole words; symbolic ones (`&&`) split words.
fn is_symbolic(op: &str) -> bool {
    !op.chars().all(|c| c.is_alphanumeric() || c == '_')
}

/// A normalized token stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Lexed {
    pub tokens: Vec<Token>,
    /// True when the outer group was synthesized rather than written.
    pub wrapped: bool,
}

/// Tokenize and normalize a raw query string.
pub fn tokenize(input: &str, ops: &Operators) -> Result<Lexed> {
    if input.trim().is_empty() {
        return Err(Error::EmptyQuery);
    }
    check_parens(input)?;
    if backtick_runs(input) % 2 != 0 {
        return Err(Error::OddBackticks(input.to_string()));
    }

    let mut tokens = scan(input, ops)?;
    if tokens.is_empty() {
        return Err(Error::EmptyQuery);
    }

    strip_redundant_parens(&mut tokens);

    let wrapped = !is_wrapped(&tokens);
    if wrapped {
        tokens.insert(0, Token::Open);
        tokens.push(Token::Close);
    }

    Ok(Lexed { tokens, wrapped })
}

/// Render tokens back into canonical single-spaced text.
pub fn render(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(Token::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Recognize `?` and `:name` (any run of leading colons collapses to one).
///
/// A word that starts with `:` but has an invalid name is an error rather
/// than a literal.
pub fn marker(word: &str) -> Result<Option<Marker>> {
    if word == "?" {
        return Ok(Some(Marker::Positional));
    }
    let name = word.trim_start_matches(':');
    if name.len() == word.len() || name.is_empty() {
        return Ok(None);
    }
    if name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        Ok(Some(Marker::Named(name.to_string())))
    } else {
        Err(Error::InvalidMarker(word.to_string()))
    }
}

/// Backtick delimiters, counting each run of backticks once.
fn backtick_runs(input: &str) -> usize {
    input
        .split(|c| c != '`')
        .filter(|run| !run.is_empty())
        .count()
}

fn check_parens(input: &str) -> Result<()> {
    let mut depth = 0usize;
    for c in input.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| Error::UnbalancedParens(input.to_string()))?;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(Error::UnbalancedParens(input.to_string()));
    }
    Ok(())
}

fn scan(input: &str, ops: &Operators) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut rest = input;

    while let Some(c) = rest.chars().next() {
        if c.is_whitespace() {
            flush_word(&mut word, &mut tokens, ops)?;
            rest = &rest[c.len_utf8()..];
        } else if c == '(' || c == ')' {
            flush_word(&mut word, &mut tokens, ops)?;
            tokens.push(if c == '(' { Token::Open } else { Token::Close });
            rest = &rest[1..];
        } else if c == '`' {
            flush_word(&mut word, &mut tokens, ops)?;
            // Runs of backticks act as a single delimiter
            let body = rest.trim_start_matches('`');
            let end = body
                .find('`')
                .ok_or_else(|| Error::OddBackticks(input.to_string()))?;
            let pairs = decode_keywords(&body[..end]);
            if !pairs.is_empty() {
                tokens.push(Token::Keywords(pairs));
            }
            rest = body[end..].trim_start_matches('`');
        } else if let Some((token, len)) = ops.symbolic_at(rest) {
            flush_word(&mut word, &mut tokens, ops)?;
            tokens.push(token);
            rest = &rest[len..];
        } else {
            word.push(c);
            rest = &rest[c.len_utf8()..];
        }
    }
    flush_word(&mut word, &mut tokens, ops)?;

    Ok(tokens)
}

fn flush_word(word: &mut String, tokens: &mut Vec<Token>, ops: &Operators) -> Result<()> {
    if word.is_empty() {
        return Ok(());
    }
    let token = match marker(word)? {
        Some(Marker::Positional) => Token::Positional,
        Some(Marker::Named(name)) => Token::Named(name),
        None => ops
            .classify(word)
            .unwrap_or_else(|| Token::Word(word.clone())),
    };
    tokens.push(token);
    word.clear();
    Ok(())
}

fn decode_keywords(segment: &str) -> Vec<KeywordPair> {
    segment
        .split('&')
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once('=') {
            Some((key, value)) => KeywordPair {
                key: decode(key),
                value: Some(decode(value)),
            },
            None => KeywordPair {
                key: decode(part),
                value: None,
            },
        })
        .collect()
}

fn decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

/// Remove parentheses wrapping exactly one clause, until a pass changes nothing.
///
/// Returns the number of passes that removed something.
pub fn strip_redundant_parens(tokens: &mut Vec<Token>) -> usize {
    let mut passes = 0;
    loop {
        let before = tokens.len();
        strip_pass(tokens);
        if tokens.len() == before {
            return passes;
        }
        passes += 1;
    }
}

/// One pass: drop every innermost `( ... )` whose content has no operator
/// and which is not written next to another item without an operator.
fn strip_pass(tokens: &mut Vec<Token>) {
    let mut remove = vec![false; tokens.len()];
    let mut open: Option<usize> = None;

    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::Open => open = Some(i),
            Token::Close => {
                if let Some(start) = open.take() {
                    let before = start.checked_sub(1).map(|j| &tokens[j]);
                    let after = tokens.get(i + 1);
                    let standalone = matches!(before, None | Some(Token::Open | Token::And | Token::Or))
                        && matches!(after, None | Some(Token::Close | Token::And | Token::Or));
                    if i > start + 1 && standalone {
                        remove[start] = true;
                        remove[i] = true;
                    }
                }
            }
            Token::And | Token::Or => open = None,
            _ => {}
        }
    }

    let mut flags = remove.into_iter();
    tokens.retain(|_| !flags.next().unwrap_or(false));
}

/// True when the first `(` closes at the very last token.
fn is_wrapped(tokens: &[Token]) -> bool {
    if tokens.first() != Some(&Token::Open) {
        return false;
    }
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::Open => depth += 1,
            Token::Close => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i == tokens.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Open => write!(f, "("),
            Token::Close => write!(f, ")"),
            Token::And => write!(f, "and"),
            Token::Or => write!(f, "or"),
            Token::Word(w) => write!(f, "{}", w),
            Token::Positional => write!(f, "?"),
            Token::Named(name) => write!(f, ":{}", name),
            Token::Keywords(pairs) => {
                let parts: Vec<String> = pairs.iter().map(KeywordPair::to_string).collect();
                write!(f, "`{}`", parts.join("&"))
            }
        }
    }
}

impl fmt::Display for KeywordPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", utf8_percent_encode(&self.key, KEYWORD_ESCAPES))?;
        if let Some(value) = &self.value {
            write!(f, "={}", utf8_percent_encode(value, KEYWORD_ESCAPES))?;
        }
        Ok(())
    }
}
