//! Literal extraction from regular expressions.
//!
//! A pattern can only drive an index scan through a fixed prefix (forward
//! index) or a fixed suffix (reverse index). The analyzer finds both without
//! evaluating the pattern; anything it does not understand is treated as a
//! wildcard, which only ever shortens the literals it reports.

use quarry_arithmetic::pattern;
use quarry_common::Result;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Literal(char),
    Wildcard,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegexAnalyzer {
    pattern: String,
    leading: Option<String>,
    trailing: Option<String>,
    literal: bool,
}

impl RegexAnalyzer {
    /// Analyzes `pattern`.
    ///
    /// # Errors
    ///
    /// A planning error with code `InvalidPattern` when the pattern does not
    /// compile.
    pub fn new(pattern: &str) -> Result<RegexAnalyzer> {
        pattern::compile(pattern)?;
        let tokens = tokenize(pattern);
        let (leading, trailing, literal) = match tokens {
            None => (None, None, false),
            Some(tokens) => {
                let leading: String = tokens
                    .iter()
                    .map_while(|t| match t {
                        Token::Literal(c) => Some(*c),
                        Token::Wildcard => None,
                    })
                    .collect();
                let mut trailing: Vec<char> = tokens
                    .iter()
                    .rev()
                    .map_while(|t| match t {
                        Token::Literal(c) => Some(*c),
                        Token::Wildcard => None,
                    })
                    .collect();
                trailing.reverse();
                let literal = tokens.iter().all(|t| matches!(t, Token::Literal(_)));
                (
                    non_empty(leading),
                    non_empty(trailing.into_iter().collect()),
                    literal,
                )
            }
        };
        Ok(RegexAnalyzer {
            pattern: pattern.to_string(),
            leading,
            trailing,
            literal,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Fixed text every match starts with.
    pub fn leading_literal(&self) -> Option<&str> {
        self.leading.as_deref()
    }

    /// Fixed text every match ends with.
    pub fn trailing_literal(&self) -> Option<&str> {
        self.trailing.as_deref()
    }

    /// The pattern matches exactly one string.
    pub fn is_literal(&self) -> bool {
        self.literal
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

/// Splits a pattern into literal characters and wildcards. Returns `None`
/// when the pattern has a top-level alternation or inline flags, since no
/// literal is then common to every match.
fn tokenize(pattern: &str) -> Option<Vec<Token>> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '^' if i == 0 => {}
            '$' if i == chars.len() - 1 => {}
            '|' => return None,
            '\\' => {
                i += 1;
                match chars.get(i) {
                    Some(e) if e.is_ascii_alphanumeric() => tokens.push(Token::Wildcard),
                    Some(e) => tokens.push(Token::Literal(*e)),
                    None => tokens.push(Token::Wildcard),
                }
            }
            '[' => {
                i = skip_class(&chars, i);
                tokens.push(Token::Wildcard);
            }
            '(' => {
                if chars.get(i + 1) == Some(&'?') && chars.get(i + 2) != Some(&':') {
                    return None;
                }
                i = skip_group(&chars, i)?;
                tokens.push(Token::Wildcard);
            }
            '*' | '?' => {
                make_optional(&mut tokens);
                i = skip_lazy(&chars, i);
            }
            '{' => {
                make_optional(&mut tokens);
                while i < chars.len() && chars[i] != '}' {
                    i += 1;
                }
                i = skip_lazy(&chars, i);
            }
            '+' => {
                // The preceding atom occurs at least once; what follows may
                // be another copy of it.
                tokens.push(Token::Wildcard);
                i = skip_lazy(&chars, i);
            }
            '.' | '^' | '$' => tokens.push(Token::Wildcard),
            _ => tokens.push(Token::Literal(c)),
        }
        i += 1;
    }
    Some(tokens)
}

fn make_optional(tokens: &mut Vec<Token>) {
    if let Some(last) = tokens.last_mut() {
        *last = Token::Wildcard;
    }
}

/// Skips a lazy-quantifier marker following the quantifier at `i`.
fn skip_lazy(chars: &[char], i: usize) -> usize {
    if chars.get(i + 1) == Some(&'?') { i + 1 } else { i }
}

/// Returns the index of the `]` closing the class opened at `start`.
fn skip_class(chars: &[char], start: usize) -> usize {
    let mut i = start + 1;
    if chars.get(i) == Some(&'^') {
        i += 1;
    }
    // A leading ']' is a member, not the end.
    if chars.get(i) == Some(&']') {
        i += 1;
    }
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '[' => i = skip_class(chars, i),
            ']' => return i,
            _ => {}
        }
        i += 1;
    }
    chars.len()
}

/// Returns the index of the `)` closing the group opened at `start`. A group
/// with an alternation is still a single wildcard; only an unbalanced group
/// yields `None`.
fn skip_group(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '[' => i = skip_class(chars, i),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}
