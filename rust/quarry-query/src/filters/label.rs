//! Security label enforcement.
//!
//! A label is a boolean expression over authorization tokens, for example
//! `admin|(audit&eu)`. `&` binds tighter than `|`; parentheses group. The
//! empty label is public. A key is visible when its label evaluates to true
//! against the caller's authorizations.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

use ahash::{HashMap, HashSet};
use quarry_common::{Result, error::Error};
use quarry_source::{Key, KeyFilter};

use super::{IndexFilterFactory, split_list};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LabelExpression {
    Public,
    Token(String),
    All(Vec<LabelExpression>),
    Any(Vec<LabelExpression>),
}

impl LabelExpression {
    /// # Errors
    ///
    /// `InvalidFormat` for unbalanced parentheses, dangling operators or
    /// characters that cannot appear in a token.
    pub fn parse(label: &str) -> Result<LabelExpression> {
        if label.trim().is_empty() {
            return Ok(LabelExpression::Public);
        }
        let mut parser = Parser {
            chars: label.chars().filter(|c| !c.is_whitespace()).collect(),
            pos: 0,
            label,
        };
        let expr = parser.parse_any()?;
        if parser.pos != parser.chars.len() {
            return Err(parser.error("unexpected character"));
        }
        Ok(expr)
    }

    pub fn evaluate(&self, authorizations: &HashSet<String>) -> bool {
        match self {
            LabelExpression::Public => true,
            LabelExpression::Token(token) => authorizations.contains(token),
            LabelExpression::All(terms) => terms.iter().all(|t| t.evaluate(authorizations)),
            LabelExpression::Any(terms) => terms.iter().any(|t| t.evaluate(authorizations)),
        }
    }
}

impl fmt::Display for LabelExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = |f: &mut fmt::Formatter<'_>, terms: &[LabelExpression], op| {
            f.write_str("(")?;
            for (i, term) in terms.iter().enumerate() {
                if i > 0 {
                    f.write_str(op)?;
                }
                write!(f, "{term}")?;
            }
            f.write_str(")")
        };
        match self {
            LabelExpression::Public => Ok(()),
            LabelExpression::Token(token) => f.write_str(token),
            LabelExpression::All(terms) => joined(f, terms, "&"),
            LabelExpression::Any(terms) => joined(f, terms, "|"),
        }
    }
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    label: &'a str,
}

impl Parser<'_> {
    fn parse_any(&mut self) -> Result<LabelExpression> {
        let mut terms = vec![self.parse_all()?];
        while self.eat('|') {
            terms.push(self.parse_all()?);
        }
        Ok(collapse(terms, LabelExpression::Any))
    }

    fn parse_all(&mut self) -> Result<LabelExpression> {
        let mut terms = vec![self.parse_atom()?];
        while self.eat('&') {
            terms.push(self.parse_atom()?);
        }
        Ok(collapse(terms, LabelExpression::All))
    }

    fn parse_atom(&mut self) -> Result<LabelExpression> {
        if self.eat('(') {
            let expr = self.parse_any()?;
            if !self.eat(')') {
                return Err(self.error("missing ')'"));
            }
            return Ok(expr);
        }
        let start = self.pos;
        while self.chars.get(self.pos).is_some_and(|c| is_token_char(*c)) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("expected a token"));
        }
        Ok(LabelExpression::Token(
            self.chars[start..self.pos].iter().collect(),
        ))
    }

    fn eat(&mut self, c: char) -> bool {
        if self.chars.get(self.pos) == Some(&c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: &str) -> Error {
        Error::invalid_format(
            "security label",
            format!("{message} at {} in {:?}", self.pos, self.label),
        )
    }
}

fn collapse(
    mut terms: Vec<LabelExpression>,
    combine: fn(Vec<LabelExpression>) -> LabelExpression,
) -> LabelExpression {
    if terms.len() == 1 {
        terms.swap_remove(0)
    } else {
        combine(terms)
    }
}

fn is_token_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | ':' | '.' | '/')
}

/// Hides keys whose label the authorizations do not satisfy.
///
/// Decisions are cached per distinct label. A label that does not parse
/// hides its key.
pub struct LabelFilter {
    authorizations: HashSet<String>,
    decisions: RwLock<HashMap<String, bool>>,
}

impl LabelFilter {
    pub fn new(authorizations: impl IntoIterator<Item = impl Into<String>>) -> LabelFilter {
        LabelFilter {
            authorizations: authorizations.into_iter().map(Into::into).collect(),
            decisions: RwLock::new(HashMap::default()),
        }
    }

    fn decide(&self, label: &str) -> bool {
        match LabelExpression::parse(label) {
            Ok(expr) => expr.evaluate(&self.authorizations),
            Err(e) => {
                log::debug!("hiding key with unreadable label: {e}");
                false
            }
        }
    }
}

impl KeyFilter for LabelFilter {
    fn name(&self) -> &str {
        "label"
    }

    fn accept(&self, key: &Key) -> bool {
        if key.label.is_empty() {
            return true;
        }
        let cached = self
            .decisions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key.label)
            .copied();
        if let Some(visible) = cached {
            return visible;
        }
        let visible = self.decide(&key.label);
        self.decisions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.label.clone(), visible);
        visible
    }
}

pub(crate) struct LabelFilterFactory;

impl IndexFilterFactory for LabelFilterFactory {
    fn name(&self) -> &str {
        "label"
    }

    /// Options: `authorizations`, a comma separated token list. Without it
    /// only public keys are visible.
    fn create(&self, options: &BTreeMap<String, String>) -> Result<Arc<dyn KeyFilter>> {
        let authorizations = options
            .get("authorizations")
            .map(|auths| split_list(auths).collect::<Vec<_>>())
            .unwrap_or_default();
        Ok(Arc::new(LabelFilter::new(authorizations)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auths(tokens: &[&str]) -> HashSet<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_parse_precedence() {
        let expr = LabelExpression::parse("a|b&c").unwrap();
        assert_eq!(expr.to_string(), "(a|(b&c))");
        let expr = LabelExpression::parse("(a|b) & c").unwrap();
        assert_eq!(expr.to_string(), "((a|b)&c)");
        assert_eq!(LabelExpression::parse("").unwrap(), LabelExpression::Public);
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["a&", "(a|b", "a||b", "a b!", ")"] {
            assert!(LabelExpression::parse(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_evaluate() {
        let expr = LabelExpression::parse("admin|(audit&eu)").unwrap();
        assert!(expr.evaluate(&auths(&["admin"])));
        assert!(expr.evaluate(&auths(&["audit", "eu"])));
        assert!(!expr.evaluate(&auths(&["audit"])));
        assert!(!expr.evaluate(&auths(&[])));
    }

    #[test]
    fn test_label_filter() {
        let options = BTreeMap::from([("authorizations".to_string(), "A,B".to_string())]);
        let filter = LabelFilterFactory.create(&options).unwrap();
        let key = |label: &str| Key::new("r", "f", "q").with_label(label);
        assert!(filter.accept(&key("")));
        assert!(filter.accept(&key("A&B")));
        assert!(filter.accept(&key("A&B")));
        assert!(!filter.accept(&key("A&C")));
        assert!(filter.accept(&key("C|B")));
        assert!(!filter.accept(&key("A&&")));

        let public_only = LabelFilterFactory.create(&BTreeMap::new()).unwrap();
        assert!(public_only.accept(&key("")));
        assert!(!public_only.accept(&key("A")));
    }
}
