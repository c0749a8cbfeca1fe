//! SQL `LIKE` patterns.
//!
//! `%` matches any run of characters (including none) and `_` matches exactly
//! one character. Everything else matches itself, case-sensitively, and the
//! pattern must cover the whole value.

use regex::Regex;

use crate::error::{SearchError, SearchResult};

#[derive(Debug, Clone)]
pub struct LikePattern {
    regex: Regex,
}

impl LikePattern {
    pub fn new(pattern: &str) -> SearchResult<Self> {
        let mut expr = String::with_capacity(pattern.len() + 8);
        expr.push_str("(?s)^");
        let mut literal = String::new();
        for c in pattern.chars() {
            match c {
                '%' | '_' => {
                    expr.push_str(&regex::escape(&literal));
                    literal.clear();
                    expr.push_str(if c == '%' { ".*" } else { "." });
                }
                _ => literal.push(c),
            }
        }
        expr.push_str(&regex::escape(&literal));
        expr.push('$');

        let regex = Regex::new(&expr)
            .map_err(|e| SearchError::Parse(format!("invalid pattern {pattern:?}: {e}")))?;
        Ok(Self { regex })
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}
