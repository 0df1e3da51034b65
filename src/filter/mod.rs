//! Capability predicates over provider headers.
//!
//! A [`CapabilityPredicate`] decides whether a provider's declared
//! [`Attributes`] satisfy a dependency. The built-in implementation is
//! [`Filter`], an LDAP-style expression:
//!
//! ```
//! use depwatch::filter::{CapabilityPredicate, Filter};
//! use depwatch::provider::Attributes;
//!
//! let filter: Filter = "(&(Module-SymbolicName=org.example.*)(Module-Version>=2))"
//!     .parse()
//!     .unwrap();
//! let attrs: Attributes = [
//!     ("Module-SymbolicName", "org.example.api"),
//!     ("Module-Version", "3"),
//! ]
//! .into_iter()
//! .collect();
//! assert!(filter.matches(&attrs));
//! ```
//!
//! # Modules
//!
//! - [`parser`] - Expression parsing

pub mod parser;

pub use parser::FilterParseError;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::provider::Attributes;

/// Boolean match rule over a provider's declared headers.
pub trait CapabilityPredicate: Send + Sync {
    /// Whether the headers satisfy this predicate.
    fn matches(&self, attributes: &Attributes) -> bool;

    /// Human-readable form used in names and logs.
    fn describe(&self) -> String;
}

/// Parsed filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// `(&(a)(b)...)`
    And(Vec<Filter>),
    /// `(|(a)(b)...)`
    Or(Vec<Filter>),
    /// `(!(a))`
    Not(Box<Filter>),
    /// `(key=value)`
    Equal { key: String, value: String },
    /// `(key~=value)`
    Approx { key: String, value: String },
    /// `(key>=value)`
    GreaterEq { key: String, value: String },
    /// `(key<=value)`
    LessEq { key: String, value: String },
    /// `(key=*)`
    Present { key: String },
    /// `(key=pre*mid*post)`; `parts` holds the text between wildcards.
    Substring { key: String, parts: Vec<String> },
}

impl Filter {
    /// Parse a filter expression.
    pub fn parse(expression: &str) -> Result<Self, FilterParseError> {
        parser::parse(expression)
    }

    /// Evaluate against a header map. Missing headers never match.
    pub fn matches(&self, attributes: &Attributes) -> bool {
        match self {
            Filter::And(items) => items.iter().all(|f| f.matches(attributes)),
            Filter::Or(items) => items.iter().any(|f| f.matches(attributes)),
            Filter::Not(inner) => !inner.matches(attributes),
            Filter::Present { key } => attributes.contains_key(key),
            Filter::Equal { key, value } => attributes
                .get(key)
                .is_some_and(|actual| compare(actual, value) == Ordering::Equal),
            Filter::Approx { key, value } => attributes
                .get(key)
                .is_some_and(|actual| normalize_approx(actual) == normalize_approx(value)),
            Filter::GreaterEq { key, value } => attributes
                .get(key)
                .is_some_and(|actual| compare(actual, value) != Ordering::Less),
            Filter::LessEq { key, value } => attributes
                .get(key)
                .is_some_and(|actual| compare(actual, value) != Ordering::Greater),
            Filter::Substring { key, parts } => attributes
                .get(key)
                .is_some_and(|actual| matches_substring(actual, parts)),
        }
    }
}

impl CapabilityPredicate for Filter {
    fn matches(&self, attributes: &Attributes) -> bool {
        Filter::matches(self, attributes)
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

impl FromStr for Filter {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Filter::parse(s)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(items) => {
                write!(f, "(&")?;
                for item in items {
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Filter::Or(items) => {
                write!(f, "(|")?;
                for item in items {
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Filter::Not(inner) => write!(f, "(!{})", inner),
            Filter::Equal { key, value } => write!(f, "({}={})", key, escape(value)),
            Filter::Approx { key, value } => write!(f, "({}~={})", key, escape(value)),
            Filter::GreaterEq { key, value } => write!(f, "({}>={})", key, escape(value)),
            Filter::LessEq { key, value } => write!(f, "({}<={})", key, escape(value)),
            Filter::Present { key } => write!(f, "({}=*)", key),
            Filter::Substring { key, parts } => {
                let escaped: Vec<String> = parts.iter().map(|p| escape(p)).collect();
                write!(f, "({}={})", key, escaped.join("*"))
            }
        }
    }
}

/// Numeric when both sides parse as numbers, lexicographic otherwise.
fn compare(actual: &str, expected: &str) -> Ordering {
    let (a, e) = (actual.trim(), expected.trim());
    if let (Ok(a), Ok(e)) = (a.parse::<i64>(), e.parse::<i64>()) {
        return a.cmp(&e);
    }
    if let (Ok(a), Ok(e)) = (a.parse::<f64>(), e.parse::<f64>()) {
        return a.partial_cmp(&e).unwrap_or(Ordering::Less);
    }
    actual.cmp(expected)
}

fn normalize_approx(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// `parts[0]` must prefix, the last part must suffix, middle parts appear in order.
fn matches_substring(actual: &str, parts: &[String]) -> bool {
    let Some((first, rest)) = parts.split_first() else {
        return true;
    };
    let Some(remaining) = actual.strip_prefix(first.as_str()) else {
        return false;
    };
    let Some((last, middle)) = rest.split_last() else {
        return remaining.is_empty();
    };

    let mut cursor = remaining;
    for piece in middle {
        match cursor.find(piece.as_str()) {
            Some(pos) => cursor = &cursor[pos + piece.len()..],
            None => return false,
        }
    }
    cursor.len() >= last.len() && cursor.ends_with(last.as_str())
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '(' | ')' | '*' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
