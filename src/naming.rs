//! Naming conventions: field names to column names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SqlRowError;

/// Strategy for turning field names into column names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Convention {
    /// `HomeAddress` → `home_address`; segments joined with `_`.
    #[default]
    Snake,
    /// Field names used as-is; segments joined with nothing.
    Same,
    /// Lower-cased field names; segments joined with nothing.
    Lower,
}

impl Convention {
    /// Convert one field name.
    pub fn convert(&self, name: &str) -> String {
        match self {
            Convention::Snake => snake_case(name),
            Convention::Same => name.to_string(),
            Convention::Lower => name.to_lowercase(),
        }
    }

    /// Join converted path segments into a column name.
    pub fn join<S: AsRef<str>>(&self, parts: &[S]) -> String {
        let separator = match self {
            Convention::Snake => "_",
            Convention::Same | Convention::Lower => "",
        };
        parts
            .iter()
            .map(|p| p.as_ref())
            .collect::<Vec<_>>()
            .join(separator)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Convention::Snake => "snake",
            Convention::Same => "same",
            Convention::Lower => "lower",
        }
    }
}

impl fmt::Display for Convention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Convention {
    type Err = SqlRowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "snake" | "snake_case" => Ok(Convention::Snake),
            "same" | "identity" => Ok(Convention::Same),
            "lower" | "lowercase" => Ok(Convention::Lower),
            other => Err(SqlRowError::Config(format!(
                "unknown naming convention '{}'. Expected: snake, same or lower",
                other
            ))),
        }
    }
}

/// Insert `_` at word boundaries and lower-case everything.
/// An acronym run stays one word: `HTTPServer` → `http_server`.
fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                None | Some('_') => false,
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                Some(_) => false,
            };
            if boundary {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}
