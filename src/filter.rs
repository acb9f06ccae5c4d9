//! Structured search filters rendered to OData.
//!
//! User-supplied values are only ever embedded through [`Value`] rendering,
//! which quotes strings and doubles embedded single quotes, so a facet value
//! like `O'Brien` cannot break out of its literal.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::auth::Identity;

/// Smallest "medium" file (1 MiB).
pub const MEDIUM_MIN_BYTES: i64 = 1_048_576;
/// Largest "medium" file (10 MiB).
pub const MEDIUM_MAX_BYTES: i64 = 10_485_760;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Time(DateTime<Utc>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(&'static str, Value),
    Cmp(&'static str, Op, Value),
    And(Vec<Filter>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::Int(n) => write!(f, "{}", n),
            Value::Time(t) => write!(f, "{}", t.format("%Y-%m-%dT%H:%M:%SZ")),
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Op::Lt => "lt",
            Op::Le => "le",
            Op::Gt => "gt",
            Op::Ge => "ge",
        })
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Eq(field, v) => write!(f, "{} eq {}", field, v),
            Filter::Cmp(field, op, v) => write!(f, "{} {} {}", field, op, v),
            Filter::And(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" and ")?;
                    }
                    write!(f, "{}", part)?;
                }
                Ok(())
            }
        }
    }
}

/// Filter fields of a search form submission. Empty strings mean "any".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub date_range: String,
    #[serde(default)]
    pub uploaded_by: String,
    #[serde(default)]
    pub category: String,
}

fn midnight(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|n| n.and_utc())
        .unwrap_or(t)
}

impl SearchFilters {
    /// Builds the filter for a search by `identity` at time `now`.
    ///
    /// The authorization clause always comes first. Unknown size and date
    /// range values are ignored.
    pub fn to_filter(&self, identity: &Identity, now: DateTime<Utc>) -> Filter {
        let mut parts = vec![Filter::Eq(
            "authorized_users",
            Value::Str(identity.as_str().to_string()),
        )];

        let eq_fields = [
            ("file_type", &self.file_type),
            ("uploaded_by", &self.uploaded_by),
            ("Category", &self.category),
        ];
        for (field, value) in eq_fields {
            let value = value.trim();
            if !value.is_empty() {
                parts.push(Filter::Eq(field, Value::Str(value.to_string())));
            }
        }

        match self.size.trim() {
            "small" => parts.push(Filter::Cmp("file_size", Op::Lt, Value::Int(MEDIUM_MIN_BYTES))),
            "medium" => {
                parts.push(Filter::Cmp("file_size", Op::Ge, Value::Int(MEDIUM_MIN_BYTES)));
                parts.push(Filter::Cmp("file_size", Op::Le, Value::Int(MEDIUM_MAX_BYTES)));
            }
            "large" => parts.push(Filter::Cmp("file_size", Op::Gt, Value::Int(MEDIUM_MAX_BYTES))),
            _ => {}
        }

        let cutoff = match self.date_range.trim() {
            "today" => Some(midnight(now)),
            "yesterday" => Some(midnight(now - Duration::days(1))),
            "last_week" => Some(now - Duration::days(7)),
            "last_month" => Some(now - Duration::days(30)),
            "last_year" => Some(now - Duration::days(365)),
            _ => None,
        };
        if let Some(cutoff) = cutoff {
            parts.push(Filter::Cmp("last_modified", Op::Ge, Value::Time(cutoff)));
        }

        Filter::And(parts)
    }
}
