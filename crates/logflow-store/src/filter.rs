//! Boolean filters over log entry fields.
//!
//! A [`Filter`] is evaluated two ways: directly against an entry (used by
//! pipeline switch nodes) and against the field index of a stream (used by
//! [`LogStore::fetch_logs`](crate::LogStore::fetch_logs)). The serialized
//! form is the AST emitted by the filter language compiler:
//!
//! ```json
//! {"$and": [{"$eq": {"field": "level", "value": "error"}},
//!           {"$not": {"$in": {"field": "host", "values": ["a", "b"]}}}]}
//! ```

use crate::types::LogEntry;
use serde::{Deserialize, Serialize};

/// A boolean expression over entry fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    /// All sub-filters must match. An empty list matches everything.
    #[serde(rename = "$and")]
    And(Vec<Filter>),
    /// At least one sub-filter must match. An empty list matches nothing.
    #[serde(rename = "$or")]
    Or(Vec<Filter>),
    /// Negation of the inner filter.
    #[serde(rename = "$not")]
    Not(Box<Filter>),
    /// The field is present and equal to `value`.
    #[serde(rename = "$eq")]
    FieldExact {
        /// Field name
        field: String,
        /// Expected value
        value: String,
    },
    /// The field is present and equal to one of `values`.
    #[serde(rename = "$in")]
    FieldIn {
        /// Field name
        field: String,
        /// Accepted values
        values: Vec<String>,
    },
}

impl Filter {
    /// Builds a [`Filter::FieldExact`].
    #[must_use]
    pub fn field_exact(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::FieldExact {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Builds a [`Filter::FieldIn`].
    #[must_use]
    pub fn field_in<I, S>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::FieldIn {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Builds the negation of `filter`.
    #[must_use]
    pub fn negate(filter: Self) -> Self {
        Self::Not(Box::new(filter))
    }

    /// Parses the JSON AST produced by the filter language compiler.
    pub fn from_ast_json(ast: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(ast)
    }

    /// Evaluates the filter against a single entry.
    #[must_use]
    pub fn evaluate(&self, entry: &LogEntry) -> bool {
        match self {
            Self::And(filters) => filters.iter().all(|f| f.evaluate(entry)),
            Self::Or(filters) => filters.iter().any(|f| f.evaluate(entry)),
            Self::Not(inner) => !inner.evaluate(entry),
            Self::FieldExact { field, value } => entry.field(field) == Some(value.as_str()),
            Self::FieldIn { field, values } => entry
                .field(field)
                .is_some_and(|actual| values.iter().any(|v| v == actual)),
        }
    }
}
