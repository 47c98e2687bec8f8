//! Query parsing and execution
//!
//! Filter queries over one entity collection, in an OData-style syntax:
//!
//! ```text
//! $filter=outcome eq 'FAILED' and extensions.temperature gt 40&$orderby=started_at desc&$top=10
//! ```
//!
//! Text that does not start with `$` is taken as a bare filter expression.
//!
//! ## Filter grammar
//!
//! - Comparison: `field eq|ne|lt|le|gt|ge literal`
//! - Containment: `contains(field, literal)` (substring for strings,
//!   membership for relationship lists)
//! - Logic: `and`, `or`, `not`, parentheses; `and` binds tighter than `or`
//! - Literals: `'quoted strings'` (`''` escapes a quote), integers, floats,
//!   `true`/`false`, RFC 3339 instants and GUIDs
//!
//! Extension fields are addressed as `extensions.path.inside` (or
//! `extensions/path/inside`). Any other unknown field name is looked up
//! among the entity's descriptive properties.

mod executor;
mod parser;

pub use executor::QueryExecutor;

use std::fmt;

use chrono::{DateTime, Utc};

use crate::{Error, Result};

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Less than
    Lt,
    /// Less than or equal
    Le,
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,
}

impl CompareOp {
    /// Get operator keyword as string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Gt => "gt",
            Self::Ge => "ge",
        }
    }

    /// Whether the operator needs an ordering rather than just equality.
    #[must_use]
    pub const fn is_ordering(&self) -> bool {
        !matches!(self, Self::Eq | Self::Ne)
    }

    /// Apply the operator to an ordering result.
    #[must_use]
    pub const fn test(&self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};
        match self {
            Self::Eq => matches!(ordering, Equal),
            Self::Ne => !matches!(ordering, Equal),
            Self::Lt => matches!(ordering, Less),
            Self::Le => !matches!(ordering, Greater),
            Self::Gt => matches!(ordering, Greater),
            Self::Ge => !matches!(ordering, Less),
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Literal operand of a predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Quoted string
    String(String),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// `true` / `false`
    Bool(bool),
    /// RFC 3339 instant
    DateTime(DateTime<Utc>),
    /// Unquoted GUID
    Guid(String),
}

impl Literal {
    /// Name of the literal's type, as used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::DateTime(_) => "datetime",
            Self::Guid(_) => "guid",
        }
    }

    /// String view for string and GUID literals.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Guid(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) | Self::Guid(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::DateTime(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

/// Boolean predicate tree
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `field op literal`
    Compare {
        /// Field path
        field: String,
        /// Operator
        op: CompareOp,
        /// Right-hand operand
        value: Literal,
    },
    /// `contains(field, literal)`
    Contains {
        /// Field path
        field: String,
        /// Substring or member id
        value: Literal,
    },
    /// Both sides hold
    And(Box<Predicate>, Box<Predicate>),
    /// Either side holds
    Or(Box<Predicate>, Box<Predicate>),
    /// Negation
    Not(Box<Predicate>),
}

/// Sort order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    /// Ascending order (smallest first)
    #[default]
    Asc,
    /// Descending order (largest first)
    Desc,
}

/// Ordering clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Field path
    pub field: String,
    /// Direction
    pub direction: OrderDirection,
}

/// Parsed query with extracted components
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPlan {
    /// Filter predicate (optional; absent means every entity matches)
    pub filter: Option<Predicate>,
    /// Ordering clause (optional; absent means creation order)
    pub order_by: Option<OrderBy>,
    /// Result-size limit (optional)
    pub limit: Option<usize>,
}

/// Query options accepted by the service but not by this core.
const UNSUPPORTED_OPTIONS: [&str; 4] = ["$expand", "$select", "$count", "$skip"];

/// Query parser
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryEngine;

impl QueryEngine {
    /// Create a new query engine
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Parse query text into a query plan
    ///
    /// # Errors
    /// Returns `ParseError` if:
    /// - The filter expression is malformed
    /// - An option is unknown, repeated or unsupported (`$expand`, `$select`,
    ///   `$count`, `$skip`)
    /// - `$orderby` or `$top` is malformed
    ///
    /// # Example
    /// ```
    /// use datastore_core::query::{OrderDirection, QueryEngine};
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let engine = QueryEngine::new();
    /// let plan = engine.parse("$filter=outcome eq 'PASSED'&$orderby=started_at desc&$top=5")?;
    /// assert_eq!(plan.limit, Some(5));
    /// assert_eq!(plan.order_by.unwrap().direction, OrderDirection::Desc);
    /// # Ok(())
    /// # }
    /// ```
    pub fn parse(&self, text: &str) -> Result<QueryPlan> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(QueryPlan::default());
        }
        if !text.starts_with('$') {
            return Ok(QueryPlan {
                filter: Some(parser::parse_filter(text)?),
                ..QueryPlan::default()
            });
        }

        let mut plan = QueryPlan::default();
        let mut seen: Vec<String> = Vec::new();
        for option in parser::split_options(text) {
            let (name, value) = option.split_once('=').ok_or_else(|| {
                Error::ParseError(format!("Query option `{option}` has no value"))
            })?;
            let name = name.trim().to_ascii_lowercase();
            if seen.contains(&name) {
                return Err(Error::ParseError(format!("Query option {name} given twice")));
            }

            match name.as_str() {
                "$filter" => plan.filter = Some(parser::parse_filter(value)?),
                "$orderby" => plan.order_by = Some(Self::parse_order_by(value)?),
                "$top" => plan.limit = Some(Self::parse_top(value)?),
                other if UNSUPPORTED_OPTIONS.contains(&other) => {
                    return Err(Error::ParseError(format!(
                        "Query option {other} is not supported"
                    )))
                }
                other => {
                    return Err(Error::ParseError(format!("Unknown query option {other}")))
                }
            }
            seen.push(name);
        }
        Ok(plan)
    }

    fn parse_order_by(value: &str) -> Result<OrderBy> {
        if value.contains(',') {
            return Err(Error::ParseError(
                "$orderby takes a single field".to_string(),
            ));
        }
        let mut words = value.split_whitespace();
        let field = words
            .next()
            .ok_or_else(|| Error::ParseError("$orderby needs a field".to_string()))?;
        let direction = match words.next().map(str::to_ascii_lowercase).as_deref() {
            None | Some("asc") => OrderDirection::Asc,
            Some("desc") => OrderDirection::Desc,
            Some(other) => {
                return Err(Error::ParseError(format!(
                    "Unknown $orderby direction `{other}`"
                )))
            }
        };
        if words.next().is_some() {
            return Err(Error::ParseError(format!("Malformed $orderby `{value}`")));
        }
        Ok(OrderBy {
            field: field.to_string(),
            direction,
        })
    }

    fn parse_top(value: &str) -> Result<usize> {
        value
            .trim()
            .parse()
            .map_err(|_| Error::ParseError(format!("$top must be a non-negative integer, got `{value}`")))
    }
}
