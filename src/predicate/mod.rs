//! Metadata predicate evaluation
//!
//! A closed set of operators applied to one value found inside a document's
//! metadata. Expressions never fail: unknown operators, malformed fields,
//! missing paths and incompatible types all evaluate to `false`.

mod compare;

pub use compare::{contains, has_same_element, ordering, values_equal};

use crate::metadata::MetadataValue;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Supported comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    /// Membership in whichever side is a collection
    In,
    /// "Has same element": non-empty intersection
    Hse,
}

impl Operator {
    pub const ALL: [Operator; 8] = [
        Operator::In,
        Operator::Eq,
        Operator::Ne,
        Operator::Gt,
        Operator::Lt,
        Operator::Gte,
        Operator::Lte,
        Operator::Hse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Gt => "gt",
            Operator::Lt => "lt",
            Operator::Gte => "gte",
            Operator::Lte => "lte",
            Operator::In => "in",
            Operator::Hse => "hse",
        }
    }

    /// Apply the operator with the document value on the left-hand side
    /// (`gt` means `document > operand`). Template filter leaves read this way.
    pub fn apply(self, document: &MetadataValue, operand: &MetadataValue) -> bool {
        match self {
            Operator::Eq => values_equal(document, operand),
            Operator::Ne => !values_equal(document, operand),
            Operator::Gt | Operator::Lt | Operator::Gte | Operator::Lte => {
                self.accepts(ordering(document, operand))
            }
            Operator::In => contains(document, operand),
            Operator::Hse => has_same_element(document, operand),
        }
    }

    /// Apply the operator with the supplied operand on the left-hand side
    /// (`gt` means `operand > document`). Request metadata filters read this
    /// way; `eq`, `ne`, `in` and `hse` do not depend on the side.
    pub fn apply_supplied(self, operand: &MetadataValue, document: &MetadataValue) -> bool {
        match self {
            Operator::Gt | Operator::Lt | Operator::Gte | Operator::Lte => {
                self.accepts(ordering(operand, document))
            }
            _ => self.apply(document, operand),
        }
    }

    fn accepts(self, ordering: Option<Ordering>) -> bool {
        match (self, ordering) {
            (Operator::Gt, Some(Ordering::Greater)) => true,
            (Operator::Lt, Some(Ordering::Less)) => true,
            (Operator::Gte, Some(Ordering::Greater | Ordering::Equal)) => true,
            (Operator::Lte, Some(Ordering::Less | Ordering::Equal)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator name outside the supported set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownOperator(pub String);

impl fmt::Display for UnknownOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown operator '{}', expected one of {:?}",
            self.0,
            Operator::ALL.map(|op| op.as_str())
        )
    }
}

impl std::error::Error for UnknownOperator {}

impl FromStr for Operator {
    type Err = UnknownOperator;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "eq" => Ok(Operator::Eq),
            "ne" => Ok(Operator::Ne),
            "gt" => Ok(Operator::Gt),
            "lt" => Ok(Operator::Lt),
            "gte" | "ge" => Ok(Operator::Gte),
            "lte" | "le" => Ok(Operator::Lte),
            "in" => Ok(Operator::In),
            "hse" => Ok(Operator::Hse),
            _ => Err(UnknownOperator(raw.to_string())),
        }
    }
}

/// One `{operator, field}` entry of a request's metadata filter list.
///
/// `field` is a singleton nested mapping whose leaf is the operand, e.g.
/// `{"deep": {"labels": {"1": "X"}}}`. The operator is kept as text so that
/// an unknown name only disables this entry instead of rejecting the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub operator: String,
    pub field: MetadataValue,
}

impl MetadataFilter {
    pub fn new(operator: Operator, field: impl Into<MetadataValue>) -> Self {
        Self {
            operator: operator.as_str().to_string(),
            field: field.into(),
        }
    }

    /// Evaluate against a document's metadata record; no record never matches
    pub fn matches(&self, metadata: Option<&MetadataValue>) -> bool {
        match metadata {
            Some(record) if !record.is_blank() => evaluate(&self.operator, &self.field, record),
            _ => false,
        }
    }
}

/// Evaluate `operator` with the operand at the end of `field` against the
/// value found under the same key path in `metadata`. The operand is the
/// left-hand side: `{"price": 100}` with `lt` holds when `100 < price`.
pub fn evaluate(operator: &str, field: &MetadataValue, metadata: &MetadataValue) -> bool {
    let operator = match operator.parse::<Operator>() {
        Ok(op) => op,
        Err(e) => {
            tracing::warn!("Ignoring metadata filter: {}", e);
            return false;
        }
    };

    let Some((path, operand)) = field.singleton_path() else {
        tracing::warn!("Ignoring metadata filter with malformed field: {:?}", field);
        return false;
    };

    match metadata.walk(path.iter().copied()) {
        Some(value) => operator.apply_supplied(operand, value),
        None => false,
    }
}
