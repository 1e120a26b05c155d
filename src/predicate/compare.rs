//! Primitive comparisons between a document value and a supplied operand.
//!
//! Every function is total: incompatible shapes yield `false`/`None`.

use crate::metadata::{parse_temporal, MetadataValue};
use std::cmp::Ordering;

/// Structural equality; numbers compare numerically, date strings as dates
pub fn values_equal(left: &MetadataValue, right: &MetadataValue) -> bool {
    use MetadataValue::*;
    match (left, right) {
        (Null, Null) => true,
        (Bool(a), Bool(b)) => a == b,
        (Integer(a), Integer(b)) => a == b,
        (Integer(_) | Float(_), Integer(_) | Float(_)) => {
            matches!(left.as_f64().zip(right.as_f64()), Some((a, b)) if a == b)
        }
        (Text(a), Text(b)) => {
            a == b
                || matches!(
                    (parse_temporal(a), parse_temporal(b)),
                    (Some(x), Some(y)) if x == y
                )
        }
        (Sequence(a), Sequence(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Mapping(a), Mapping(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => false,
    }
}

/// Ordering for mutually comparable values: numbers, or strings that both
/// normalise to points in time.
pub fn ordering(left: &MetadataValue, right: &MetadataValue) -> Option<Ordering> {
    if left.is_number() && right.is_number() {
        return left.as_f64()?.partial_cmp(&right.as_f64()?);
    }
    let left = parse_temporal(left.as_str()?)?;
    let right = parse_temporal(right.as_str()?)?;
    Some(left.cmp(&right))
}

/// Membership test for `in`.
///
/// The container is whichever side is a collection: a document sequence must
/// hold the operand (or every operand element), a document mapping must have
/// the operand as a key, and a document scalar must equal the operand or be
/// one of its elements.
pub fn contains(document: &MetadataValue, operand: &MetadataValue) -> bool {
    match (document, operand) {
        (MetadataValue::Sequence(items), MetadataValue::Sequence(wanted)) => {
            !wanted.is_empty()
                && wanted
                    .iter()
                    .all(|w| items.iter().any(|item| values_equal(item, w)))
        }
        (MetadataValue::Sequence(items), _) => items.iter().any(|item| values_equal(item, operand)),
        (MetadataValue::Mapping(map), MetadataValue::Text(key)) => map.contains_key(key),
        (MetadataValue::Mapping(_), _) => false,
        (_, MetadataValue::Sequence(options)) => {
            options.iter().any(|option| values_equal(document, option))
        }
        _ => values_equal(document, operand),
    }
}

/// "Has same element": the two collections share at least one element.
/// Scalars count as one-element collections; mappings never match.
pub fn has_same_element(document: &MetadataValue, operand: &MetadataValue) -> bool {
    let (Some(left), Some(right)) = (as_elements(document), as_elements(operand)) else {
        return false;
    };
    left.iter()
        .any(|a| right.iter().any(|b| values_equal(a, b)))
}

fn as_elements(value: &MetadataValue) -> Option<&[MetadataValue]> {
    match value {
        MetadataValue::Sequence(items) => Some(items),
        MetadataValue::Mapping(_) => None,
        scalar => Some(std::slice::from_ref(scalar)),
    }
}
