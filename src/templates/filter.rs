//! Template filter evaluation against document metadata

use super::{FilterLeaf, FilterNode, FilterTree, QueryTemplate};
use crate::metadata::MetadataValue;
use crate::predicate::Operator;
use crate::store::Document;

/// Stateless evaluator for a template's selection rules
pub struct TemplateFilterer;

impl TemplateFilterer {
    /// Exact match of every `data_connector` key at the top level of the
    /// document metadata. An empty connector matches everything.
    pub fn connector_matches(template: &QueryTemplate, document: &Document) -> bool {
        if template.data_connector.is_empty() {
            return true;
        }
        let Some(metadata) = document.metadata() else {
            return false;
        };
        template
            .data_connector
            .iter()
            .all(|(key, expected)| metadata.get(key) == Some(expected))
    }

    /// Evaluate the template's filter tree.
    ///
    /// Leaves whose path is absent from the metadata are skipped; the document
    /// is rejected at the first leaf that evaluates to false.
    pub fn matches(template: &QueryTemplate, document: &Document) -> bool {
        let Some(metadata) = document.metadata() else {
            return false;
        };
        let tree = &template.data_filter_expressions;
        if tree.is_empty() {
            return true;
        }
        let mut path = Vec::new();
        tree_holds(tree, metadata, &mut path)
    }
}

fn tree_holds<'t>(tree: &'t FilterTree, metadata: &MetadataValue, path: &mut Vec<&'t str>) -> bool {
    for (key, node) in tree {
        path.push(key.as_str());
        let holds = match node {
            FilterNode::Branch(children) => tree_holds(children, metadata, path),
            FilterNode::Leaf(leaf) => leaf_holds(leaf, metadata, path),
        };
        path.pop();
        if !holds {
            return false;
        }
    }
    true
}

fn leaf_holds(leaf: &FilterLeaf, metadata: &MetadataValue, path: &[&str]) -> bool {
    let value = match metadata.walk(path.iter().copied()) {
        Some(MetadataValue::Null) | None => {
            tracing::trace!("Skipping filter on absent metadata path {}", path.join("."));
            return true;
        }
        Some(value) => value,
    };

    match leaf.operator.parse::<Operator>() {
        Ok(operator) => operator.apply(value, &leaf.value),
        Err(e) => {
            tracing::warn!("Filter at {} rejected: {}", path.join("."), e);
            false
        }
    }
}
