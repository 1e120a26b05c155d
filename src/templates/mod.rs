//! Query templates
//!
//! A query template is a named, reusable document-selection rule: an exact
//! `data_connector` match on top-level metadata plus a tree of filter
//! expressions. Templates are grouped under a grammar and loaded in bulk from
//! a JSON configuration file.

pub mod filter;
pub mod grammar;
pub mod loader;

pub use filter::TemplateFilterer;
pub use grammar::{GrammarAction, GrammarError, SearchGrammar, TypeActions};
pub use loader::{GrammarDefinition, LoadReport, TemplateDraft, TemplateLoader, TemplateSet};

use crate::metadata::MetadataValue;
use crate::store::{OrganisationId, TemplateId};
use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Nested filter expressions keyed by metadata path segment
pub type FilterTree = BTreeMap<String, FilterNode>;

/// Interior node (further path segments) or a leaf comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterNode {
    Leaf(FilterLeaf),
    Branch(FilterTree),
}

/// Comparison applied to the metadata value at the leaf's path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterLeaf {
    pub operator: String,
    #[serde(alias = "comparison_value")]
    pub value: MetadataValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTemplate {
    pub id: TemplateId,
    pub grammar_id: i64,
    pub organisation_id: OrganisationId,
    pub name: String,
    pub display: Option<String>,
    pub is_active: bool,
    /// Top-level metadata keys that must equal these values exactly
    pub data_connector: BTreeMap<String, MetadataValue>,
    pub data_filter_expressions: FilterTree,
    pub structured_response: bool,
    pub structured_response_fields: Vec<String>,
    pub system_prompt: Option<String>,
}

impl QueryTemplate {
    /// System prompt unless empty or whitespace
    pub fn prompt(&self) -> Option<&str> {
        self.system_prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    pub fn wants_structured_response(&self) -> bool {
        self.structured_response && !self.structured_response_fields.is_empty()
    }
}

/// Read-only view of an organisation's active templates, taken once per
/// request
#[derive(Debug, Clone, Default)]
pub struct TemplateSnapshot {
    organisation_id: OrganisationId,
    by_id: AHashMap<TemplateId, QueryTemplate>,
}

impl TemplateSnapshot {
    pub fn new(organisation_id: OrganisationId, templates: Vec<QueryTemplate>) -> Self {
        let by_id = templates
            .into_iter()
            .filter(|t| t.is_active && t.organisation_id == organisation_id)
            .map(|t| (t.id, t))
            .collect();
        Self {
            organisation_id,
            by_id,
        }
    }

    pub fn organisation_id(&self) -> OrganisationId {
        self.organisation_id
    }

    pub fn get(&self, id: TemplateId) -> Option<&QueryTemplate> {
        self.by_id.get(&id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Templates for the requested ids in request order, first occurrence
    /// wins. Ids that are unknown, inactive or owned by another organisation
    /// are dropped.
    pub fn resolve(&self, ids: &[TemplateId]) -> Vec<QueryTemplate> {
        let mut seen = AHashSet::with_capacity(ids.len());
        let mut resolved = Vec::with_capacity(ids.len());
        for id in ids {
            if !seen.insert(*id) {
                continue;
            }
            match self.by_id.get(id) {
                Some(template) => resolved.push(template.clone()),
                None => tracing::debug!(
                    "Dropping template {}: not available to organisation {}",
                    id,
                    self.organisation_id
                ),
            }
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_tree_deserializes_leaves_and_branches() {
        let tree: FilterTree = serde_json::from_str(
            r#"{
                "date": {
                    "end": {"operator": "gte", "value": "<today>"},
                    "begin": {"operator": "lte", "comparison_value": "<today+8d>"}
                },
                "kind": {"operator": "eq", "value": "concert"}
            }"#,
        )
        .unwrap();

        let FilterNode::Branch(date) = &tree["date"] else {
            panic!("date should be a branch");
        };
        assert_eq!(
            date["begin"],
            FilterNode::Leaf(FilterLeaf {
                operator: "lte".into(),
                value: MetadataValue::from("<today+8d>"),
            })
        );
        assert!(matches!(tree["kind"], FilterNode::Leaf(_)));
    }

    #[test]
    fn test_malformed_leaf_is_rejected() {
        let parsed = serde_json::from_str::<FilterTree>(r#"{"end": "datetime.now()"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_blank_prompt() {
        let template = QueryTemplate {
            id: TemplateId(1),
            grammar_id: 1,
            organisation_id: 1,
            name: "events".into(),
            display: None,
            is_active: true,
            data_connector: BTreeMap::new(),
            data_filter_expressions: FilterTree::new(),
            structured_response: true,
            structured_response_fields: vec![],
            system_prompt: Some("   ".into()),
        };
        assert_eq!(template.prompt(), None);
        assert!(!template.wants_structured_response());
    }

    #[test]
    fn test_snapshot_drops_foreign_and_inactive() {
        let make = |id: i64, organisation_id: OrganisationId, is_active: bool| QueryTemplate {
            id: TemplateId(id),
            grammar_id: 1,
            organisation_id,
            name: format!("t{}", id),
            display: None,
            is_active,
            data_connector: BTreeMap::new(),
            data_filter_expressions: FilterTree::new(),
            structured_response: false,
            structured_response_fields: vec![],
            system_prompt: None,
        };
        let snapshot = TemplateSnapshot::new(1, vec![make(1, 1, true), make(2, 2, true), make(3, 1, false)]);
        assert_eq!(snapshot.len(), 1);

        let resolved = snapshot.resolve(&[TemplateId(2), TemplateId(1), TemplateId(3), TemplateId(1), TemplateId(9)]);
        let ids: Vec<_> = resolved.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![TemplateId(1)]);
    }
}
