//! Candidate set construction over realistic document collections

use chrono::{Duration, Local};
use docsieve::candidates::{CandidateSetBuilder, SearchOptions};
use docsieve::metadata::MetadataValue;
use docsieve::predicate::{evaluate, MetadataFilter, Operator};
use docsieve::store::{Document, DocumentId, TemplateId};
use docsieve::templates::{FilterTree, QueryTemplate, SearchGrammar, TemplateFilterer, TemplateSnapshot};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};

fn document(id: i64, category: &str, relative_path: &str, metadata: Option<serde_json::Value>) -> Document {
    Document {
        id: DocumentId(id),
        collection_id: 1,
        name: format!("d{}", id),
        path: format!("/srv/library{}", relative_path),
        relative_path: relative_path.to_string(),
        category: Some(category.to_string()),
        language: Some("en".to_string()),
        use_in_search: true,
        metadata: metadata.map(MetadataValue::from),
    }
}

fn template(id: i64, filters: serde_json::Value) -> QueryTemplate {
    QueryTemplate {
        id: TemplateId(id),
        grammar_id: 1,
        organisation_id: 1,
        name: format!("template-{}", id),
        display: None,
        is_active: true,
        data_connector: BTreeMap::new(),
        data_filter_expressions: serde_json::from_value::<FilterTree>(filters).unwrap(),
        structured_response: false,
        structured_response_fields: vec![],
        system_prompt: None,
    }
}

fn ids(values: &[i64]) -> BTreeSet<DocumentId> {
    values.iter().map(|v| DocumentId(*v)).collect()
}

fn resolve(options: &SearchOptions, documents: &[Document], templates: Vec<QueryTemplate>) -> BTreeSet<DocumentId> {
    let grammar = SearchGrammar::new(true);
    let snapshot = TemplateSnapshot::new(1, templates);
    CandidateSetBuilder::new(&grammar)
        .build(options, documents, &snapshot)
        .ids
}

fn day(offset: i64) -> String {
    (Local::now().date_naive() + Duration::days(offset))
        .format("%Y-%m-%d")
        .to_string()
}

#[test]
fn test_scenario_a_category() {
    let docs = vec![document(1, "Law", "/a", None), document(2, "Tax", "/b", None)];
    let options = SearchOptions {
        categories: vec!["Law".into()],
        ..Default::default()
    };
    assert_eq!(resolve(&options, &docs, vec![]), ids(&[1]));
}

#[test]
fn test_scenario_b_nested_in() {
    let metadata = MetadataValue::from(json!({"deep": {"labels": {"1": ["X", "Y"]}}}));
    let field = MetadataValue::from(json!({"deep": {"labels": {"1": "X"}}}));
    assert!(evaluate("in", &field, &metadata));

    let missing = MetadataValue::from(json!({"deep": {"labels": {"2": "X"}}}));
    assert!(!evaluate("in", &missing, &metadata));
}

#[test]
fn test_scenario_c_date_window() {
    let events = template(1, json!({"date": {"end": {"operator": "gte", "value": "<today>"}}}));
    let past = document(1, "Events", "/past", Some(json!({"type": "other", "date": {"end": day(-1)}})));
    let future = document(2, "Events", "/future", Some(json!({"type": "other", "date": {"end": day(1)}})));

    assert!(!TemplateFilterer::matches(&events, &past));
    assert!(TemplateFilterer::matches(&events, &future));

    let options = SearchOptions {
        template_ids: vec![TemplateId(1)],
        only_template_documents: true,
        ..Default::default()
    };
    assert_eq!(resolve(&options, &[past, future], vec![events]), ids(&[2]));
}

#[test]
fn test_scenario_d_union_of_category_and_metadata() {
    let docs = vec![
        document(1, "Law", "/law/act.pdf", Some(json!({"type": "act"}))),
        document(2, "Tax", "/tax/reg.pdf", Some(json!({"type": "regulation"}))),
        document(3, "Tax", "/tax/form.pdf", Some(json!({"type": "form"}))),
        document(4, "Law", "/law/reg.pdf", Some(json!({"type": "regulation"}))),
    ];
    let options = SearchOptions {
        categories: vec!["Law".into()],
        metadata_filters: vec![MetadataFilter::new(Operator::Eq, json!({"type": "regulation"}))],
        only_template_documents: false,
        ..Default::default()
    };
    assert_eq!(resolve(&options, &docs, vec![]), ids(&[1, 2, 4]));

    let intersect = SearchOptions {
        use_and_operator: true,
        ..options
    };
    assert_eq!(resolve(&intersect, &docs, vec![]), ids(&[4]));
}

#[test]
fn test_only_template_documents_with_empty_template_group() {
    let docs = vec![
        document(1, "Law", "/a", Some(json!({"type": "other", "kind": "statute"}))),
        document(2, "Tax", "/b", Some(json!({"type": "other", "kind": "form"}))),
    ];
    let nothing = template(5, json!({"kind": {"operator": "eq", "value": "concert"}}));
    let options = SearchOptions {
        categories: vec!["Law".into()],
        relative_path_contains: vec!["/".into()],
        template_ids: vec![TemplateId(5)],
        only_template_documents: true,
        ..Default::default()
    };
    assert!(resolve(&options, &docs, vec![nothing]).is_empty());
}

#[test]
fn test_no_options_selects_every_searchable_document() {
    let mut hidden = document(3, "Law", "/hidden", None);
    hidden.use_in_search = false;
    let docs = vec![document(1, "Law", "/a", None), document(2, "Tax", "/b", None), hidden];

    assert_eq!(resolve(&SearchOptions::default(), &docs, vec![]), ids(&[1, 2]));
}

#[test]
fn test_path_substring_only_match_joins_union() {
    let docs = vec![
        document(1, "Law", "/law/a.pdf", None),
        document(2, "Tax", "/archive/2019/b.pdf", None),
        document(3, "Tax", "/tax/c.pdf", None),
    ];
    let options = SearchOptions {
        categories: vec!["Law".into()],
        relative_path_contains: vec!["2019".into()],
        ..Default::default()
    };
    assert_eq!(resolve(&options, &docs, vec![]), ids(&[1, 2]));
}

#[test]
fn test_empty_filter_tree_accepts_documents_with_metadata_only() {
    let open = template(1, json!({}));
    let with = document(1, "Law", "/a", Some(json!({"type": "other"})));
    let without = document(2, "Law", "/b", None);

    assert!(TemplateFilterer::matches(&open, &with));
    assert!(!TemplateFilterer::matches(&open, &without));
}

#[test]
fn test_inactive_or_foreign_templates_are_dropped() {
    let docs = vec![
        document(1, "Law", "/a", Some(json!({"type": "other"}))),
        document(2, "Tax", "/b", Some(json!({"type": "other"}))),
    ];
    let mut foreign = template(2, json!({}));
    foreign.organisation_id = 9;

    let mut inactive = template(3, json!({}));
    inactive.is_active = false;

    // Nothing resolves, so the request is scoped by its other options
    let options = SearchOptions {
        categories: vec!["Tax".into()],
        template_ids: vec![TemplateId(2), TemplateId(3), TemplateId(4)],
        only_template_documents: true,
        ..Default::default()
    };
    assert_eq!(resolve(&options, &docs, vec![foreign.clone(), inactive.clone()]), ids(&[2]));

    let only_templates = SearchOptions {
        template_ids: vec![TemplateId(2), TemplateId(3)],
        ..Default::default()
    };
    assert_eq!(resolve(&only_templates, &docs, vec![foreign, inactive]), ids(&[1, 2]));
}
