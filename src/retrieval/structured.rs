use crate::metadata::MetadataValue;
use crate::store::{Document, DocumentId};
use crate::templates::QueryTemplate;
use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One document's structured fields, as declared by a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredResult {
    pub name: String,
    pub path: String,
    pub relative_path: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, MetadataValue>,
}

/// Declared fields of the first template asking for a structured response.
/// `None` when no template asks or the first one declares no fields.
pub fn structured_fields(templates: &[QueryTemplate]) -> Option<&[String]> {
    templates
        .iter()
        .find(|t| t.structured_response)
        .map(|t| t.structured_response_fields.as_slice())
        .filter(|fields| !fields.is_empty())
}

/// Union of every template's declared fields, first declaration wins
pub fn factored_fields(templates: &[QueryTemplate]) -> Vec<String> {
    let mut seen = AHashSet::new();
    templates
        .iter()
        .flat_map(|t| t.structured_response_fields.iter())
        .filter(|f| seen.insert(f.as_str()))
        .cloned()
        .collect()
}

/// Top-level metadata values for `fields`; missing and null values are left
/// out
pub fn extract_fields(document: &Document, fields: &[String]) -> BTreeMap<String, MetadataValue> {
    let Some(metadata) = document.metadata() else {
        return BTreeMap::new();
    };
    fields
        .iter()
        .filter_map(|field| match metadata.get(field) {
            None | Some(MetadataValue::Null) => None,
            Some(value) => Some((field.clone(), value.clone())),
        })
        .collect()
}

/// Structured entries for the distinct hit documents, in first-hit order.
/// Documents without metadata or without any declared field are skipped.
pub fn build_structured_results<'a, I>(
    hit_documents: I,
    documents: &AHashMap<DocumentId, &Document>,
    fields: &[String],
) -> Vec<StructuredResult>
where
    I: IntoIterator<Item = &'a DocumentId>,
{
    let mut seen = AHashSet::new();
    let mut results = Vec::new();
    for id in hit_documents {
        if !seen.insert(*id) {
            continue;
        }
        let Some(document) = documents.get(id) else {
            continue;
        };
        let values = extract_fields(document, fields);
        if values.is_empty() {
            continue;
        }
        results.push(StructuredResult {
            name: document.name.clone(),
            path: document.path.clone(),
            relative_path: document.relative_path.clone(),
            fields: values,
        });
    }
    results
}
