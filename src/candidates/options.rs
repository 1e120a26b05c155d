use crate::predicate::MetadataFilter;
use crate::store::TemplateId;
use serde::{Deserialize, Deserializer, Serialize};

/// Request-scoped search options.
///
/// List options accept either a list or a single bare value. An empty list
/// counts as not supplied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    #[serde(deserialize_with = "one_or_many")]
    pub categories: Vec<String>,

    /// Exact document names
    #[serde(deserialize_with = "one_or_many")]
    pub documents: Vec<String>,

    #[serde(deserialize_with = "one_or_many")]
    pub relative_paths: Vec<String>,

    /// Substrings of relative paths; any one is enough
    #[serde(deserialize_with = "one_or_many")]
    pub relative_path_contains: Vec<String>,

    #[serde(alias = "templates", deserialize_with = "one_or_many")]
    pub template_ids: Vec<TemplateId>,

    /// Every entry must hold (implicit AND)
    #[serde(deserialize_with = "one_or_many")]
    pub metadata_filters: Vec<MetadataFilter>,

    pub only_template_documents: bool,

    /// Intersect the constructed groups instead of taking their union
    pub use_and_operator: bool,

    pub max_results: Option<usize>,
    pub rerank_results: bool,
    pub return_with_factored_fields: bool,
    pub language: Option<String>,
    pub ignore_language: bool,
}

impl SearchOptions {
    /// Language constraint for the vector search: none when ignored, else the
    /// request override, else `default`
    pub fn effective_language(&self, default: Option<&str>) -> Option<String> {
        if self.ignore_language {
            return None;
        }
        self.language
            .as_deref()
            .or(default)
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
    }
}

fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
    }

    Ok(match Option::<OneOrMany<T>>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::Many(values)) => values,
        Some(OneOrMany::One(value)) => vec![value],
    })
}
