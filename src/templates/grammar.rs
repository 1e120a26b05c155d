//! Per-type eligibility rules applied before template filters
//!
//! Every document carries `metadata.type`. The grammar maps a type to the
//! checks run while searching and to the actions applied when presenting a
//! result.

use crate::metadata::{parse_temporal, start_of_day, today, MetadataValue};
use crate::store::Document;
use ahash::AHashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    #[error("document has no metadata")]
    MissingMetadata,

    #[error("document metadata has no 'type'")]
    MissingType,

    #[error("unknown document type '{0}'")]
    UnknownType(String),

    #[error("unknown grammar action '{0}'")]
    UnknownAction(String),

    #[error("'{0}' is not a search action")]
    NotASearchAction(String),

    #[error("metadata field '{0}' is missing")]
    MissingField(&'static str),

    #[error("metadata field '{field}' is not a date: {value}")]
    InvalidDate { field: &'static str, value: String },
}

/// Actions a grammar can reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrammarAction {
    /// Search: `date.end` must be today or later
    EndDateNotBeforeToday,
    /// Presentation: show the whole document instead of a fragment
    ShowWhole,
}

impl GrammarAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrammarAction::EndDateNotBeforeToday => "end_date_not_before_today",
            GrammarAction::ShowWhole => "show_whole",
        }
    }

    pub fn is_search_action(&self) -> bool {
        matches!(self, GrammarAction::EndDateNotBeforeToday)
    }
}

impl fmt::Display for GrammarAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrammarAction {
    type Err = GrammarError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "end_date_not_before_today" | "end_date_older_than_today" => {
                Ok(GrammarAction::EndDateNotBeforeToday)
            }
            "show_whole" => Ok(GrammarAction::ShowWhole),
            other => Err(GrammarError::UnknownAction(other.to_string())),
        }
    }
}

/// Action names per context for one document type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeActions {
    pub search: Vec<String>,
    /// Declared for the presentation layer; search never applies these
    pub presentation: Vec<String>,
}

impl TypeActions {
    pub fn new(search: &[&str], presentation: &[&str]) -> Self {
        Self {
            search: search.iter().map(|s| s.to_string()).collect(),
            presentation: presentation.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchGrammar {
    type_actions: AHashMap<String, TypeActions>,
    lenient: bool,
}

impl Default for SearchGrammar {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SearchGrammar {
    /// Grammar with the built-in `event` / `address` / `other` table
    pub fn new(lenient: bool) -> Self {
        let type_actions = [
            (
                "event",
                TypeActions::new(&["end_date_not_before_today"], &["show_whole"]),
            ),
            ("address", TypeActions::new(&[], &["show_whole"])),
            ("other", TypeActions::new(&[], &[])),
        ]
        .into_iter()
        .map(|(name, actions)| (name.to_string(), actions))
        .collect();

        Self {
            type_actions,
            lenient,
        }
    }

    pub fn with_type_actions<I>(type_actions: I, lenient: bool) -> Self
    where
        I: IntoIterator<Item = (String, TypeActions)>,
    {
        Self {
            type_actions: type_actions.into_iter().collect(),
            lenient,
        }
    }

    pub fn is_lenient(&self) -> bool {
        self.lenient
    }

    /// Whether the document may take part in template-based search.
    ///
    /// Any grammar problem rejects the document; only the log level depends
    /// on leniency.
    pub fn accepts(&self, document: &Document) -> bool {
        match self.check(document) {
            Ok(accepted) => accepted,
            Err(e) => {
                if self.lenient {
                    tracing::debug!("Grammar rejected document {}: {}", document.id, e);
                } else {
                    tracing::warn!("Grammar rejected document {}: {}", document.id, e);
                }
                false
            }
        }
    }

    /// Run every search-context check for the document's type
    pub fn check(&self, document: &Document) -> Result<bool, GrammarError> {
        let metadata = document.metadata().ok_or(GrammarError::MissingMetadata)?;
        let actions = self.actions_for(metadata)?;

        for name in &actions.search {
            let action: GrammarAction = name.parse()?;
            if !action.is_search_action() {
                return Err(GrammarError::NotASearchAction(name.clone()));
            }
            if !run_search_action(action, metadata)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn actions_for(&self, metadata: &MetadataValue) -> Result<&TypeActions, GrammarError> {
        let doc_type = metadata
            .get("type")
            .and_then(MetadataValue::as_str)
            .ok_or(GrammarError::MissingType)?;
        self.type_actions
            .get(doc_type)
            .ok_or_else(|| GrammarError::UnknownType(doc_type.to_string()))
    }
}

fn run_search_action(action: GrammarAction, metadata: &MetadataValue) -> Result<bool, GrammarError> {
    match action {
        GrammarAction::EndDateNotBeforeToday => end_date_not_before_today(metadata),
        GrammarAction::ShowWhole => Err(GrammarError::NotASearchAction(action.to_string())),
    }
}

fn end_date_not_before_today(metadata: &MetadataValue) -> Result<bool, GrammarError> {
    const FIELD: &str = "date.end";

    let raw = metadata
        .walk(["date", "end"])
        .and_then(MetadataValue::as_str)
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or(GrammarError::MissingField(FIELD))?;

    let end = parse_temporal(raw).ok_or_else(|| GrammarError::InvalidDate {
        field: FIELD,
        value: raw.to_string(),
    })?;

    Ok(start_of_day(end) >= today())
}
