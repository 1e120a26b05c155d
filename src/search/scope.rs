use crate::store::DocumentId;
use ahash::AHashSet;

/// Restriction applied inside the vector index: optional language equality
/// AND membership of the chunk's document in the candidate set.
#[derive(Debug, Clone, Default)]
pub struct ScopeFilter {
    pub language: Option<String>,
    pub documents: AHashSet<DocumentId>,
}

impl ScopeFilter {
    pub fn new<I>(documents: I, language: Option<String>) -> Self
    where
        I: IntoIterator<Item = DocumentId>,
    {
        Self {
            language,
            documents: documents.into_iter().collect(),
        }
    }

    /// An empty scope can never match a chunk
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn admits(&self, document: DocumentId, language: Option<&str>) -> bool {
        if let Some(wanted) = self.language.as_deref() {
            if language != Some(wanted) {
                return false;
            }
        }
        self.documents.contains(&document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_and_documents() {
        let scope = ScopeFilter::new([DocumentId(1), DocumentId(2)], Some("pl".into()));
        assert!(scope.admits(DocumentId(1), Some("pl")));
        assert!(!scope.admits(DocumentId(1), Some("en")));
        assert!(!scope.admits(DocumentId(1), None));
        assert!(!scope.admits(DocumentId(3), Some("pl")));

        let any_language = ScopeFilter::new([DocumentId(1)], None);
        assert!(any_language.admits(DocumentId(1), None));
        assert!(any_language.admits(DocumentId(1), Some("de")));
    }
}
