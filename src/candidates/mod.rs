//! Candidate set construction
//!
//! Every supplied option produces an independent group of documents. Groups
//! are combined by union (recall-biased OR) unless the request restricts the
//! result to template documents or asks for an intersection.

mod options;

pub use options::SearchOptions;

use crate::predicate::MetadataFilter;
use crate::store::{Document, DocumentId};
use crate::templates::{QueryTemplate, SearchGrammar, TemplateFilterer, TemplateSnapshot};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info};

/// Option a candidate group was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupSource {
    Categories,
    Templates,
    Documents,
    RelativePaths,
    RelativePathContains,
    MetadataFilters,
}

impl GroupSource {
    pub const ALL: [GroupSource; 6] = [
        GroupSource::Categories,
        GroupSource::Templates,
        GroupSource::Documents,
        GroupSource::RelativePaths,
        GroupSource::RelativePathContains,
        GroupSource::MetadataFilters,
    ];

    /// Whether the request supplies this option
    pub fn requested(&self, options: &SearchOptions) -> bool {
        match self {
            GroupSource::Categories => !options.categories.is_empty(),
            GroupSource::Templates => !options.template_ids.is_empty(),
            GroupSource::Documents => !options.documents.is_empty(),
            GroupSource::RelativePaths => !options.relative_paths.is_empty(),
            GroupSource::RelativePathContains => !options.relative_path_contains.is_empty(),
            GroupSource::MetadataFilters => !options.metadata_filters.is_empty(),
        }
    }
}

impl fmt::Display for GroupSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GroupSource::Categories => "categories",
            GroupSource::Templates => "templates",
            GroupSource::Documents => "documents",
            GroupSource::RelativePaths => "relative_paths",
            GroupSource::RelativePathContains => "relative_path_contains",
            GroupSource::MetadataFilters => "metadata_filters",
        })
    }
}

/// Documents selected by one option
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateGroup {
    pub source: GroupSource,
    pub members: BTreeSet<DocumentId>,
}

/// Final document scope for the vector search
#[derive(Debug, Clone, Default)]
pub struct ResolvedCandidates {
    pub ids: BTreeSet<DocumentId>,
    /// Requested templates that resolved, in request order
    pub templates: Vec<QueryTemplate>,
}

impl ResolvedCandidates {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: DocumentId) -> bool {
        self.ids.contains(&id)
    }
}

pub struct CandidateSetBuilder<'g> {
    grammar: &'g SearchGrammar,
}

impl<'g> CandidateSetBuilder<'g> {
    pub fn new(grammar: &'g SearchGrammar) -> Self {
        Self { grammar }
    }

    /// Resolve the candidate set for one request.
    ///
    /// `documents` and `templates` are the request's snapshot; documents not
    /// usable in search never become candidates.
    pub fn build(
        &self,
        options: &SearchOptions,
        documents: &[Document],
        templates: &TemplateSnapshot,
    ) -> ResolvedCandidates {
        let searchable: Vec<&Document> = documents.iter().filter(|d| d.use_in_search).collect();
        let resolved_templates = templates.resolve(&options.template_ids);

        if options.only_template_documents {
            if !resolved_templates.is_empty() {
                let ids = self.template_members(&searchable, &resolved_templates);
                info!("Template-only candidate set: {} documents", ids.len());
                return ResolvedCandidates {
                    ids,
                    templates: resolved_templates,
                };
            }
            debug!("only_template_documents has no effect without resolvable templates");
        }

        let groups = self.groups(options, &searchable, &resolved_templates);
        let ids = combine(&groups, &searchable, options.use_and_operator);
        info!(
            "Resolved {} candidates from {} groups over {} searchable documents",
            ids.len(),
            groups.len(),
            searchable.len()
        );

        ResolvedCandidates {
            ids,
            templates: resolved_templates,
        }
    }

    /// Build every requested group in parallel over the shared snapshot.
    /// Template ids that all fail to resolve build no template group.
    pub fn groups(
        &self,
        options: &SearchOptions,
        documents: &[&Document],
        templates: &[QueryTemplate],
    ) -> Vec<CandidateGroup> {
        let requested: Vec<GroupSource> = GroupSource::ALL
            .into_iter()
            .filter(|source| match source {
                GroupSource::Templates => !templates.is_empty(),
                _ => source.requested(options),
            })
            .collect();

        let groups: Vec<CandidateGroup> = requested
            .into_par_iter()
            .map(|source| CandidateGroup {
                source,
                members: self.members(source, options, documents, templates),
            })
            .collect();

        for group in &groups {
            debug!("Candidate group {}: {} documents", group.source, group.members.len());
        }
        groups
    }

    fn members(
        &self,
        source: GroupSource,
        options: &SearchOptions,
        documents: &[&Document],
        templates: &[QueryTemplate],
    ) -> BTreeSet<DocumentId> {
        let select = |keep: &dyn Fn(&Document) -> bool| -> BTreeSet<DocumentId> {
            documents
                .iter()
                .filter(|d| keep(**d))
                .map(|d| d.id)
                .collect()
        };

        match source {
            GroupSource::Categories => select(&|d| {
                d.category
                    .as_ref()
                    .is_some_and(|c| options.categories.contains(c))
            }),
            GroupSource::Templates => self.template_members(documents, templates),
            GroupSource::Documents => select(&|d| options.documents.contains(&d.name)),
            GroupSource::RelativePaths => {
                select(&|d| options.relative_paths.contains(&d.relative_path))
            }
            GroupSource::RelativePathContains => select(&|d| {
                options
                    .relative_path_contains
                    .iter()
                    .any(|fragment| d.relative_path.contains(fragment.as_str()))
            }),
            GroupSource::MetadataFilters => {
                select(&|d| all_filters_match(&options.metadata_filters, d))
            }
        }
    }

    /// Documents accepted by the grammar and by every template. No resolved
    /// template means no member.
    fn template_members(
        &self,
        documents: &[&Document],
        templates: &[QueryTemplate],
    ) -> BTreeSet<DocumentId> {
        if templates.is_empty() {
            return BTreeSet::new();
        }

        documents
            .par_iter()
            .filter(|d| {
                templates
                    .iter()
                    .all(|t| TemplateFilterer::connector_matches(t, d))
                    && self.grammar.accepts(d)
                    && templates.iter().all(|t| TemplateFilterer::matches(t, d))
            })
            .map(|d| d.id)
            .collect::<Vec<_>>()
            .into_iter()
            .collect()
    }
}

fn all_filters_match(filters: &[MetadataFilter], document: &Document) -> bool {
    let metadata = document.metadata();
    filters.iter().all(|filter| filter.matches(metadata))
}

/// Union (or intersection) of the constructed groups; no group at all means
/// no filtering.
fn combine(groups: &[CandidateGroup], documents: &[&Document], intersect: bool) -> BTreeSet<DocumentId> {
    if groups.is_empty() {
        return documents.iter().map(|d| d.id).collect();
    }

    if intersect {
        let mut iter = groups.iter();
        let mut ids = iter.next().map(|g| g.members.clone()).unwrap_or_default();
        for group in iter {
            if ids.is_empty() {
                break;
            }
            ids.retain(|id| group.members.contains(id));
        }
        return ids;
    }

    groups
        .iter()
        .flat_map(|g| g.members.iter().copied())
        .collect()
}
