//! Per-document aggregation of search hits

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::store::DocumentId;

/// Lower bound of each document's scaled share
pub const SMOOTHING_FACTOR: f64 = 1e-4;

/// Keeps `ln` finite for non-positive products (e.g. negative reranker logits)
const MIN_LN_ARGUMENT: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentStats {
    pub document_id: DocumentId,
    pub relative_path: String,
    /// Average hit score
    pub score: f64,
    pub hits: usize,
    /// Distinct pages with at least one hit, ascending
    pub pages: Vec<i64>,
    pub pages_count: usize,
    pub score_weighted: f64,
    pub score_weighted_scaled: f64,
}

/// Score contribution of one hit
#[derive(Debug, Clone)]
pub struct HitSample<'a> {
    pub document_name: &'a str,
    pub document_id: DocumentId,
    pub relative_path: &'a str,
    pub score: f32,
    pub page_number: i64,
}

#[derive(Default)]
struct Accumulator {
    document_id: Option<DocumentId>,
    relative_path: String,
    score_sum: f64,
    hits: usize,
    pages: BTreeSet<i64>,
}

/// Aggregate hits per document name.
///
/// `score_weighted = ln(avg_score * hits * pages_count)`; the scaled value
/// shifts every weight by `|min|`, divides by the shifted sum and is floored
/// at [`SMOOTHING_FACTOR`]. A zero sum gives every document `1.0`.
pub fn compute_stats<'a, I>(samples: I) -> BTreeMap<String, DocumentStats>
where
    I: IntoIterator<Item = HitSample<'a>>,
{
    let mut acc: BTreeMap<String, Accumulator> = BTreeMap::new();
    for sample in samples {
        let entry = acc.entry(sample.document_name.to_string()).or_default();
        entry.document_id.get_or_insert(sample.document_id);
        if entry.relative_path.is_empty() {
            entry.relative_path = sample.relative_path.to_string();
        }
        entry.score_sum += f64::from(sample.score);
        entry.hits += 1;
        entry.pages.insert(sample.page_number);
    }

    let mut stats: BTreeMap<String, DocumentStats> = acc
        .into_iter()
        .filter_map(|(name, a)| {
            let document_id = a.document_id?;
            let score = a.score_sum / a.hits as f64;
            let pages: Vec<i64> = a.pages.into_iter().collect();
            let pages_count = pages.len();
            let weight = (score * a.hits as f64 * pages_count as f64).max(MIN_LN_ARGUMENT);
            Some((
                name,
                DocumentStats {
                    document_id,
                    relative_path: a.relative_path,
                    score,
                    hits: a.hits,
                    pages,
                    pages_count,
                    score_weighted: weight.ln(),
                    score_weighted_scaled: 0.0,
                },
            ))
        })
        .collect();

    let Some(min) = stats
        .values()
        .map(|s| s.score_weighted)
        .min_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
    else {
        return stats;
    };
    let shift = min.abs();
    let total: f64 = stats.values().map(|s| s.score_weighted + shift).sum();

    for s in stats.values_mut() {
        s.score_weighted_scaled = if total > 0.0 {
            ((s.score_weighted + shift) / total).max(SMOOTHING_FACTOR)
        } else {
            1.0
        };
    }
    stats
}

/// Drop documents under the hit or page thresholds
pub fn filter_stats(
    stats: BTreeMap<String, DocumentStats>,
    min_hits: usize,
    min_pages: usize,
) -> BTreeMap<String, DocumentStats> {
    stats
        .into_iter()
        .filter(|(_, s)| s.hits >= min_hits && s.pages_count >= min_pages)
        .collect()
}

/// Document names, best first, until their cumulative scaled score reaches
/// `share`. Values above 1 are read as percentages.
pub fn top_documents_by_share(stats: &BTreeMap<String, DocumentStats>, share: f64) -> Vec<String> {
    let limit = if share > 1.0 { share / 100.0 } else { share };

    let mut ranked: Vec<(&String, &DocumentStats)> = stats.iter().collect();
    ranked.sort_by(|a, b| {
        b.1.score_weighted_scaled
            .partial_cmp(&a.1.score_weighted_scaled)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });

    let mut accumulated = 0.0;
    let mut names = Vec::new();
    for (name, s) in ranked {
        if accumulated >= limit {
            break;
        }
        accumulated += s.score_weighted_scaled;
        names.push(name.clone());
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &'static str, id: i64, score: f32, page: i64) -> HitSample<'static> {
        HitSample {
            document_name: name,
            document_id: DocumentId(id),
            relative_path: name,
            score,
            page_number: page,
        }
    }

    fn stats() -> BTreeMap<String, DocumentStats> {
        compute_stats(vec![
            sample("a", 1, 0.9, 1),
            sample("a", 1, 0.7, 2),
            sample("a", 1, 0.8, 2),
            sample("b", 2, 0.5, 4),
        ])
    }

    #[test]
    fn test_aggregation() {
        let stats = stats();
        let a = &stats["a"];
        assert_eq!(a.hits, 3);
        assert_eq!(a.pages, vec![1, 2]);
        assert_eq!(a.pages_count, 2);
        assert!((a.score - 0.8).abs() < 1e-6);
        assert!((a.score_weighted - (0.8f64 * 3.0 * 2.0).ln()).abs() < 1e-6);
    }

    #[test]
    fn test_scaled_shares() {
        let stats = stats();
        let a = stats["a"].score_weighted;
        let b = stats["b"].score_weighted;
        let shift = b.min(a).abs();
        let total = a + shift + b + shift;
        assert!((stats["a"].score_weighted_scaled - (a + shift) / total).abs() < 1e-9);
        assert!((stats["b"].score_weighted_scaled - ((b + shift) / total).max(SMOOTHING_FACTOR)).abs() < 1e-9);
    }

    #[test]
    fn test_single_document_with_zero_sum() {
        // ln(1 * 1 * 1) == 0, shifted sum is 0
        let stats = compute_stats(vec![sample("only", 1, 1.0, 1)]);
        assert_eq!(stats["only"].score_weighted_scaled, 1.0);
    }

    #[test]
    fn test_negative_scores_stay_finite() {
        let stats = compute_stats(vec![sample("neg", 1, -3.0, 1), sample("pos", 2, 2.0, 1)]);
        assert!(stats.values().all(|s| s.score_weighted.is_finite()));
        assert!(stats.values().all(|s| s.score_weighted_scaled >= SMOOTHING_FACTOR));
    }

    #[test]
    fn test_filter_thresholds() {
        let filtered = filter_stats(stats(), 2, 2);
        assert_eq!(filtered.keys().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(filter_stats(stats(), 1, 1).len(), 2);
    }

    #[test]
    fn test_top_documents_by_share() {
        let stats = stats();
        assert_eq!(top_documents_by_share(&stats, 0.1), vec!["a".to_string()]);
        assert_eq!(top_documents_by_share(&stats, 100.0).len(), 2);
        assert!(top_documents_by_share(&stats, 0.0).is_empty());
    }

    #[test]
    fn test_empty() {
        assert!(compute_stats(Vec::<HitSample>::new()).is_empty());
    }
}
