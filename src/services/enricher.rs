use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::{
    error::AppResult,
    models::{ContentRef, EnrichedContent, SearchCandidate},
    services::providers::{SearchProvider, SearchQuery},
};

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(8);

/// Lowercases, strips diacritics, collapses non-alphanumeric runs to one
/// space and trims.
pub fn normalize_title(title: &str) -> String {
    let mut normalized = String::with_capacity(title.len());
    let mut pending_space = false;

    for c in title.nfd().filter(|c| !is_combining_mark(*c)) {
        if c.is_alphanumeric() {
            if pending_space && !normalized.is_empty() {
                normalized.push(' ');
            }
            pending_space = false;
            normalized.extend(c.to_lowercase());
        } else {
            pending_space = true;
        }
    }
    normalized
}

/// Match score of one candidate against a reference
pub fn score_candidate(reference: &ContentRef, candidate: &SearchCandidate) -> f64 {
    let wanted = normalize_title(&reference.title);
    let found = normalize_title(candidate.display_title());
    let mut score = 0.0;

    if !wanted.is_empty() && !found.is_empty() {
        if wanted == found {
            score += 2.0;
        } else if wanted.starts_with(&found) || found.starts_with(&wanted) {
            score += 1.0;
        }
    }

    if let (Some(want), Some(got)) = (reference.year, candidate.release_year()) {
        match (want - got).abs() {
            0 => score += 3.0,
            1 => score += 1.0,
            _ => {}
        }
    }

    let popularity = candidate.popularity.unwrap_or(0.0).max(0.0);
    score + (popularity / 50.0).min(1.0) * 2.0
}

/// Highest-scoring candidate; the first one encountered wins ties.
pub fn select_best<'a>(
    reference: &ContentRef,
    candidates: &'a [SearchCandidate],
) -> Option<&'a SearchCandidate> {
    let mut best: Option<(&SearchCandidate, f64)> = None;
    for candidate in candidates {
        let score = score_candidate(reference, candidate);
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((candidate, score));
        }
    }
    best.map(|(candidate, _)| candidate)
}

fn language_matches(candidate: &SearchCandidate, language: &str) -> bool {
    candidate
        .original_language
        .as_deref()
        .is_some_and(|l| l.eq_ignore_ascii_case(language))
}

/// Resolves generated title references into catalogue records
pub struct ResultEnricher {
    provider: Arc<dyn SearchProvider>,
    concurrency: usize,
    lookup_timeout: Duration,
}

impl ResultEnricher {
    pub fn new(provider: Arc<dyn SearchProvider>, concurrency: usize, lookup_timeout: Duration) -> Self {
        Self {
            provider,
            concurrency: concurrency.max(1),
            lookup_timeout,
        }
    }

    /// Resolves one reference. A missing match is `Ok(None)`.
    pub async fn enrich(&self, reference: &ContentRef) -> AppResult<Option<EnrichedContent>> {
        let query = SearchQuery::new(
            normalize_title(&reference.title),
            reference.year,
            reference.content_type,
        );
        if query.title.is_empty() {
            return Ok(None);
        }

        let mut pool = self.provider.search(&query).await?;
        let mut filtered = self.filter_by_language(&pool, reference);

        if filtered.is_empty() && query.year.is_some() {
            pool = self.provider.search(&query.without_year()).await?;
            filtered = self.filter_by_language(&pool, reference);
        }

        let candidates = if filtered.is_empty() { pool } else { filtered };
        let best = select_best(reference, &candidates).cloned();

        if best.is_none() {
            tracing::debug!(title = %reference.title, year = ?reference.year, "No catalogue match");
        }
        Ok(best.map(|candidate| candidate.into_enriched(reference.content_type)))
    }

    fn filter_by_language(
        &self,
        pool: &[SearchCandidate],
        reference: &ContentRef,
    ) -> Vec<SearchCandidate> {
        match reference.language.as_deref() {
            Some(language) => pool
                .iter()
                .filter(|c| language_matches(c, language))
                .cloned()
                .collect(),
            None => pool.to_vec(),
        }
    }

    /// Resolves references with bounded concurrency, keeping input order.
    ///
    /// Lookups that miss, fail or time out are dropped.
    pub async fn enrich_all(&self, references: Vec<ContentRef>) -> Vec<EnrichedContent> {
        let requested = references.len();

        let resolved: Vec<Option<EnrichedContent>> = stream::iter(references)
            .map(|reference| async move {
                match tokio::time::timeout(self.lookup_timeout, self.enrich(&reference)).await {
                    Ok(Ok(found)) => found,
                    Ok(Err(e)) => {
                        tracing::warn!(
                            error = %e,
                            provider = self.provider.name(),
                            title = %reference.title,
                            "Enrichment lookup failed"
                        );
                        None
                    }
                    Err(_) => {
                        tracing::warn!(title = %reference.title, "Enrichment lookup timed out");
                        None
                    }
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let enriched: Vec<EnrichedContent> = resolved.into_iter().flatten().collect();
        tracing::info!(requested, resolved = enriched.len(), "Enrichment finished");
        enriched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::ContentType;
    use crate::services::providers::MockSearchProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn candidate(id: u64, title: &str, date: &str, language: &str, popularity: f64) -> SearchCandidate {
        SearchCandidate {
            id,
            title: Some(title.to_string()),
            name: None,
            poster_path: None,
            backdrop_path: None,
            overview: None,
            release_date: Some(date.to_string()),
            first_air_date: None,
            original_language: Some(language.to_string()),
            popularity: Some(popularity),
            vote_average: None,
        }
    }

    fn reference(title: &str, year: Option<i32>, language: Option<&str>) -> ContentRef {
        ContentRef {
            title: title.to_string(),
            year,
            content_type: ContentType::Movie,
            language: language.map(str::to_string),
        }
    }

    fn enricher(provider: MockSearchProvider) -> ResultEnricher {
        ResultEnricher::new(Arc::new(provider), DEFAULT_CONCURRENCY, DEFAULT_LOOKUP_TIMEOUT)
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("  Amélie: Le Fabuleux Destin!! "), "amelie le fabuleux destin");
        assert_eq!(normalize_title("Spider-Man: No Way Home"), "spider man no way home");
        assert_eq!(normalize_title("???"), "");
    }

    #[test]
    fn test_scoring_prefers_matching_year() {
        let dune = reference("Dune", Some(2021), None);
        let old = candidate(841, "Dune", "1984-12-14", "en", 10.0);
        let new = candidate(438631, "Dune", "2021-09-15", "en", 80.0);

        assert_eq!(score_candidate(&dune, &old), 2.0 + 0.4);
        assert_eq!(score_candidate(&dune, &new), 2.0 + 3.0 + 2.0);

        let pool = vec![old, new];
        assert_eq!(select_best(&dune, &pool).map(|c| c.id), Some(438631));
    }

    #[test]
    fn test_ties_go_to_first_candidate() {
        let reference = reference("Heat", None, None);
        let pool = vec![
            candidate(1, "Heat", "1995-12-15", "en", 0.0),
            candidate(2, "Heat", "1986-03-14", "en", 0.0),
        ];
        assert_eq!(select_best(&reference, &pool).map(|c| c.id), Some(1));
    }

    #[test]
    fn test_prefix_and_near_year_scoring() {
        let reference = reference("Alien", Some(1980), None);
        let prefix = candidate(1, "Aliens", "1979-05-25", "en", 0.0);
        assert_eq!(score_candidate(&reference, &prefix), 1.0 + 1.0);
    }

    #[tokio::test]
    async fn test_enrich_picks_2021_dune() {
        let mut provider = MockSearchProvider::new();
        provider.expect_search().times(1).returning(|query| {
            assert_eq!(query.title, "dune");
            assert_eq!(query.year, Some(2021));
            Ok(vec![
                candidate(841, "Dune", "1984-12-14", "en", 10.0),
                candidate(438631, "Dune", "2021-09-15", "en", 80.0),
            ])
        });

        let found = enricher(provider)
            .enrich(&reference("Dune", Some(2021), None))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, 438631);
        assert_eq!(found.release_year, Some(2021));
    }

    #[tokio::test]
    async fn test_requery_without_year_when_language_filter_empties_pool() {
        let mut provider = MockSearchProvider::new();
        provider
            .expect_search()
            .withf(|q| q.year.is_some())
            .times(1)
            .returning(|_| Ok(vec![candidate(1, "Oldboy", "2013-11-27", "en", 20.0)]));
        provider
            .expect_search()
            .withf(|q| q.year.is_none())
            .times(1)
            .returning(|_| {
                Ok(vec![
                    candidate(1, "Oldboy", "2013-11-27", "en", 20.0),
                    candidate(670, "Oldboy", "2003-11-21", "ko", 30.0),
                ])
            });

        let found = enricher(provider)
            .enrich(&reference("Oldboy", Some(2004), Some("ko")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, 670);
    }

    #[tokio::test]
    async fn test_language_filter_falls_back_to_unfiltered_pool() {
        let mut provider = MockSearchProvider::new();
        provider
            .expect_search()
            .returning(|_| Ok(vec![candidate(9, "Shōgun", "1980-09-15", "en", 5.0)]));

        let found = enricher(provider)
            .enrich(&reference("Shogun", Some(1980), Some("ja")))
            .await
            .unwrap();
        assert_eq!(found.map(|f| f.id), Some(9));
    }

    #[tokio::test]
    async fn test_no_candidates_is_none() {
        let mut provider = MockSearchProvider::new();
        provider.expect_search().returning(|_| Ok(Vec::new()));

        let found = enricher(provider)
            .enrich(&reference("Nonexistent Film", None, None))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_enrich_all_preserves_order_and_drops_failures() {
        let mut provider = MockSearchProvider::new();
        provider.expect_name().return_const("mock");
        provider.expect_search().returning(|query| match query.title.as_str() {
            "arrival" => Ok(vec![candidate(329865, "Arrival", "2016-11-10", "en", 40.0)]),
            "broken" => Err(AppError::TransientNetwork("HTTP 503".to_string())),
            "heat" => Ok(vec![candidate(949, "Heat", "1995-12-15", "en", 30.0)]),
            _ => Ok(Vec::new()),
        });

        let refs = vec![
            reference("Arrival", None, None),
            reference("Broken", None, None),
            reference("Unknown", None, None),
            reference("Heat", None, None),
        ];
        let ids: Vec<u64> = enricher(provider)
            .enrich_all(refs)
            .await
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![329865, 949]);
    }

    struct SlowProvider {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl SearchProvider for SlowProvider {
        async fn search(&self, query: &SearchQuery) -> AppResult<Vec<SearchCandidate>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![candidate(1, &query.title, "2000-01-01", "en", 1.0)])
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_enrich_all_caps_concurrency() {
        let provider = Arc::new(SlowProvider {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay: Duration::from_millis(20),
        });
        let enricher = ResultEnricher::new(provider.clone(), 4, DEFAULT_LOOKUP_TIMEOUT);

        let refs = (0..10).map(|i| reference(&format!("t{i}"), None, None)).collect();
        let results = enricher.enrich_all(refs).await;

        assert_eq!(results.len(), 10);
        assert!(provider.peak.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn test_lookup_timeout_is_a_miss() {
        let provider = Arc::new(SlowProvider {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay: Duration::from_millis(200),
        });
        let enricher = ResultEnricher::new(provider, 4, Duration::from_millis(10));

        let results = enricher.enrich_all(vec![reference("late", None, None)]).await;
        assert!(results.is_empty());
    }
}
