/// Secondary search provider abstraction
///
/// The enricher resolves generated title references through a catalogue search
/// API. Providers only fetch candidates; matching and scoring live in the
/// enricher so any catalogue can be plugged in.
use crate::{
    error::AppResult,
    models::{ContentType, SearchCandidate},
};

pub mod tmdb;

pub use tmdb::TmdbProvider;

/// One catalogue lookup
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchQuery {
    pub title: String,
    pub year: Option<i32>,
    pub content_type: ContentType,
}

impl SearchQuery {
    pub fn new(title: impl Into<String>, year: Option<i32>, content_type: ContentType) -> Self {
        Self {
            title: title.into(),
            year,
            content_type,
        }
    }

    /// Same query with the year constraint dropped
    pub fn without_year(&self) -> Self {
        Self {
            year: None,
            ..self.clone()
        }
    }

    /// Stable key for memoizing results
    pub fn cache_key(&self) -> String {
        match self.year {
            Some(year) => format!("{}:{}:{}", self.content_type, self.title.to_lowercase(), year),
            None => format!("{}:{}", self.content_type, self.title.to_lowercase()),
        }
    }
}

/// Trait for catalogue search providers
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    /// Returns candidates in the provider's relevance order.
    async fn search(&self, query: &SearchQuery) -> AppResult<Vec<SearchCandidate>>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_with_and_without_year() {
        let query = SearchQuery::new("Dune", Some(2021), ContentType::Movie);
        assert_eq!(query.cache_key(), "movie:dune:2021");
        assert_eq!(query.without_year().cache_key(), "movie:dune");
    }
}
