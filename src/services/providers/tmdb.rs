/// TMDB search provider
///
/// Endpoints:
/// - Movies: `GET /search/movie?query=..&year=..`
/// - Series: `GET /search/tv?query=..&first_air_date_year=..`
///
/// Results are memoized in the in-process cache for an hour.
use reqwest::Client as HttpClient;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    db::TieredCache,
    error::{AppError, AppResult},
    memoized,
    models::{ContentType, SearchCandidate, SearchResponse},
    services::providers::{SearchProvider, SearchQuery},
};

const SEARCH_NAMESPACE: &str = "search";
const SEARCH_CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Clone)]
pub struct TmdbProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    cache: Arc<TieredCache>,
}

impl TmdbProvider {
    pub fn new(
        cache: Arc<TieredCache>,
        api_key: String,
        api_url: String,
        timeout: Duration,
    ) -> AppResult<Self> {
        Ok(Self {
            http_client: HttpClient::builder().timeout(timeout).build()?,
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            cache,
        })
    }

    async fn fetch(&self, query: &SearchQuery) -> AppResult<Vec<SearchCandidate>> {
        let (segment, year_param) = match query.content_type {
            ContentType::Movie => ("movie", "year"),
            ContentType::Tv => ("tv", "first_air_date_year"),
        };
        let url = format!("{}/search/{}", self.api_url, segment);

        let mut params = vec![
            ("api_key", self.api_key.clone()),
            ("query", query.title.clone()),
        ];
        if let Some(year) = query.year {
            params.push((year_param, year.to_string()));
        }

        let response = self
            .http_client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(AppError::from_transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::from_status(status, body));
        }

        let search: SearchResponse = response.json().await.map_err(AppError::from_transport)?;

        tracing::debug!(
            query = %query.title,
            year = ?query.year,
            content_type = %query.content_type,
            result_count = search.results.len(),
            "Catalogue search completed"
        );

        Ok(search.results)
    }
}

#[async_trait::async_trait]
impl SearchProvider for TmdbProvider {
    async fn search(&self, query: &SearchQuery) -> AppResult<Vec<SearchCandidate>> {
        if self.api_key.trim().is_empty() {
            return Err(AppError::Config("No search API key configured".to_string()));
        }

        memoized!(
            self.cache,
            SEARCH_NAMESPACE,
            query.cache_key(),
            SEARCH_CACHE_TTL,
            self.fetch(query)
        )
    }

    fn name(&self) -> &'static str {
        "tmdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, routing::get, Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_tv_search_uses_first_air_date_year_and_is_memoized() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/search/tv",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(params.get("first_air_date_year").map(String::as_str), Some("2017"));
                    assert_eq!(params.get("api_key").map(String::as_str), Some("k"));
                    Json(json!({
                        "results": [{"id": 70523, "name": "Dark", "first_air_date": "2017-12-01", "original_language": "de"}]
                    }))
                }
            }),
        );
        let url = serve(router).await;
        let provider = TmdbProvider::new(
            Arc::new(TieredCache::default()),
            "k".to_string(),
            url,
            Duration::from_secs(5),
        )
        .unwrap();

        let query = SearchQuery::new("dark", Some(2017), ContentType::Tv);
        let first = provider.search(&query).await.unwrap();
        let second = provider.search(&query).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first[0].display_title(), "Dark");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_blank_key_is_config_error() {
        let provider = TmdbProvider::new(
            Arc::new(TieredCache::default()),
            String::new(),
            "http://127.0.0.1:9".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        let result = provider
            .search(&SearchQuery::new("x", None, ContentType::Movie))
            .await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_stalled_search_times_out_as_transient() {
        let router = Router::new().route(
            "/search/movie",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Json(json!({"results": []}))
            }),
        );
        let url = serve(router).await;
        let provider = TmdbProvider::new(
            Arc::new(TieredCache::default()),
            "k".to_string(),
            url,
            Duration::from_millis(50),
        )
        .unwrap();

        let result = provider
            .search(&SearchQuery::new("heat", Some(1995), ContentType::Movie))
            .await;
        assert!(matches!(result, Err(AppError::TransientNetwork(_))));
    }
}
