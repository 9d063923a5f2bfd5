use crate::{
    db::StoreKey,
    error::ParseError,
    models::{ContentIdentity, ContentRef, EnrichedContent, HistoryItem},
    services::{
        enricher::ResultEnricher,
        features::FeatureSpec,
        generation::{extract_json, GenerationRequest, Shape},
        session_gate::Feature,
    },
};

/// History items that feed the prompt and the fingerprint
pub const HISTORY_WINDOW: usize = 10;
const REQUESTED: usize = 8;
const MAX_KEPT: usize = 10;

/// Personalized picks from the most recent watch history
pub struct RecommendationsFeature;

fn recent(history: &[HistoryItem]) -> &[HistoryItem] {
    &history[..history.len().min(HISTORY_WINDOW)]
}

#[async_trait::async_trait]
impl FeatureSpec for RecommendationsFeature {
    type Input = Vec<HistoryItem>;
    type Parsed = Vec<ContentRef>;
    type Output = Vec<EnrichedContent>;

    const FEATURE: Feature = Feature::Recommendations;

    /// Nothing watched yet means nothing to recommend from.
    fn is_empty_input(&self, history: &Self::Input) -> bool {
        history.is_empty()
    }

    fn store_key(&self, _history: &Self::Input) -> StoreKey {
        StoreKey::Recommendations
    }

    fn identities(&self, history: &Self::Input) -> Vec<ContentIdentity> {
        recent(history).iter().map(ContentIdentity::from).collect()
    }

    fn ttl(&self) -> chrono::Duration {
        chrono::Duration::days(180)
    }

    fn request(&self, history: &Self::Input) -> GenerationRequest {
        let summary = recent(history)
            .iter()
            .map(|item| {
                let rating = item
                    .vote_average
                    .map_or_else(|| "N/A".to_string(), |r| format!("{:.1}", r));
                format!("- \"{}\" ({}, rating: {})", item.title, item.content_type, rating)
            })
            .collect::<Vec<_>>()
            .join("\n");

        let system = format!(
            "You are an expert movie and TV show recommender. Based on the user's watch \
             history, recommend {REQUESTED} diverse movies or TV shows they would love. \
             Return ONLY a JSON array with title, year and type (\"movie\" or \"tv\"). \
             Format: [{{\"title\": \"Title\", \"year\": \"2024\", \"type\": \"movie\"}}]"
        );
        let user = format!(
            "Based on my watch history, recommend {REQUESTED} movies or TV shows I would enjoy:\n\n{summary}"
        );

        GenerationRequest::prompt(system, user)
    }

    /// Keeps entries with a title, a year and a movie/tv type.
    fn parse(&self, _history: &Self::Input, text: &str) -> Result<Self::Parsed, ParseError> {
        let value = extract_json(text, Shape::Array)?;
        let items = value.as_array().map(Vec::as_slice).unwrap_or_default();

        Ok(items
            .iter()
            .filter_map(|item| ContentRef::from_value(item, None))
            .filter(|r| r.year.is_some())
            .take(MAX_KEPT)
            .collect())
    }

    async fn finish(&self, refs: Self::Parsed, enricher: &ResultEnricher) -> Self::Output {
        enricher.enrich_all(refs).await
    }
}
