use serde_json::Value;
use std::collections::BTreeMap;

use crate::{
    db::StoreKey,
    error::{AppError, AppResult, ParseError},
    models::{
        ContentIdentity, ContentRef, ContentTypeSplit, MoodProfile, WatchlistInsights,
        WatchlistItem,
    },
    services::{
        enricher::ResultEnricher,
        features::{coerce_number, string_list, FeatureSpec},
        generation::{extract_json, GenerationRequest, Shape},
        session_gate::Feature,
    },
};

/// Fewest watchlist items worth analysing
pub const MIN_ITEMS: usize = 3;
/// Items that feed the prompt
const PROMPT_WINDOW: usize = 30;

/// Pattern analysis over a whole watchlist
pub struct WatchlistInsightsFeature;

fn parse_split(value: Option<&Value>) -> ContentTypeSplit {
    let Some(value) = value else {
        return ContentTypeSplit::default();
    };
    match (
        coerce_number(value.get("movies")),
        coerce_number(value.get("tvShows").or_else(|| value.get("tv_shows"))),
    ) {
        (Some(movies), Some(tv_shows)) => ContentTypeSplit { movies, tv_shows },
        (Some(movies), None) => ContentTypeSplit {
            movies,
            tv_shows: (100.0 - movies).max(0.0),
        },
        (None, Some(tv_shows)) => ContentTypeSplit {
            movies: (100.0 - tv_shows).max(0.0),
            tv_shows,
        },
        (None, None) => ContentTypeSplit::default(),
    }
}

fn parse_mood(value: Option<&Value>) -> MoodProfile {
    let Some(value) = value.filter(|v| v.is_object()) else {
        return MoodProfile::default();
    };
    let fallback = MoodProfile::default();
    let text = |field: &str| {
        value
            .get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    MoodProfile {
        dominant: text("dominant").unwrap_or(fallback.dominant),
        secondary: text("secondary").unwrap_or(fallback.secondary),
        traits: string_list(value.get("traits")),
    }
}

fn parse_decades(value: Option<&Value>) -> BTreeMap<String, f64> {
    value
        .and_then(Value::as_object)
        .map(|decades| {
            decades
                .iter()
                .filter_map(|(decade, count)| Some((decade.clone(), coerce_number(Some(count))?)))
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl FeatureSpec for WatchlistInsightsFeature {
    type Input = Vec<WatchlistItem>;
    type Parsed = (WatchlistInsights, Vec<ContentRef>);
    type Output = WatchlistInsights;

    const FEATURE: Feature = Feature::WatchlistInsights;

    fn validate(&self, items: &Self::Input) -> AppResult<()> {
        if items.len() < MIN_ITEMS {
            return Err(AppError::InvalidInput(format!(
                "watchlist insights need at least {} items, got {}",
                MIN_ITEMS,
                items.len()
            )));
        }
        Ok(())
    }

    fn store_key(&self, _items: &Self::Input) -> StoreKey {
        StoreKey::WatchlistInsights
    }

    fn identities(&self, items: &Self::Input) -> Vec<ContentIdentity> {
        items.iter().map(ContentIdentity::from).collect()
    }

    fn ttl(&self) -> chrono::Duration {
        chrono::Duration::days(180)
    }

    fn request(&self, items: &Self::Input) -> GenerationRequest {
        let summary = items
            .iter()
            .take(PROMPT_WINDOW)
            .map(|item| {
                let year = item
                    .release_year
                    .map_or_else(|| "Unknown".to_string(), |y| y.to_string());
                let rating = item
                    .vote_average
                    .map_or_else(|| "N/A".to_string(), |r| format!("{:.1}", r));
                let genres = if item.genres.is_empty() {
                    "none".to_string()
                } else {
                    item.genres.join(", ")
                };
                format!(
                    "- \"{}\" ({}, {}, rating: {}, genres: {})",
                    item.title, item.content_type, year, rating, genres
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let system = "You analyze a user's watchlist. Return ONLY a JSON object with these \
            fields: \"insights\": 3-4 short strings, \"topGenres\": genre names, \
            \"averageRating\": number, \"decadeDistribution\": {\"2010s\": count, ...}, \
            \"contentTypeSplit\": {\"movies\": percent, \"tvShows\": percent}, \
            \"moodProfile\": {\"dominant\", \"secondary\", \"traits\": [2-3 strings]}, \
            \"recommendations\": 2-3 sentences on what the user loves and might enjoy next, \
            \"recommendedTitles\": 5-7 objects {\"title\", \"type\": \"movie\" or \"tv\"}.";
        let user = format!(
            "Analyze this watchlist ({} items):\n\n{}",
            items.len(),
            summary
        );

        GenerationRequest::prompt(system, user)
    }

    fn parse(&self, _items: &Self::Input, text: &str) -> Result<Self::Parsed, ParseError> {
        let value = extract_json(text, Shape::Object)?;

        let refs = value
            .get("recommendedTitles")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| ContentRef::from_value(item, None))
                    .collect()
            })
            .unwrap_or_default();

        let insights = WatchlistInsights {
            insights: string_list(value.get("insights")),
            top_genres: string_list(value.get("topGenres")),
            average_rating: coerce_number(value.get("averageRating")).unwrap_or(0.0),
            decade_distribution: parse_decades(value.get("decadeDistribution")),
            content_type_split: parse_split(value.get("contentTypeSplit")),
            mood_profile: parse_mood(value.get("moodProfile")),
            recommendation_summary: value
                .get("recommendations")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string(),
            recommended: Vec::new(),
        };

        Ok((insights, refs))
    }

    async fn finish(&self, parsed: Self::Parsed, enricher: &ResultEnricher) -> Self::Output {
        let (mut insights, refs) = parsed;
        insights.recommended = enricher.enrich_all(refs).await;
        insights
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentType;
    use crate::services::hasher::ContentHasher;
    use serde_json::json;

    fn item(id: u64, content_type: ContentType) -> WatchlistItem {
        WatchlistItem {
            id,
            content_type,
            title: format!("Item {id}"),
            vote_average: Some(7.5),
            release_year: None,
            genres: Vec::new(),
        }
    }

    #[test]
    fn test_fewer_than_three_items_is_invalid() {
        let items = vec![item(1, ContentType::Movie), item(2, ContentType::Tv)];
        assert!(matches!(
            WatchlistInsightsFeature.validate(&items),
            Err(AppError::InvalidInput(_))
        ));
        let items = vec![
            item(1, ContentType::Movie),
            item(2, ContentType::Tv),
            item(3, ContentType::Movie),
        ];
        tokio_test::assert_ok!(WatchlistInsightsFeature.validate(&items));
    }

    #[test]
    fn test_fingerprint_covers_whole_watchlist() {
        let items: Vec<WatchlistItem> = (1..=40).map(|i| item(i, ContentType::Movie)).collect();
        let identities = WatchlistInsightsFeature.identities(&items);
        assert_eq!(identities.len(), 40);
        assert!(ContentHasher::compute(&identities).as_str().contains("40-movie"));
    }

    #[test]
    fn test_prompt_is_limited_to_thirty_items() {
        let items: Vec<WatchlistItem> = (1..=40).map(|i| item(i, ContentType::Tv)).collect();
        let request = WatchlistInsightsFeature.request(&items);
        let user = &request.messages[1].content;
        assert!(user.starts_with("Analyze this watchlist (40 items)"));
        assert_eq!(user.lines().filter(|l| l.starts_with("- ")).count(), 30);
        assert!(user.contains("- \"Item 1\" (tv, Unknown, rating: 7.5, genres: none)"));
    }

    #[test]
    fn test_missing_fields_get_defaults() {
        let (insights, refs) = WatchlistInsightsFeature
            .parse(&Vec::new(), r#"{"insights": ["Loves slow burns"]}"#)
            .unwrap();
        assert_eq!(insights.insights, vec!["Loves slow burns"]);
        assert_eq!(insights.content_type_split, ContentTypeSplit::default());
        assert_eq!(insights.mood_profile.dominant, "Varied");
        assert_eq!(insights.mood_profile.secondary, "Diverse");
        assert_eq!(insights.average_rating, 0.0);
        assert!(refs.is_empty());
    }

    #[test]
    fn test_full_payload() {
        let text = json!({
            "insights": ["A", "B"],
            "topGenres": ["Drama"],
            "averageRating": "7.8",
            "decadeDistribution": {"2010s": 4, "1990s": "2"},
            "contentTypeSplit": {"movies": 70},
            "moodProfile": {"dominant": "Dark & Intense", "traits": ["Character-driven"]},
            "recommendations": " You love moody dramas. ",
            "recommendedTitles": [{"title": "Prisoners", "type": "movie"}, {"title": "Untyped"}]
        })
        .to_string();

        let (insights, refs) = WatchlistInsightsFeature.parse(&Vec::new(), &text).unwrap();
        assert_eq!(insights.average_rating, 7.8);
        assert_eq!(insights.decade_distribution.get("1990s"), Some(&2.0));
        assert_eq!(insights.content_type_split.tv_shows, 30.0);
        assert_eq!(insights.mood_profile.secondary, "Diverse");
        assert_eq!(insights.recommendation_summary, "You love moody dramas.");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].title, "Prisoners");
    }
}
