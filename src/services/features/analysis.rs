use rand::seq::SliceRandom;
use serde_json::Value;

use crate::{
    db::StoreKey,
    error::ParseError,
    models::{
        ContentAnalysis, ContentDetails, ContentIdentity, ContentRef, ContentTag, ContentTags,
        CriticRatings, TriviaCategory, TriviaItem,
    },
    services::{
        enricher::ResultEnricher,
        features::{coerce_number, FeatureSpec},
        generation::{extract_json, GenerationRequest, Shape},
        session_gate::Feature,
    },
};

const OVERVIEW_LIMIT: usize = 500;
const DEFAULT_TAG_CONFIDENCE: f64 = 0.8;
const MAX_SIMILAR: usize = 5;

/// Ratings, trivia, tags and similar titles for one title
pub struct ContentAnalysisFeature;

/// Parsed analysis before similar titles are resolved
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisDraft {
    pub ratings: Option<CriticRatings>,
    pub trivia: Vec<TriviaItem>,
    pub tags: Option<ContentTags>,
    pub similar: Vec<ContentRef>,
}

/// Coerces loose rating values. An IMDb score above 10 is read as a
/// percentage and scaled to one decimal.
pub fn parse_ratings(value: &Value) -> Option<CriticRatings> {
    let imdb = coerce_number(value.get("imdb")).map(|score| {
        if score > 10.0 {
            score.round() / 10.0
        } else {
            score
        }
    });
    let ratings = CriticRatings {
        imdb,
        rotten_tomatoes: coerce_number(value.get("rotten_tomatoes")),
        imdb_votes: coerce_number(value.get("imdb_votes")),
    };

    let any = ratings.imdb.is_some()
        || ratings.rotten_tomatoes.is_some()
        || ratings.imdb_votes.is_some();
    any.then_some(ratings)
}

fn random_category() -> TriviaCategory {
    TriviaCategory::ALL
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(TriviaCategory::FunFact)
}

/// Accepts plain strings or `{fact, category}` objects.
pub fn parse_trivia(value: Option<&Value>) -> Vec<TriviaItem> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(fact) => Some((fact.trim().to_string(), None)),
            Value::Object(_) => item.get("fact").and_then(Value::as_str).map(|fact| {
                let category = item
                    .get("category")
                    .and_then(Value::as_str)
                    .and_then(TriviaCategory::from_label);
                (fact.trim().to_string(), category)
            }),
            _ => None,
        })
        .filter(|(fact, _)| !fact.is_empty())
        .map(|(fact, category)| TriviaItem {
            fact,
            category: category.unwrap_or_else(random_category),
        })
        .collect()
}

fn parse_tag_list(value: Option<&Value>) -> Vec<ContentTag> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(tag) => Some(ContentTag {
                tag: tag.trim().to_string(),
                description: String::new(),
                confidence: DEFAULT_TAG_CONFIDENCE,
            }),
            Value::Object(_) => {
                let tag = item.get("tag").and_then(Value::as_str)?.trim().to_string();
                Some(ContentTag {
                    tag,
                    description: item
                        .get("description")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    confidence: coerce_number(item.get("confidence"))
                        .map(|c| c.clamp(0.0, 1.0))
                        .unwrap_or(DEFAULT_TAG_CONFIDENCE),
                })
            }
            _ => None,
        })
        .filter(|tag| !tag.tag.is_empty())
        .collect()
}

/// Reads `thematicTags`/`emotionalTags`, falling back to `thematic`/`emotional`.
pub fn parse_tags(value: &Value) -> Option<ContentTags> {
    let thematic = parse_tag_list(value.get("thematicTags").or_else(|| value.get("thematic")));
    let emotional = parse_tag_list(value.get("emotionalTags").or_else(|| value.get("emotional")));

    if thematic.is_empty() && emotional.is_empty() {
        None
    } else {
        Some(ContentTags { thematic, emotional })
    }
}

#[async_trait::async_trait]
impl FeatureSpec for ContentAnalysisFeature {
    type Input = ContentDetails;
    type Parsed = AnalysisDraft;
    type Output = ContentAnalysis;

    const FEATURE: Feature = Feature::ContentAnalysis;

    fn store_key(&self, details: &Self::Input) -> StoreKey {
        StoreKey::ContentAnalysis(details.content_type, details.id)
    }

    fn gate_scope(&self, details: &Self::Input) -> String {
        Self::FEATURE.scope_for(&ContentIdentity::from(details))
    }

    fn identities(&self, details: &Self::Input) -> Vec<ContentIdentity> {
        vec![ContentIdentity::from(details)]
    }

    fn ttl(&self) -> chrono::Duration {
        chrono::Duration::days(180)
    }

    fn request(&self, details: &Self::Input) -> GenerationRequest {
        let year = details.year.map(|y| format!(" ({})", y)).unwrap_or_default();
        let overview: String = details.overview.chars().take(OVERVIEW_LIMIT).collect();
        let genres = if details.genres.is_empty() {
            "unknown".to_string()
        } else {
            details.genres.join(", ")
        };

        let system = "You are a film and television analyst. Return ONLY a JSON object with \
            these fields: \"ratings\": {\"imdb\": 0-10 or null, \"rotten_tomatoes\": 0-100 or null, \
            \"imdb_votes\": integer or null}, \"trivia\": up to 5 objects {\"fact\", \"category\"} \
            with category one of Production, Cast, Behind the Scenes, Fun Fact, \
            \"thematicTags\" and \"emotionalTags\": 3-5 objects {\"tag\", \"description\", \
            \"confidence\" 0.0-1.0}, \"similar\": up to 5 objects {\"title\", \"year\"} of the \
            most similar titles by story. Use null for unknown values.";
        let user = format!(
            "Analyze this {}:\n\nTitle: {}{}\nGenres: {}\nOverview: {}",
            details.content_type, details.title, year, genres, overview
        );

        GenerationRequest::prompt(system, user)
    }

    fn parse(&self, details: &Self::Input, text: &str) -> Result<Self::Parsed, ParseError> {
        let value = extract_json(text, Shape::Object)?;

        let similar = value
            .get("similar")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| ContentRef::from_value(item, Some(details.content_type)))
                    .filter(|r| {
                        !(r.title.eq_ignore_ascii_case(&details.title) && r.year == details.year)
                    })
                    .take(MAX_SIMILAR)
                    .collect()
            })
            .unwrap_or_default();

        Ok(AnalysisDraft {
            ratings: value.get("ratings").and_then(parse_ratings),
            trivia: parse_trivia(value.get("trivia")),
            tags: parse_tags(&value),
            similar,
        })
    }

    async fn finish(&self, draft: Self::Parsed, enricher: &ResultEnricher) -> Self::Output {
        ContentAnalysis {
            ratings: draft.ratings,
            trivia: draft.trivia,
            tags: draft.tags,
            similar: enricher.enrich_all(draft.similar).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentType;
    use serde_json::json;

    fn details() -> ContentDetails {
        ContentDetails {
            id: 27205,
            content_type: ContentType::Movie,
            title: "Inception".to_string(),
            year: Some(2010),
            overview: "x".repeat(800),
            genres: vec!["Science Fiction".to_string()],
        }
    }

    #[test]
    fn test_imdb_percentage_is_scaled() {
        let ratings = parse_ratings(&json!({"imdb": 88, "rotten_tomatoes": "87", "imdb_votes": null})).unwrap();
        assert_eq!(ratings.imdb, Some(8.8));
        assert_eq!(ratings.rotten_tomatoes, Some(87.0));
        assert_eq!(ratings.imdb_votes, None);
    }

    #[test]
    fn test_all_null_ratings_are_absent() {
        assert_eq!(parse_ratings(&json!({"imdb": null, "rotten_tomatoes": "n/a"})), None);
    }

    #[test]
    fn test_string_trivia_gets_a_category() {
        let trivia = parse_trivia(Some(&json!([
            "Shot in six countries.",
            {"fact": "The score uses a slowed Piaf song.", "category": "behind the scenes"},
            42
        ])));
        assert_eq!(trivia.len(), 2);
        assert!(TriviaCategory::ALL.contains(&trivia[0].category));
        assert_eq!(trivia[1].category, TriviaCategory::BehindTheScenes);
    }

    #[test]
    fn test_string_tags_get_default_confidence() {
        let tags = parse_tags(&json!({
            "thematicTags": ["Dream Logic", {"tag": "Grief", "description": "Loss", "confidence": 0.95}],
            "emotionalTags": [{"tag": "Tense"}]
        }))
        .unwrap();
        assert_eq!(tags.thematic[0].confidence, DEFAULT_TAG_CONFIDENCE);
        assert_eq!(tags.thematic[1].confidence, 0.95);
        assert_eq!(tags.emotional[0].confidence, DEFAULT_TAG_CONFIDENCE);
    }

    #[test]
    fn test_overview_is_truncated_in_prompt() {
        let request = ContentAnalysisFeature.request(&details());
        let user = &request.messages[1].content;
        assert!(user.contains("Inception (2010)"));
        assert!(!user.contains(&"x".repeat(501)));
        assert!(user.contains(&"x".repeat(500)));
    }

    #[test]
    fn test_parse_full_analysis() {
        let text = r#"```json
        {
          "ratings": {"imdb": "8.8", "rotten_tomatoes": 87, "imdb_votes": 2500000},
          "trivia": ["Built a rotating hallway."],
          "thematicTags": [{"tag": "Dream Logic", "description": "Layers", "confidence": 0.9}],
          "emotionalTags": [],
          "similar": [{"title": "Inception", "year": "2010"}, {"title": "Paprika", "year": "2006"}]
        }
        ```"#;
        let draft = ContentAnalysisFeature.parse(&details(), text).unwrap();

        assert_eq!(draft.ratings.unwrap().imdb, Some(8.8));
        assert_eq!(draft.trivia.len(), 1);
        assert_eq!(draft.tags.unwrap().thematic.len(), 1);
        // The analysed title itself is dropped; the rest inherit its type
        assert_eq!(draft.similar.len(), 1);
        assert_eq!(draft.similar[0].title, "Paprika");
        assert_eq!(draft.similar[0].content_type, ContentType::Movie);
    }

    #[test]
    fn test_scope_is_per_title() {
        assert_eq!(ContentAnalysisFeature.gate_scope(&details()), "content_analysis:movie:27205");
        assert_eq!(
            ContentAnalysisFeature.store_key(&details()).to_string(),
            "analysis:movie:27205"
        );
    }
}
