use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Display;

pub mod features;

pub use features::*;

/// Kind of content a title refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Movie,
    Tv,
}

impl ContentType {
    /// Parses the loose type labels generated text tends to use.
    pub fn parse_loose(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "movie" | "film" => Some(ContentType::Movie),
            "tv" | "series" | "tv_series" | "show" => Some(ContentType::Tv),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Movie => "movie",
            ContentType::Tv => "tv",
        }
    }
}

impl Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of a piece of content, the unit fingerprints are built from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentIdentity {
    pub id: u64,
    #[serde(rename = "type")]
    pub content_type: ContentType,
}

impl ContentIdentity {
    pub fn new(id: u64, content_type: ContentType) -> Self {
        Self { id, content_type }
    }
}

/// Deterministic identity of an unordered set of content identities
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Approximate reference to a title as produced by the generation endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRef {
    pub title: String,
    pub year: Option<i32>,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    /// ISO 639-1 code of the original language, when the model supplied one
    pub language: Option<String>,
}

impl ContentRef {
    /// Builds a reference from one loosely-typed JSON object.
    ///
    /// The title must be a non-empty string. The year may be a number or a
    /// string starting with four digits. When `fallback_type` is `None` the
    /// object must carry a recognisable `type`.
    pub fn from_value(value: &Value, fallback_type: Option<ContentType>) -> Option<Self> {
        let title = value.get("title").and_then(Value::as_str)?.trim();
        if title.is_empty() {
            return None;
        }

        let content_type = match value.get("type").and_then(Value::as_str) {
            Some(label) => ContentType::parse_loose(label)?,
            None => fallback_type?,
        };

        let year = value.get("year").and_then(parse_year);

        let language = value
            .get("original_language")
            .or_else(|| value.get("language"))
            .and_then(Value::as_str)
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty());

        Some(Self {
            title: title.to_string(),
            year,
            content_type,
            language,
        })
    }
}

fn parse_year(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Value::String(s) => s.get(..4).and_then(|y| y.parse().ok()),
        _ => None,
    }
}

/// Canonical content record produced by enrichment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedContent {
    pub id: u64,
    pub title: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub overview: Option<String>,
    pub release_year: Option<i32>,
    pub vote_average: Option<f64>,
    pub original_language: Option<String>,
    pub popularity: Option<f64>,
}

/// Last computed result of a feature, persisted per feature key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalizationRecord<T> {
    pub fingerprint: Fingerprint,
    pub result: T,
    pub computed_at: DateTime<Utc>,
}

impl<T> PersonalizationRecord<T> {
    pub fn new(fingerprint: Fingerprint, result: T) -> Self {
        Self {
            fingerprint,
            result,
            computed_at: Utc::now(),
        }
    }

    /// Whether the record is older than `ttl`.
    pub fn is_past(&self, ttl: chrono::Duration) -> bool {
        Utc::now() - self.computed_at >= ttl
    }
}

// ============================================================================
// Secondary search (TMDB) API Types
// ============================================================================

/// Search response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchCandidate>,
}

/// Raw search result. Movies carry `title`/`release_date`, series carry
/// `name`/`first_air_date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub first_air_date: Option<String>,
    #[serde(default)]
    pub original_language: Option<String>,
    #[serde(default)]
    pub popularity: Option<f64>,
    #[serde(default)]
    pub vote_average: Option<f64>,
}

impl SearchCandidate {
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or_default()
    }

    pub fn release_year(&self) -> Option<i32> {
        self.release_date
            .as_deref()
            .or(self.first_air_date.as_deref())
            .and_then(|date| date.get(..4))
            .and_then(|year| year.parse().ok())
    }

    pub fn into_enriched(self, content_type: ContentType) -> EnrichedContent {
        let release_year = self.release_year();
        EnrichedContent {
            id: self.id,
            title: self.display_title().to_string(),
            content_type,
            poster_path: self.poster_path,
            backdrop_path: self.backdrop_path,
            overview: self.overview,
            release_year,
            vote_average: self.vote_average,
            original_language: self.original_language,
            popularity: self.popularity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_type_display() {
        assert_eq!(format!("{}", ContentType::Movie), "movie");
        assert_eq!(format!("{}", ContentType::Tv), "tv");
    }

    #[test]
    fn test_content_type_parse_loose() {
        assert_eq!(ContentType::parse_loose(" Movie "), Some(ContentType::Movie));
        assert_eq!(ContentType::parse_loose("series"), Some(ContentType::Tv));
        assert_eq!(ContentType::parse_loose("podcast"), None);
    }

    #[test]
    fn test_content_ref_from_value_with_string_year() {
        let value = json!({"title": "Dune", "year": "2021", "type": "movie", "original_language": "EN"});
        let content_ref = ContentRef::from_value(&value, None).unwrap();
        assert_eq!(content_ref.title, "Dune");
        assert_eq!(content_ref.year, Some(2021));
        assert_eq!(content_ref.content_type, ContentType::Movie);
        assert_eq!(content_ref.language.as_deref(), Some("en"));
    }

    #[test]
    fn test_out_of_range_year_is_absent() {
        let value = json!({"title": "Dune", "year": 1_099_511_627_776_i64, "type": "movie"});
        let content_ref = ContentRef::from_value(&value, None).unwrap();
        assert_eq!(content_ref.year, None);
    }

    #[test]
    fn test_content_ref_from_value_numeric_year_and_fallback_type() {
        let value = json!({"title": "Dark", "year": 2017});
        let content_ref = ContentRef::from_value(&value, Some(ContentType::Tv)).unwrap();
        assert_eq!(content_ref.year, Some(2017));
        assert_eq!(content_ref.content_type, ContentType::Tv);
    }

    #[test]
    fn test_content_ref_rejects_missing_title_or_unknown_type() {
        assert!(ContentRef::from_value(&json!({"year": "2020", "type": "movie"}), None).is_none());
        assert!(ContentRef::from_value(&json!({"title": "  ", "type": "movie"}), None).is_none());
        assert!(ContentRef::from_value(&json!({"title": "X", "type": "album"}), None).is_none());
        assert!(ContentRef::from_value(&json!({"title": "X"}), None).is_none());
    }

    #[test]
    fn test_search_candidate_series_fields() {
        let json = r#"{
            "id": 1399,
            "name": "Game of Thrones",
            "first_air_date": "2011-04-17",
            "original_language": "en",
            "popularity": 369.5
        }"#;

        let candidate: SearchCandidate = serde_json::from_str(json).unwrap();
        assert_eq!(candidate.display_title(), "Game of Thrones");
        assert_eq!(candidate.release_year(), Some(2011));

        let enriched = candidate.into_enriched(ContentType::Tv);
        assert_eq!(enriched.id, 1399);
        assert_eq!(enriched.release_year, Some(2011));
        assert_eq!(enriched.content_type, ContentType::Tv);
    }

    #[test]
    fn test_record_is_past() {
        let record = PersonalizationRecord::new(Fingerprint::new("1-movie"), vec![1]);
        assert!(!record.is_past(chrono::Duration::hours(1)));
        assert!(record.is_past(chrono::Duration::zero()));
    }
}
