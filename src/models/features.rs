use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{ContentIdentity, ContentRef, ContentType, EnrichedContent};

// ============================================================================
// Feature inputs
// ============================================================================

/// One entry of the user's watch history, most recent first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: u64,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub title: String,
    #[serde(default)]
    pub vote_average: Option<f64>,
}

/// One entry of a watchlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistItem {
    pub id: u64,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub title: String,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub release_year: Option<i32>,
    #[serde(default)]
    pub genres: Vec<String>,
}

/// A single title to analyse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentDetails {
    pub id: u64,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub title: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub genres: Vec<String>,
}

/// A thumbs-up or thumbs-down on an earlier pick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackItem {
    pub id: u64,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub title: String,
    pub liked: bool,
}

/// Answers to the mood questionnaire plus past feedback, most recent first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoodInput {
    /// Question id to answer, e.g. `current_mood` or `content_type`
    #[serde(default)]
    pub answers: BTreeMap<String, String>,
    #[serde(default)]
    pub feedback: Vec<FeedbackItem>,
}

impl From<&HistoryItem> for ContentIdentity {
    fn from(item: &HistoryItem) -> Self {
        ContentIdentity::new(item.id, item.content_type)
    }
}

impl From<&WatchlistItem> for ContentIdentity {
    fn from(item: &WatchlistItem) -> Self {
        ContentIdentity::new(item.id, item.content_type)
    }
}

impl From<&FeedbackItem> for ContentIdentity {
    fn from(item: &FeedbackItem) -> Self {
        ContentIdentity::new(item.id, item.content_type)
    }
}

impl From<&ContentDetails> for ContentIdentity {
    fn from(details: &ContentDetails) -> Self {
        ContentIdentity::new(details.id, details.content_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

// ============================================================================
// Feature outputs
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CriticRatings {
    pub imdb: Option<f64>,
    pub rotten_tomatoes: Option<f64>,
    pub imdb_votes: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriviaCategory {
    Production,
    Cast,
    #[serde(rename = "Behind the Scenes")]
    BehindTheScenes,
    #[serde(rename = "Fun Fact")]
    FunFact,
}

impl TriviaCategory {
    pub const ALL: [TriviaCategory; 4] = [
        TriviaCategory::Production,
        TriviaCategory::Cast,
        TriviaCategory::BehindTheScenes,
        TriviaCategory::FunFact,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TriviaCategory::Production => "Production",
            TriviaCategory::Cast => "Cast",
            TriviaCategory::BehindTheScenes => "Behind the Scenes",
            TriviaCategory::FunFact => "Fun Fact",
        }
    }

    /// Case-insensitive match on the display label.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(label))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriviaItem {
    pub fact: String,
    pub category: TriviaCategory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentTag {
    pub tag: String,
    #[serde(default)]
    pub description: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentTags {
    pub thematic: Vec<ContentTag>,
    pub emotional: Vec<ContentTag>,
}

/// Everything the analysis feature produces for one title
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentAnalysis {
    pub ratings: Option<CriticRatings>,
    pub trivia: Vec<TriviaItem>,
    pub tags: Option<ContentTags>,
    pub similar: Vec<EnrichedContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentTypeSplit {
    pub movies: f64,
    pub tv_shows: f64,
}

impl Default for ContentTypeSplit {
    fn default() -> Self {
        Self {
            movies: 50.0,
            tv_shows: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodProfile {
    pub dominant: String,
    pub secondary: String,
    pub traits: Vec<String>,
}

impl Default for MoodProfile {
    fn default() -> Self {
        Self {
            dominant: "Varied".to_string(),
            secondary: "Diverse".to_string(),
            traits: Vec::new(),
        }
    }
}

/// Watchlist pattern analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchlistInsights {
    pub insights: Vec<String>,
    pub top_genres: Vec<String>,
    pub average_rating: f64,
    pub decade_distribution: BTreeMap<String, f64>,
    pub content_type_split: ContentTypeSplit,
    pub mood_profile: MoodProfile,
    pub recommendation_summary: String,
    pub recommended: Vec<EnrichedContent>,
}

/// One assistant turn of the cinema chat
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
    pub suggestions: Vec<EnrichedContent>,
}

/// The single title picked for the user's current mood
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodPick {
    /// Why the pick fits, as written by the model
    pub description: String,
    pub suggestion: ContentRef,
    /// Catalogue record, absent when the search found nothing
    pub content: Option<EnrichedContent>,
}
