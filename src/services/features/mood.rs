use serde_json::Value;

use crate::{
    db::StoreKey,
    error::ParseError,
    models::{ContentIdentity, ContentRef, ContentType, Fingerprint, MoodInput, MoodPick},
    services::{
        enricher::ResultEnricher,
        features::FeatureSpec,
        generation::{extract_json, GenerationRequest, Shape},
        hasher::ContentHasher,
        session_gate::Feature,
    },
};

/// Questionnaire entry no longer asked; old clients may still send it
const RETIRED_QUESTION: &str = "energy_level";

const SYSTEM_PROMPT: &str = "You are Theater AI, a personalized movie and TV recommendation \
    engine. Based on the user's current mood, preferences and feedback history, recommend ONE \
    single movie or TV show that matches their state of mind. Read the mood answers for \
    emotional tone, pacing and themes, not just genre. Return ONLY a JSON object with these \
    exact fields: {\"title\": \"Title\", \"year\": \"2024\", \"type\": \"movie\" or \"tv\", \
    \"description\": \"2-3 sentences on why this fits their current mood\"}. No extra text.";

/// One pick for the user's current mood, steered by past likes and dislikes
pub struct MoodRecommendationFeature;

fn question_label(id: &str) -> &str {
    match id {
        "current_mood" => "How I'm feeling right now",
        "content_type" => "Preferred content type",
        "content_preference" => "Preferred story tone/style",
        "discovery_mood" => "Discovery preference",
        other => other,
    }
}

/// `movie` asks for a film and `series` for a show; any other answer leaves
/// the type open.
pub fn desired_type(input: &MoodInput) -> Option<ContentType> {
    match input.answers.get("content_type")?.trim().to_lowercase().as_str() {
        "movie" => Some(ContentType::Movie),
        "series" => Some(ContentType::Tv),
        _ => None,
    }
}

/// Answers in key order, retired question dropped
fn answers_key(input: &MoodInput) -> String {
    input
        .answers
        .iter()
        .filter(|(id, _)| id.as_str() != RETIRED_QUESTION)
        .map(|(id, answer)| format!("{}={}", id, answer.trim()))
        .collect::<Vec<_>>()
        .join(";")
}

fn titles(input: &MoodInput, liked: bool) -> Vec<&str> {
    input
        .feedback
        .iter()
        .filter(|f| f.liked == liked)
        .map(|f| f.title.as_str())
        .collect()
}

#[async_trait::async_trait]
impl FeatureSpec for MoodRecommendationFeature {
    type Input = MoodInput;
    type Parsed = (ContentRef, String);
    type Output = MoodPick;

    const FEATURE: Feature = Feature::MoodRecommendation;

    fn store_key(&self, _input: &Self::Input) -> StoreKey {
        StoreKey::MoodRecommendation
    }

    /// One call per distinct set of answers per session.
    fn gate_scope(&self, input: &Self::Input) -> String {
        format!("{}:{}", Self::FEATURE.as_str(), answers_key(input))
    }

    fn identities(&self, input: &Self::Input) -> Vec<ContentIdentity> {
        input.feedback.iter().map(ContentIdentity::from).collect()
    }

    /// Rated titles, which of them were liked, and the answers.
    fn fingerprint(&self, input: &Self::Input) -> Fingerprint {
        let liked: Vec<ContentIdentity> = input
            .feedback
            .iter()
            .filter(|f| f.liked)
            .map(ContentIdentity::from)
            .collect();
        Fingerprint::new(format!(
            "{}|liked:{}|mood:{}",
            ContentHasher::compute(&self.identities(input)),
            ContentHasher::compute(&liked),
            answers_key(input)
        ))
    }

    fn ttl(&self) -> chrono::Duration {
        chrono::Duration::days(1)
    }

    fn request(&self, input: &Self::Input) -> GenerationRequest {
        let mut user = String::new();

        let answers: Vec<String> = input
            .answers
            .iter()
            .filter(|(id, _)| id.as_str() != RETIRED_QUESTION)
            .map(|(id, answer)| format!("- {}: {}", question_label(id), answer))
            .collect();
        if !answers.is_empty() {
            user.push_str(&format!("My current mood and preferences:\n{}\n\n", answers.join("\n")));
        }

        for (liked, heading) in [(true, "Content I previously enjoyed"), (false, "Content I didn't enjoy")] {
            let listed = titles(input, liked);
            if !listed.is_empty() {
                let lines: Vec<String> = listed.iter().map(|t| format!("- {}", t)).collect();
                user.push_str(&format!("{}:\n{}\n\n", heading, lines.join("\n")));
            }
        }

        user.push_str(
            "Based on my current mood and viewing history, recommend ONE movie or TV show that \
             would be perfect for me right now. Align its tone with my story preference and \
             overall mood; do not suggest something dark and gritty when I asked for laughs. ",
        );
        match desired_type(input) {
            Some(ContentType::Movie) => {
                user.push_str("STRICT: Recommend only a movie and set \"type\": \"movie\" in the JSON. ")
            }
            Some(ContentType::Tv) => {
                user.push_str("STRICT: Recommend only a TV series and set \"type\": \"tv\" in the JSON. ")
            }
            None => {}
        }
        user.push_str(
            "IMPORTANT: Do NOT recommend any title that appears in the liked or disliked lists above.",
        );

        GenerationRequest::prompt(SYSTEM_PROMPT, user)
    }

    /// A pick repeating a rated title is unusable. A requested type overrides
    /// whatever type the model reported.
    fn parse(&self, input: &Self::Input, text: &str) -> Result<Self::Parsed, ParseError> {
        let value = extract_json(text, Shape::Object)?;
        let desired = desired_type(input);

        let mut suggestion = ContentRef::from_value(&value, desired.or(Some(ContentType::Movie)))
            .ok_or_else(|| ParseError::Shape("pick has no usable title".to_string()))?;
        if let Some(content_type) = desired {
            suggestion.content_type = content_type;
        }

        if input
            .feedback
            .iter()
            .any(|f| f.title.trim().eq_ignore_ascii_case(&suggestion.title))
        {
            return Err(ParseError::Shape(format!(
                "pick \"{}\" was already rated",
                suggestion.title
            )));
        }

        let description = value
            .get("description")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default()
            .to_string();

        Ok((suggestion, description))
    }

    async fn finish(&self, parsed: Self::Parsed, enricher: &ResultEnricher) -> Self::Output {
        let (suggestion, description) = parsed;
        let content = enricher
            .enrich_all(vec![suggestion.clone()])
            .await
            .into_iter()
            .next()
            .map(|mut content| {
                if !description.is_empty() {
                    content.overview = Some(description.clone());
                }
                content
            });

        MoodPick {
            description,
            suggestion,
            content,
        }
    }
}
