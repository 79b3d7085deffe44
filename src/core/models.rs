use crate::core::error::{ErrorKind, Result, StoryError};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeSet;
use std::path::Path;

pub const CARD_COUNT: usize = 9;

/// One ordinal unit of a nine-part story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryCard {
    pub card_number: u32,
    pub content: String,
    pub illustration_prompt: String,
    pub spoken_narration: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub illustration_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<String>,
}

/// A complete nine-card decomposition. Only constructible through
/// [`StoryBreakdown::new`], deserialization included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBreakdown")]
pub struct StoryBreakdown {
    title: String,
    summary: String,
    cards: Vec<StoryCard>,
}

#[derive(Deserialize)]
struct RawBreakdown {
    title: String,
    summary: String,
    cards: Vec<StoryCard>,
}

impl TryFrom<RawBreakdown> for StoryBreakdown {
    type Error = StoryError;

    fn try_from(raw: RawBreakdown) -> Result<Self> {
        StoryBreakdown::new(raw.title, raw.summary, raw.cards)
    }
}

impl StoryBreakdown {
    pub fn new(title: String, summary: String, cards: Vec<StoryCard>) -> Result<Self> {
        validate_cards(&cards)?;
        Ok(Self {
            title,
            summary,
            cards,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn cards(&self) -> &[StoryCard] {
        &self.cards
    }

    pub fn into_cards(self) -> Vec<StoryCard> {
        self.cards
    }

    /// Parses a model reply that is expected to be the breakdown JSON.
    /// Text that is not JSON is a malformed response; JSON that breaks the
    /// nine-card invariant is a validation failure.
    pub fn from_model_reply(raw: &str) -> Result<Self> {
        let value: serde_json::Value = crate::utils::json::parse_model_json(raw)?;
        serde_json::from_value(value)
            .map_err(|e| StoryError::Validation(format!("Story breakdown rejected: {}", e)))
    }
}

fn validate_cards(cards: &[StoryCard]) -> Result<()> {
    if cards.len() != CARD_COUNT {
        return Err(StoryError::Validation(format!(
            "expected exactly {} cards, got {}",
            CARD_COUNT,
            cards.len()
        )));
    }
    let numbers: BTreeSet<u32> = cards.iter().map(|c| c.card_number).collect();
    let expected: BTreeSet<u32> = (1..=CARD_COUNT as u32).collect();
    if numbers != expected {
        return Err(StoryError::Validation(format!(
            "card numbers must cover 1-{} exactly once, got {:?}",
            CARD_COUNT,
            cards.iter().map(|c| c.card_number).collect::<Vec<_>>()
        )));
    }
    Ok(())
}

/// One card in the JSON handoff between breakdown, narration and
/// illustration steps.
///
/// A path is written whenever its `has_*` flag is, as `null` when the
/// media is missing. Without the flag an absent path is left out.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CardRecord {
    pub card_number: u32,
    pub content: String,
    pub illustration_prompt: String,
    pub spoken_narration: String,
    #[serde(default)]
    pub has_illustration: Option<bool>,
    #[serde(default)]
    pub illustration_path: Option<String>,
    #[serde(default)]
    pub has_audio: Option<bool>,
    #[serde(default)]
    pub audio_path: Option<String>,
}

impl Serialize for CardRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("card_number", &self.card_number)?;
        map.serialize_entry("content", &self.content)?;
        map.serialize_entry("illustration_prompt", &self.illustration_prompt)?;
        map.serialize_entry("spoken_narration", &self.spoken_narration)?;
        media_entries::<S>(
            &mut map,
            "has_illustration",
            self.has_illustration,
            "illustration_path",
            &self.illustration_path,
        )?;
        media_entries::<S>(
            &mut map,
            "has_audio",
            self.has_audio,
            "audio_path",
            &self.audio_path,
        )?;
        map.end()
    }
}

fn media_entries<S: Serializer>(
    map: &mut S::SerializeMap,
    flag_key: &'static str,
    flag: Option<bool>,
    path_key: &'static str,
    path: &Option<String>,
) -> std::result::Result<(), S::Error> {
    if let Some(flag) = flag {
        map.serialize_entry(flag_key, &flag)?;
        map.serialize_entry(path_key, path)?;
    } else if let Some(path) = path {
        map.serialize_entry(path_key, path)?;
    }
    Ok(())
}

impl CardRecord {
    pub fn plain(card: &StoryCard) -> Self {
        Self {
            card_number: card.card_number,
            content: card.content.clone(),
            illustration_prompt: card.illustration_prompt.clone(),
            spoken_narration: card.spoken_narration.clone(),
            has_illustration: None,
            illustration_path: card.illustration_path.clone(),
            has_audio: None,
            audio_path: card.audio_path.clone(),
        }
    }

    pub fn with_illustration(card: &StoryCard) -> Self {
        Self {
            has_illustration: Some(card.illustration_path.is_some()),
            audio_path: None,
            ..Self::plain(card)
        }
    }

    pub fn with_media(card: &StoryCard) -> Self {
        Self {
            has_illustration: Some(card.illustration_path.is_some()),
            has_audio: Some(card.audio_path.is_some()),
            ..Self::plain(card)
        }
    }
}

/// The JSON exchange document. Failures carry `error` and `error_kind`
/// instead of story content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownDocument {
    pub success: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(default)]
    pub total_cards: usize,
    #[serde(default)]
    pub cards: Vec<CardRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrations_generated: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub illustrations_generated: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl BreakdownDocument {
    pub fn from_cards(title: &str, summary: &str, cards: Vec<CardRecord>) -> Self {
        Self {
            success: true,
            title: title.to_string(),
            summary: summary.to_string(),
            total_cards: cards.len(),
            cards,
            narrations_generated: None,
            illustrations_generated: None,
            error: None,
            error_kind: None,
        }
    }

    pub fn from_breakdown(breakdown: &StoryBreakdown) -> Self {
        let cards = breakdown.cards().iter().map(CardRecord::plain).collect();
        Self::from_cards(breakdown.title(), breakdown.summary(), cards)
    }

    pub fn failure(error: &StoryError) -> Self {
        Self {
            success: false,
            title: String::new(),
            summary: String::new(),
            total_cards: 0,
            cards: Vec::new(),
            narrations_generated: None,
            illustrations_generated: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Parsed input to the narration and illustration steps.
#[derive(Debug, Clone)]
pub struct HandoffInput {
    pub title: String,
    pub summary: String,
    pub cards: Vec<StoryCard>,
}

#[derive(Deserialize)]
struct RawHandoff {
    #[serde(default)]
    success: bool,
    title: Option<String>,
    summary: Option<String>,
    cards: Option<Vec<StoryCard>>,
}

impl HandoffInput {
    /// Any paths already present on the cards are kept; callers clear the
    /// ones they are about to regenerate.
    pub fn parse(json: &str) -> Result<Self> {
        let raw: RawHandoff = serde_json::from_str(json)
            .map_err(|e| StoryError::Validation(format!("Invalid JSON format: {}", e)))?;
        if !raw.success {
            return Err(StoryError::Validation(
                "Invalid story breakdown data provided".to_string(),
            ));
        }
        let missing = |field: &str| StoryError::Validation(format!("missing field `{}`", field));
        Ok(Self {
            title: raw.title.ok_or_else(|| missing("title"))?,
            summary: raw.summary.ok_or_else(|| missing("summary"))?,
            cards: raw.cards.ok_or_else(|| missing("cards"))?,
        })
    }
}

pub fn path_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
