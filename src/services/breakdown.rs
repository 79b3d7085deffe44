use crate::core::error::Result;
use crate::core::models::{StoryBreakdown, CARD_COUNT};
use crate::services::llm::{ChatMessage, ChatRequest, LlmClient};
use log::info;
use std::sync::Arc;

pub const SYSTEM_PROMPT: &str = r#"You are a children's story expert who specializes in breaking down stories into 9 illustrated story cards.

For each story card, you must provide:
1. Content: 1-2 sentences that tell part of the story
2. Illustration Prompt: Detailed description for creating a visual illustration based on the content
3. Spoken Narration: Narration script optimized for reading aloud to children

Guidelines:
- Define the characters and their descriptions in the story illustration prompt.
- Make the story engaging and age-appropriate for children
- Each card should advance the plot naturally
- Illustration prompts should be vivid and descriptive with at max 1 chat bubble
- Spoken narration should flow smoothly when read aloud
- Maintain consistency in characters and setting
- Ensure the story has a clear beginning, middle, and end across all 9 cards

The story should be broken into these 9 parts:
1. Introduction/Setting (Cards 1-2)
2. Rising Action/Problem (Cards 3-4)
3. Climax/Adventure (Cards 5-6)
4. Resolution (Cards 7-8)
5. Conclusion (Card 9)

IMPORTANT: Return the response as a JSON object with this EXACT structure:
{
  "title": "Story Title",
  "summary": "Brief story summary",
  "cards": [
    {
      "card_number": 1,
      "content": "Story content for card 1",
      "illustration_prompt": "Illustration description for card 1",
      "spoken_narration": "Narration for card 1"
    },
    ... (continue for all 9 cards)
  ]
}

Do NOT wrap the response in any additional object or array."#;

fn user_prompt(summary: &str) -> String {
    format!(
        "Please break down this story into {} illustrated story cards:\n\n\
        Story Summary: {}\n\n\
        Create engaging, child-friendly content with vivid illustration prompts and smooth narration for each card.",
        CARD_COUNT, summary
    )
}

pub struct BreakdownGenerator {
    llm: Arc<dyn LlmClient>,
    model: String,
}

impl BreakdownGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, model: &str) -> Self {
        Self {
            llm,
            model: model.to_string(),
        }
    }

    /// Asks the model for a nine-card breakdown. Replies that are not JSON,
    /// or that do not hold exactly nine cards, are errors; nothing is padded.
    pub async fn breakdown_story(&self, summary: &str) -> Result<StoryBreakdown> {
        let request = ChatRequest::new(vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(user_prompt(summary.trim())),
        ])
        .model(&self.model)
        .json_mode()
        .temperature(0.7)
        .max_tokens(4000);

        let reply = self.llm.complete(request).await?.text()?;
        let breakdown = StoryBreakdown::from_model_reply(&reply)?;
        info!("Story broken down: {}", breakdown.title());
        Ok(breakdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::models::fixtures::{card, nine_cards};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct MockLlm {
        reply: String,
        last: Mutex<Option<ChatRequest>>,
    }

    impl MockLlm {
        fn new(reply: impl Into<String>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.into(),
                last: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl LlmClient for MockLlm {
        async fn complete(&self, request: ChatRequest) -> Result<ChatMessage> {
            *self.last.lock().unwrap() = Some(request);
            Ok(ChatMessage::assistant(self.reply.clone()))
        }
    }

    #[tokio::test]
    async fn test_breakdown_parses_nine_cards() {
        let reply = json!({"title": "Pip's Kite", "summary": "Pip shares", "cards": nine_cards()});
        let llm = MockLlm::new(reply.to_string());
        let generator = BreakdownGenerator::new(llm.clone(), "gpt-4o");

        let breakdown = generator.breakdown_story("  Pip the mouse  ").await.unwrap();
        assert_eq!(breakdown.title(), "Pip's Kite");
        assert_eq!(breakdown.cards()[8].card_number, 9);

        let last = llm.last.lock().unwrap();
        let request = last.as_ref().unwrap();
        assert!(request.json_mode);
        assert_eq!(request.model.as_deref(), Some("gpt-4o"));
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.max_tokens, Some(4000));
        assert!(request.messages[1]
            .content
            .as_deref()
            .unwrap()
            .contains("Story Summary: Pip the mouse\n"));
    }

    #[tokio::test]
    async fn test_missing_cards_rejected() {
        let llm = MockLlm::new(r#"{"title": "T", "summary": "S"}"#);
        let err = BreakdownGenerator::new(llm, "gpt-4o")
            .breakdown_story("story")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_short_breakdown_not_padded() {
        let cards: Vec<_> = (1..=7).map(card).collect();
        let llm = MockLlm::new(json!({"title": "T", "summary": "S", "cards": cards}).to_string());
        let err = BreakdownGenerator::new(llm, "gpt-4o")
            .breakdown_story("story")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("expected exactly 9 cards, got 7"));
    }

    #[tokio::test]
    async fn test_prose_reply_is_malformed() {
        let llm = MockLlm::new("Sorry, I can't help with that.");
        let err = BreakdownGenerator::new(llm, "gpt-4o")
            .breakdown_story("story")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    }
}
