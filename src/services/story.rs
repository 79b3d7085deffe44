use crate::core::error::Result;
use crate::services::llm::{ChatMessage, ChatRequest, LlmClient};
use log::{info, warn};
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const LEARNING_THEMES: [&str; 15] = [
    "sharing with friends",
    "being brave and courageous",
    "helping people in need",
    "being kind to animals",
    "telling the truth",
    "working hard and not giving up",
    "being respectful to elders",
    "taking care of the environment",
    "being grateful for what you have",
    "making friends and being inclusive",
    "learning from mistakes",
    "being patient and waiting your turn",
    "standing up for what's right",
    "being creative and using imagination",
    "showing empathy and understanding others",
];

const SYSTEM_PROMPT: &str =
    "You are a children's story writer who creates engaging, educational stories for kids aged 5-10.";

fn story_prompt(theme: &str) -> String {
    format!(
        "Write a short story for kids (under 200 words) that teaches about {}.\n\n\
        Requirements:\n\
        - Define the characters and their descriptions in the story.\n\
        - Use simple, easy words that children can understand\n\
        - Keep the story engaging and fun\n\
        - Include characters that kids can relate to\n\
        - Make the lesson clear but not preachy\n\
        - End with a positive message\n\
        - Use dialogue to make it more interesting\n\
        - Keep it under 200 words exactly\n\n\
        Story:",
        theme
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedStory {
    pub story: String,
    pub theme: String,
    pub word_count: usize,
}

pub struct StoryGenerator {
    llm: Arc<dyn LlmClient>,
    themes: Vec<String>,
    model: String,
}

impl StoryGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, model: &str) -> Self {
        Self {
            llm,
            themes: LEARNING_THEMES.iter().map(|t| t.to_string()).collect(),
            model: model.to_string(),
        }
    }

    /// Writes one short story. Without `custom_theme` a learning theme is
    /// drawn at random from the current theme list.
    pub async fn generate_story(&self, custom_theme: Option<&str>) -> Result<GeneratedStory> {
        let theme = match custom_theme {
            Some(theme) => theme.to_string(),
            None => self.random_theme(),
        };
        info!("Generating story about: {}", theme);

        let request = ChatRequest::new(vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(story_prompt(&theme)),
        ])
        .model(&self.model)
        .max_tokens(300)
        .temperature(0.8)
        .top_p(0.9);

        let story = self.llm.complete(request).await?.text()?;
        let word_count = story.split_whitespace().count();
        Ok(GeneratedStory {
            story,
            theme,
            word_count,
        })
    }

    fn random_theme(&self) -> String {
        self.themes
            .choose(&mut rand::rng())
            .cloned()
            .unwrap_or_else(|| LEARNING_THEMES[0].to_string())
    }

    pub fn available_themes(&self) -> &[String] {
        &self.themes
    }

    pub fn add_custom_theme(&mut self, theme: &str) {
        if !self.themes.iter().any(|t| t == theme) {
            self.themes.push(theme.to_string());
        }
    }

    /// Each story is requested independently; one failure does not stop the
    /// rest.
    pub async fn generate_multiple_stories(&self, count: usize) -> Vec<Result<GeneratedStory>> {
        let mut stories = Vec::with_capacity(count);
        for i in 0..count {
            let result = self.generate_story(None).await;
            if let Err(e) = &result {
                warn!("Story {} of {} failed: {}", i + 1, count, e);
            }
            stories.push(result);
        }
        stories
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{ErrorKind, StoryError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct MockLlm {
        replies: Mutex<Vec<Result<String>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl MockLlm {
        fn with_replies(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmClient for MockLlm {
        async fn complete(&self, request: ChatRequest) -> Result<ChatMessage> {
            self.requests.lock().unwrap().push(request);
            let reply = self.replies.lock().unwrap().remove(0)?;
            Ok(ChatMessage::assistant(reply))
        }
    }

    #[tokio::test]
    async fn test_custom_theme_and_request_shape() {
        let llm = Arc::new(MockLlm::with_replies(vec![Ok(
            "  Mia shared her kite with Leo.  ".to_string()
        )]));
        let generator = StoryGenerator::new(llm.clone(), "gpt-3.5-turbo");

        let story = generator.generate_story(Some("sharing toys")).await.unwrap();

        assert_eq!(story.theme, "sharing toys");
        assert_eq!(story.story, "Mia shared her kite with Leo.");
        assert_eq!(story.word_count, 6);

        let requests = llm.requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.model.as_deref(), Some("gpt-3.5-turbo"));
        assert_eq!(request.max_tokens, Some(300));
        assert_eq!(request.temperature, Some(0.8));
        assert_eq!(request.top_p, Some(0.9));
        let user = request.messages[1].content.as_deref().unwrap();
        assert!(user.contains("teaches about sharing toys."));
    }

    #[tokio::test]
    async fn test_random_theme_comes_from_list() {
        let llm = Arc::new(MockLlm::with_replies(vec![Ok("A story.".to_string())]));
        let generator = StoryGenerator::new(llm, "m");
        let story = generator.generate_story(None).await.unwrap();
        assert!(LEARNING_THEMES.contains(&story.theme.as_str()));
    }

    #[test]
    fn test_add_custom_theme_deduplicates() {
        let mut generator = StoryGenerator::new(Arc::new(MockLlm::default()), "m");
        assert_eq!(generator.available_themes().len(), 15);
        generator.add_custom_theme("cleaning up after yourself");
        generator.add_custom_theme("cleaning up after yourself");
        generator.add_custom_theme("telling the truth");
        assert_eq!(generator.available_themes().len(), 16);
    }

    #[tokio::test]
    async fn test_multiple_stories_keep_going_after_failure() {
        let llm = Arc::new(MockLlm::with_replies(vec![
            Ok("One.".to_string()),
            Err(StoryError::Api {
                service: "mock",
                status: 401,
                body: "bad key".into(),
            }),
            Ok("Three.".to_string()),
        ]));
        let generator = StoryGenerator::new(llm, "m");
        let stories = generator.generate_multiple_stories(3).await;
        assert_eq!(stories.len(), 3);
        assert!(stories[0].is_ok());
        assert_eq!(stories[1].as_ref().unwrap_err().kind(), ErrorKind::Api);
        assert_eq!(stories[2].as_ref().unwrap().story, "Three.");
    }
}
