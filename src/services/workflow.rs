use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::io::{session_dir, Storage, AUDIO_DIR, ILLUSTRATIONS_DIR};
use crate::core::models::{BreakdownDocument, CardRecord};
use crate::services::batch::attach_paths;
use crate::services::breakdown::BreakdownGenerator;
use crate::services::illustration::IllustrationGenerator;
use crate::services::image::ImageClient;
use crate::services::llm::LlmClient;
use crate::services::narration::NarrationGenerator;
use crate::services::story::{GeneratedStory, StoryGenerator};
use crate::services::tts::TtsClient;
use chrono::Local;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

pub const STORY_FILE: &str = "story.json";

/// Everything one pipeline run produced.
#[derive(Debug)]
pub struct SessionReport {
    pub session_dir: PathBuf,
    pub story: GeneratedStory,
    pub document: BreakdownDocument,
}

pub struct WorkflowManager {
    output_root: PathBuf,
    stories: StoryGenerator,
    breakdowns: BreakdownGenerator,
    narrations: NarrationGenerator,
    illustrations: IllustrationGenerator,
    storage: Arc<dyn Storage>,
}

impl WorkflowManager {
    pub fn new(
        config: &Config,
        llm: Arc<dyn LlmClient>,
        tts: Box<dyn TtsClient>,
        images: Box<dyn ImageClient>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        let output_root = PathBuf::from(&config.output_folder);
        Self {
            stories: StoryGenerator::new(llm.clone(), &config.llm.story_model),
            breakdowns: BreakdownGenerator::new(llm, &config.llm.breakdown_model),
            narrations: NarrationGenerator::new(tts, storage.clone(), output_root.clone()),
            illustrations: IllustrationGenerator::new(images, storage.clone(), output_root.clone()),
            output_root,
            storage,
        }
    }

    /// Story, breakdown, narration and illustration in one session
    /// directory. Story and breakdown failures abort the run; per-card media
    /// failures only leave gaps.
    pub async fn run(&self, theme: Option<&str>) -> Result<SessionReport> {
        let session = session_dir(&self.output_root, Local::now());
        info!("Starting session in {}", session.display());

        let story = self.stories.generate_story(theme).await?;
        info!("Story written ({} words, theme: {})", story.word_count, story.theme);

        let breakdown = self.breakdowns.breakdown_story(&story.story).await?;
        let mut cards = breakdown.cards().to_vec();

        let audio = self
            .narrations
            .generate_all_narrations(&cards, &session.join(AUDIO_DIR))
            .await;
        attach_paths(&mut cards, &audio, |card, path| card.audio_path = Some(path));

        let images = self
            .illustrations
            .generate_all_illustrations(&cards, &session.join(ILLUSTRATIONS_DIR))
            .await;
        attach_paths(&mut cards, &images, |card, path| {
            card.illustration_path = Some(path)
        });

        let records = cards.iter().map(CardRecord::with_media).collect();
        let mut document =
            BreakdownDocument::from_cards(breakdown.title(), breakdown.summary(), records);
        document.narrations_generated = Some(audio.iter().filter(|p| p.is_some()).count());
        document.illustrations_generated = Some(images.iter().filter(|p| p.is_some()).count());

        let story_path = session.join(STORY_FILE);
        self.storage
            .write(&story_path, document.to_json().as_bytes())
            .await?;
        info!("Session saved to {}", story_path.display());

        Ok(SessionReport {
            session_dir: session,
            story,
            document,
        })
    }
}
