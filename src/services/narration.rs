use crate::core::error::Result;
use crate::core::io::{card_audio_file, session_dir, Storage, AUDIO_DIR};
use crate::core::models::{BreakdownDocument, CardRecord, HandoffInput, StoryCard};
use crate::services::batch::{attach_paths, run_per_card};
use crate::services::tts::TtsClient;
use chrono::Local;
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct NarrationGenerator {
    tts: Box<dyn TtsClient>,
    storage: Arc<dyn Storage>,
    output_root: PathBuf,
}

impl NarrationGenerator {
    pub fn new(tts: Box<dyn TtsClient>, storage: Arc<dyn Storage>, output_root: PathBuf) -> Self {
        Self {
            tts,
            storage,
            output_root,
        }
    }

    pub async fn generate_narration(&self, text: &str, output_path: &Path) -> Result<PathBuf> {
        let audio = self.tts.synthesize(text).await?;
        self.storage.write(output_path, &audio).await?;
        info!("Audio saved as {}", output_path.display());
        Ok(output_path.to_path_buf())
    }

    /// One `card_NN_narration.<ext>` per card, in card order. Failed cards
    /// come back as `None`.
    pub async fn generate_all_narrations(
        &self,
        cards: &[StoryCard],
        output_dir: &Path,
    ) -> Vec<Option<PathBuf>> {
        let extension = self.tts.file_extension().to_string();
        run_per_card(cards, "narration", |card| {
            let path = output_dir.join(card_audio_file(card.card_number, &extension));
            async move { self.generate_narration(&card.spoken_narration, &path).await }
        })
        .await
    }

    /// Narrates every card of a handoff document. Any number of cards is
    /// accepted here; existing illustration paths are carried through.
    pub async fn narrate_json(
        &self,
        json: &str,
        output_dir: Option<&Path>,
    ) -> Result<BreakdownDocument> {
        let input = HandoffInput::parse(json)?;
        let output_dir = match output_dir {
            Some(dir) => dir.to_path_buf(),
            None => session_dir(&self.output_root, Local::now()).join(AUDIO_DIR),
        };

        let mut cards = input.cards;
        for card in cards.iter_mut() {
            card.audio_path = None;
        }

        let paths = self.generate_all_narrations(&cards, &output_dir).await;
        attach_paths(&mut cards, &paths, |card, path| card.audio_path = Some(path));

        let records = cards.iter().map(CardRecord::with_media).collect();
        let mut doc = BreakdownDocument::from_cards(&input.title, &input.summary, records);
        doc.narrations_generated = Some(paths.iter().filter(|p| p.is_some()).count());
        Ok(doc)
    }
}
