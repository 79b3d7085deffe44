use crate::core::error::Result;
use crate::core::io::{card_image_file, session_dir, Storage, ILLUSTRATIONS_DIR};
use crate::core::models::{BreakdownDocument, CardRecord, HandoffInput, StoryBreakdown, StoryCard};
use crate::services::batch::{attach_paths, run_per_card};
use crate::services::image::ImageClient;
use chrono::Local;
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct IllustrationGenerator {
    images: Box<dyn ImageClient>,
    storage: Arc<dyn Storage>,
    output_root: PathBuf,
}

impl IllustrationGenerator {
    pub fn new(images: Box<dyn ImageClient>, storage: Arc<dyn Storage>, output_root: PathBuf) -> Self {
        Self {
            images,
            storage,
            output_root,
        }
    }

    pub async fn generate_illustration(&self, prompt: &str, output_path: &Path) -> Result<PathBuf> {
        let image = self.images.generate(prompt).await?;
        self.storage.write(output_path, &image).await?;
        info!("Illustration saved as {}", output_path.display());
        Ok(output_path.to_path_buf())
    }

    pub async fn generate_all_illustrations(
        &self,
        cards: &[StoryCard],
        output_dir: &Path,
    ) -> Vec<Option<PathBuf>> {
        run_per_card(cards, "illustration", |card| {
            let path = output_dir.join(card_image_file(card.card_number));
            async move {
                self.generate_illustration(&card.illustration_prompt, &path)
                    .await
            }
        })
        .await
    }

    /// Illustrates a handoff document. Unlike narration this step insists on
    /// a full nine-card breakdown.
    pub async fn illustrate_json(
        &self,
        json: &str,
        output_dir: Option<&Path>,
    ) -> Result<BreakdownDocument> {
        let input = HandoffInput::parse(json)?;
        let breakdown = StoryBreakdown::new(input.title, input.summary, input.cards)?;
        let output_dir = match output_dir {
            Some(dir) => dir.to_path_buf(),
            None => session_dir(&self.output_root, Local::now()).join(ILLUSTRATIONS_DIR),
        };

        let mut cards = breakdown.cards().to_vec();
        for card in cards.iter_mut() {
            card.illustration_path = None;
        }

        let paths = self.generate_all_illustrations(&cards, &output_dir).await;
        attach_paths(&mut cards, &paths, |card, path| {
            card.illustration_path = Some(path)
        });

        let records = cards.iter().map(CardRecord::with_illustration).collect();
        let mut doc = BreakdownDocument::from_cards(breakdown.title(), breakdown.summary(), records);
        doc.illustrations_generated = Some(paths.iter().filter(|p| p.is_some()).count());
        Ok(doc)
    }
}
