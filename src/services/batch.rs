use crate::core::error::Result;
use crate::core::models::{path_string, StoryCard};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::future::Future;
use std::path::PathBuf;

/// Runs `job` once per card, strictly one after another. A failed card is
/// logged and recorded as `None`; the loop always covers every card and never
/// touches files written by earlier iterations.
pub async fn run_per_card<'a, F, Fut>(
    cards: &'a [StoryCard],
    label: &str,
    mut job: F,
) -> Vec<Option<PathBuf>>
where
    F: FnMut(&'a StoryCard) -> Fut,
    Fut: Future<Output = Result<PathBuf>>,
{
    let pb = ProgressBar::new(cards.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{prefix} [{bar:30}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb.set_prefix(label.to_string());

    let mut paths = Vec::with_capacity(cards.len());
    for card in cards {
        pb.set_message(format!("card {}", card.card_number));
        match job(card).await {
            Ok(path) => {
                info!("Generated {} for card {}: {}", label, card.card_number, path.display());
                paths.push(Some(path));
            }
            Err(e) => {
                warn!("Failed to generate {} for card {}: {}", label, card.card_number, e);
                paths.push(None);
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();
    paths
}

/// Copies generated paths onto the cards, position by position.
pub fn attach_paths(
    cards: &mut [StoryCard],
    paths: &[Option<PathBuf>],
    mut set: impl FnMut(&mut StoryCard, String),
) {
    for (card, path) in cards.iter_mut().zip(paths) {
        if let Some(path) = path {
            set(card, path_string(path));
        }
    }
}
