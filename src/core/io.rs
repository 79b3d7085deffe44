use crate::core::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const AUDIO_DIR: &str = "audio";
pub const ILLUSTRATIONS_DIR: &str = "illustrations";
pub const UPLOAD_PREFIX: &str = "comic-";
pub const UPLOAD_EXTENSIONS: [&str; 2] = ["pdf", "txt"];

#[async_trait]
pub trait Storage: Send + Sync {
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;
    /// Writes `content`, creating missing parent directories.
    async fn write(&self, path: &Path, content: &[u8]) -> Result<()>;
    async fn exists(&self, path: &Path) -> Result<bool>;
    async fn list(&self, dir: &Path) -> Result<Vec<PathBuf>>;
    /// Creation time, or modification time where the filesystem has no
    /// birth time.
    async fn created(&self, path: &Path) -> Result<SystemTime>;
}

pub struct NativeStorage;

impl NativeStorage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NativeStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for NativeStorage {
    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(path).await?)
    }

    async fn write(&self, path: &Path, content: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn list(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        if !tokio::fs::try_exists(dir).await? {
            return Ok(entries);
        }
        let mut read_dir = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            entries.push(entry.path());
        }
        entries.sort();
        Ok(entries)
    }

    async fn created(&self, path: &Path) -> Result<SystemTime> {
        let meta = tokio::fs::metadata(path).await?;
        Ok(meta.created().or_else(|_| meta.modified())?)
    }
}

/// `<root>/<YYYYMMDD_HHMMSS>`. Two calls within the same second collide.
pub fn session_dir(root: &Path, now: DateTime<Local>) -> PathBuf {
    root.join(now.format("%Y%m%d_%H%M%S").to_string())
}

pub fn card_audio_file(card_number: u32, extension: &str) -> String {
    format!("card_{:02}_narration.{}", card_number, extension)
}

pub fn card_image_file(card_number: u32) -> String {
    format!("card_{:02}.png", card_number)
}

pub fn is_comic_upload(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let has_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| UPLOAD_EXTENSIONS.contains(&e));
    name.starts_with(UPLOAD_PREFIX) && has_ext
}

/// Picks the candidate with the greatest creation time. Ties keep the
/// first candidate seen.
pub fn most_recent(candidates: Vec<(PathBuf, SystemTime)>) -> Option<PathBuf> {
    let mut best: Option<(PathBuf, SystemTime)> = None;
    for (path, created) in candidates {
        match &best {
            Some((_, best_time)) if created <= *best_time => {}
            _ => best = Some((path, created)),
        }
    }
    best.map(|(path, _)| path)
}

pub async fn find_latest_upload(storage: &dyn Storage, dir: &Path) -> Result<Option<PathBuf>> {
    let mut candidates = Vec::new();
    for path in storage.list(dir).await? {
        if is_comic_upload(&path) {
            let created = storage.created(&path).await?;
            candidates.push((path, created));
        }
    }
    Ok(most_recent(candidates))
}
