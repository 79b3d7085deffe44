use crate::core::config::Config;
use crate::core::error::{Result, StoryError};
use async_trait::async_trait;
use log::info;

pub mod openai;

#[async_trait]
pub trait TtsClient: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;

    /// Extension of the audio container `synthesize` returns.
    fn file_extension(&self) -> &str {
        "mp3"
    }
}

pub fn create_tts_client(config: &Config) -> Result<Box<dyn TtsClient>> {
    info!("Initializing TTS client for provider: {}", config.audio.provider);
    match config.audio.provider.as_str() {
        "openai" => Ok(Box::new(openai::OpenAiTtsClient::new(
            config.api_key()?,
            &config.base_url(),
            config.audio.clone(),
        ))),
        other => Err(StoryError::Configuration(format!(
            "Unknown TTS provider: {}",
            other
        ))),
    }
}
