use crate::core::config::Config;
use crate::core::error::{Result, StoryError};
use async_trait::async_trait;
use log::info;

pub mod openai;

#[async_trait]
pub trait ImageClient: Send + Sync {
    /// Generates one image for `prompt` and returns the PNG bytes.
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>>;
}

pub fn create_image_client(config: &Config) -> Result<Box<dyn ImageClient>> {
    info!("Initializing image client for provider: {}", config.image.provider);
    match config.image.provider.as_str() {
        "openai" => Ok(Box::new(openai::OpenAiImageClient::new(
            config.api_key()?,
            &config.base_url(),
            config.image.clone(),
        ))),
        other => Err(StoryError::Configuration(format!(
            "Unknown image provider: {}",
            other
        ))),
    }
}
