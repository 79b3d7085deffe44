use crate::core::config::AudioConfig;
use crate::core::error::{Result, StoryError};
use crate::services::tts::TtsClient;
use async_trait::async_trait;
use log::debug;
use serde::Serialize;

pub struct OpenAiTtsClient {
    api_key: String,
    base_url: String,
    config: AudioConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

impl OpenAiTtsClient {
    pub fn new(api_key: &str, base_url: &str, config: AudioConfig) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl TtsClient for OpenAiTtsClient {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let url = format!("{}/audio/speech", self.base_url);
        debug!(
            "Synthesizing {} chars with {}/{}",
            text.chars().count(),
            self.config.model,
            self.config.voice
        );

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&SpeechRequest {
                model: &self.config.model,
                voice: &self.config.voice,
                input: text,
                response_format: &self.config.response_format,
            })
            .send()
            .await
            .map_err(|e| StoryError::network(&url, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoryError::Api {
                service: "OpenAI TTS",
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await.map_err(|e| StoryError::network(&url, e))?;
        if bytes.is_empty() {
            return Err(StoryError::MalformedResponse(
                "TTS response contained no audio".to_string(),
            ));
        }
        Ok(bytes.to_vec())
    }

    fn file_extension(&self) -> &str {
        &self.config.response_format
    }
}
