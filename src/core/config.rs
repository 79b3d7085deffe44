use crate::core::error::{Result, StoryError};
use crate::utils::json::FallbackPolicy;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const OPENAI_VOICES: [&str; 6] = ["alloy", "echo", "fable", "onyx", "nova", "shimmer"];

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_output")]
    pub output_folder: String,

    #[serde(default = "default_uploads")]
    pub uploads_folder: String,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub image: ImageConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    #[serde(default = "default_story_model")]
    pub story_model: String,
    #[serde(default = "default_breakdown_model")]
    pub breakdown_model: String,
    #[serde(default = "default_agent_model")]
    pub agent_model: String,
    #[serde(default)]
    pub retry_count: usize,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,
    #[serde(default)]
    pub on_malformed_response: FallbackPolicy,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AudioConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_tts_model")]
    pub model: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_audio_format")]
    pub response_format: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ImageConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_image_model")]
    pub model: String,
    #[serde(default = "default_image_size")]
    pub size: String,
    #[serde(default = "default_image_quality")]
    pub quality: String,
    #[serde(default = "default_style_prefix")]
    pub style_prefix: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Characters of comic text handed to the extraction prompt.
    #[serde(default = "default_content_limit")]
    pub content_limit: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_output() -> String {
    "output".to_string()
}
fn default_uploads() -> String {
    "uploads".to_string()
}
fn default_provider() -> String {
    "openai".to_string()
}
fn default_story_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_breakdown_model() -> String {
    "gpt-4o".to_string()
}
fn default_agent_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_retry_delay() -> u64 {
    10
}
fn default_tts_model() -> String {
    "tts-1".to_string()
}
fn default_voice() -> String {
    "alloy".to_string()
}
fn default_audio_format() -> String {
    "mp3".to_string()
}
fn default_image_model() -> String {
    "dall-e-3".to_string()
}
fn default_image_size() -> String {
    "1024x1024".to_string()
}
fn default_image_quality() -> String {
    "standard".to_string()
}
fn default_style_prefix() -> String {
    "You are a children's story expert who specializes in creating animated kids friendly illustrations for story cards.".to_string()
}
fn default_max_steps() -> usize {
    8
}
fn default_content_limit() -> usize {
    4000
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8000
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            base_url: None,
            story_model: default_story_model(),
            breakdown_model: default_breakdown_model(),
            agent_model: default_agent_model(),
            retry_count: 0,
            retry_delay_seconds: default_retry_delay(),
            on_malformed_response: FallbackPolicy::default(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_tts_model(),
            voice: default_voice(),
            response_format: default_audio_format(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_image_model(),
            size: default_image_size(),
            quality: default_image_quality(),
            style_prefix: default_style_prefix(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            content_limit: default_content_limit(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_folder: default_output(),
            uploads_folder: default_uploads(),
            llm: LlmConfig::default(),
            audio: AudioConfig::default(),
            image: ImageConfig::default(),
            agent: AgentConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// Loads `.env.local` and `.env` from `root` and its parent. Variables that
/// are already set keep their value.
pub fn load_env_files(root: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![root.join(".env.local"), root.join(".env")];
    if let Some(parent) = root.parent() {
        candidates.push(parent.join(".env.local"));
        candidates.push(parent.join(".env"));
    }

    let mut loaded = Vec::new();
    for path in candidates {
        if path.exists() && dotenvy::from_path(&path).is_ok() {
            debug!("Loaded environment from {}", path.display());
            loaded.push(path);
        }
    }
    loaded
}

impl Config {
    /// Reads `path` if it exists, otherwise starts from defaults. Environment
    /// overrides are applied either way.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path)?;
            serde_yaml_ng::from_str::<Config>(&content).map_err(|e| {
                StoryError::Configuration(format!("Failed to parse {}: {}", path.display(), e))
            })?
        } else {
            debug!("{} not found, using defaults", path.display());
            Config::default()
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml_ng::to_string(self)
            .map_err(|e| StoryError::Configuration(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.trim().is_empty() {
                self.llm.api_key = Some(key);
            }
        }
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            if !base_url.trim().is_empty() {
                self.llm.base_url = Some(base_url);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !OPENAI_VOICES.contains(&self.audio.voice.as_str()) {
            return Err(StoryError::Configuration(format!(
                "Unknown voice '{}'. Available: {}",
                self.audio.voice,
                OPENAI_VOICES.join(", ")
            )));
        }
        if self.agent.max_steps == 0 {
            return Err(StoryError::Configuration(
                "agent.max_steps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn api_key(&self) -> Result<&str> {
        self.llm
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                StoryError::Configuration(
                    "OPENAI_API_KEY is not set. Add it to the environment or a .env file."
                        .to_string(),
                )
            })
    }

    pub fn base_url(&self) -> String {
        self.llm
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1")
            .trim_end_matches('/')
            .to_string()
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.output_folder)?;
        fs::create_dir_all(&self.uploads_folder)?;
        Ok(())
    }
}
