pub mod agent;
pub mod batch;
pub mod breakdown;
pub mod illustration;
pub mod image;
pub mod llm;
pub mod narration;
pub mod server;
pub mod story;
pub mod tts;
pub mod workflow;
