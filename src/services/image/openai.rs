use crate::core::config::ImageConfig;
use crate::core::error::{Result, StoryError};
use crate::services::image::ImageClient;
use async_trait::async_trait;
use futures_util::StreamExt;
use log::debug;
use serde::{Deserialize, Serialize};
use url::Url;

pub struct OpenAiImageClient {
    api_key: String,
    base_url: String,
    config: ImageConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: String,
    size: &'a str,
    quality: &'a str,
    n: u8,
}

#[derive(Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    url: Option<String>,
}

impl OpenAiImageClient {
    pub fn new(api_key: &str, base_url: &str, config: ImageConfig) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            config,
            client: reqwest::Client::new(),
        }
    }

    fn styled_prompt(&self, prompt: &str) -> String {
        if self.config.style_prefix.is_empty() {
            prompt.to_string()
        } else {
            format!("{} {}", self.config.style_prefix, prompt)
        }
    }

    async fn request_image_url(&self, prompt: &str) -> Result<Url> {
        let endpoint = format!("{}/images/generations", self.base_url);
        let resp = self
            .client
            .post(&endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&ImageRequest {
                model: &self.config.model,
                prompt: self.styled_prompt(prompt),
                size: &self.config.size,
                quality: &self.config.quality,
                n: 1,
            })
            .send()
            .await
            .map_err(|e| StoryError::network(&endpoint, e))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| StoryError::network(&endpoint, e))?;
        if !status.is_success() {
            return Err(StoryError::Api {
                service: "OpenAI Images",
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ImageResponse = serde_json::from_str(&body).map_err(|e| {
            StoryError::MalformedResponse(format!("Failed to parse image response: {}", e))
        })?;
        let raw_url = parsed
            .data
            .into_iter()
            .find_map(|d| d.url)
            .ok_or_else(|| StoryError::MalformedResponse("Image response has no URL".into()))?;
        Url::parse(&raw_url).map_err(|e| {
            StoryError::MalformedResponse(format!("Invalid image URL '{}': {}", raw_url, e))
        })
    }

    async fn download(&self, url: Url) -> Result<Vec<u8>> {
        let endpoint = url.to_string();
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| StoryError::network(&endpoint, e))?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(StoryError::Api {
                service: "Image download",
                status: status.as_u16(),
                body: format!("Failed to download image: HTTP {}", status.as_u16()),
            });
        }

        let mut bytes = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| StoryError::network(&endpoint, e))?;
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }
}

#[async_trait]
impl ImageClient for OpenAiImageClient {
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>> {
        let url = self.request_image_url(prompt).await?;
        debug!("Downloading generated image from {}", url);
        self.download(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_generate_then_download() {
        let mut server = mockito::Server::new_async().await;
        let image_url = format!("{}/files/card.png", server.url());
        let generate = server
            .mock("POST", "/images/generations")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(json!({
                    "model": "dall-e-3",
                    "size": "1024x1024",
                    "quality": "standard",
                    "n": 1
                })),
                Matcher::Regex("A brave little mouse".to_string()),
            ]))
            .with_status(200)
            .with_body(json!({"data": [{"url": image_url}]}).to_string())
            .create_async()
            .await;
        let download = server
            .mock("GET", "/files/card.png")
            .with_status(200)
            .with_body(vec![0x89u8, b'P', b'N', b'G'])
            .create_async()
            .await;

        let client = OpenAiImageClient::new("k", &server.url(), ImageConfig::default());
        let bytes = client.generate("A brave little mouse").await.unwrap();
        assert_eq!(bytes, vec![0x89, b'P', b'N', b'G']);
        generate.assert_async().await;
        download.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_download_is_api_error() {
        let mut server = mockito::Server::new_async().await;
        let image_url = format!("{}/files/gone.png", server.url());
        let _generate = server
            .mock("POST", "/images/generations")
            .with_status(200)
            .with_body(json!({"data": [{"url": image_url}]}).to_string())
            .create_async()
            .await;
        let _download = server
            .mock("GET", "/files/gone.png")
            .with_status(404)
            .create_async()
            .await;

        let client = OpenAiImageClient::new("k", &server.url(), ImageConfig::default());
        let err = client.generate("anything").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Api);
        assert!(err.to_string().contains("Failed to download image: HTTP 404"));
    }

    #[tokio::test]
    async fn test_missing_url_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        let _generate = server
            .mock("POST", "/images/generations")
            .with_status(200)
            .with_body(r#"{"data": []}"#)
            .create_async()
            .await;

        let client = OpenAiImageClient::new("k", &server.url(), ImageConfig::default());
        let err = client.generate("anything").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    }

    #[test]
    fn test_style_prefix_applied() {
        let client = OpenAiImageClient::new("k", "http://localhost", ImageConfig::default());
        let prompt = client.styled_prompt("A garden");
        assert!(prompt.starts_with("You are a children's story expert"));
        assert!(prompt.ends_with(" A garden"));
    }
}
