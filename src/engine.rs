//! Caption engine: turns an image on disk into a line of text.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

use crate::config::EngineConfig;

#[async_trait]
pub trait CaptionEngine: Send + Sync {
    async fn caption(&self, image: &Path) -> Result<String>;
}

/// BLIP captioning served behind an HTTP inference endpoint.
pub struct RemoteCaptionEngine {
    client: reqwest::Client,
    config: EngineConfig,
}

#[derive(Deserialize)]
struct Generated {
    generated_text: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    Captions(Vec<Generated>),
    Failure { error: String },
}

impl RemoteCaptionEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        info!("Initializing caption engine at {}", config.api_url);
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build caption engine HTTP client")?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl CaptionEngine for RemoteCaptionEngine {
    async fn caption(&self, image: &Path) -> Result<String> {
        let path = image.to_path_buf();
        let jpeg_bytes = tokio::task::spawn_blocking(move || encode_rgb_jpeg(&path))
            .await
            .context("image encoding task failed")??;

        let payload = serde_json::json!({
            "inputs": general_purpose::STANDARD.encode(&jpeg_bytes),
            "parameters": { "text": self.config.prompt },
        });

        debug!("Sending {} byte image to caption engine", jpeg_bytes.len());

        let mut request = self.client.post(&self.config.api_url).json(&payload);
        if let Some(token) = &self.config.api_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            let excerpt: String = response_text.chars().take(500).collect();
            bail!("caption engine returned {}: {}", status, excerpt);
        }

        parse_caption(&response_text)
    }
}

/// Decodes any supported format and re-encodes it as an RGB JPEG.
fn encode_rgb_jpeg(path: &Path) -> Result<Vec<u8>> {
    let data = std::fs::read(path)?;
    // Sniff the format from content; upload names carry whatever extension the client sent.
    let img = image::load_from_memory(&data)
        .with_context(|| format!("cannot decode image {}", path.display()))?;
    let rgb = image::DynamicImage::ImageRgb8(img.to_rgb8());

    let mut jpeg_bytes = Vec::new();
    rgb.write_to(
        &mut std::io::Cursor::new(&mut jpeg_bytes),
        image::ImageOutputFormat::Jpeg(85),
    )?;
    Ok(jpeg_bytes)
}

fn parse_caption(body: &str) -> Result<String> {
    let parsed: InferenceResponse =
        serde_json::from_str(body).context("unexpected caption engine response")?;
    match parsed {
        InferenceResponse::Captions(captions) => captions
            .into_iter()
            .next()
            .map(|g| g.generated_text.trim().to_string())
            .ok_or_else(|| anyhow!("caption engine returned no captions")),
        InferenceResponse::Failure { error } => Err(anyhow!("caption engine error: {error}")),
    }
}
