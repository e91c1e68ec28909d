// OpenAI-compatible chat-completions client for single-image vision prompts.
use std::sync::OnceLock;
use std::time::Duration;

use base64::Engine as _;
use image::DynamicImage;
use regex::Regex;

use crate::errors::{ReplayError, ReplayResult};

/// Connection and sampling settings shared by every vision-backed collaborator.
#[derive(Debug, Clone)]
pub struct VisionSettings {
    /// Full chat-completions URL.
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout: Duration,
}

pub struct VisionClient {
    settings: VisionSettings,
    client: reqwest::Client,
}

impl VisionClient {
    pub fn new(settings: VisionSettings) -> ReplayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(Self { settings, client })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    /// Send `prompt` with `image` attached as an inline PNG and return the
    /// text of the first choice.
    pub async fn complete(&self, image: &DynamicImage, prompt: &str) -> ReplayResult<String> {
        let mut png = Vec::new();
        image.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)?;
        let b64 = base64::engine::general_purpose::STANDARD.encode(&png);
        let data_url = format!("data:image/png;base64,{b64}");

        let body = serde_json::json!({
            "model": self.settings.model,
            "temperature": self.settings.temperature,
            "max_tokens": self.settings.max_tokens,
            "stream": false,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": data_url } }
                ]
            }]
        });

        tracing::debug!(
            model = %self.settings.model,
            image_bytes = png.len(),
            "sending vision request"
        );

        let response = self
            .client
            .post(&self.settings.api_base)
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(ReplayError::Vision(format!("{status}: {err_body}")));
        }

        let json: serde_json::Value = response.json().await?;
        json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ReplayError::Vision("response has no message content".into()))
    }
}

fn outer_object_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{[\s\S]*\}").expect("static regex"))
}

/// The outermost `{...}` span of a model reply, parsed as JSON. Models wrap
/// their answer in prose or code fences often enough that this is the norm.
pub fn extract_json(reply: &str) -> Option<serde_json::Value> {
    let m = outer_object_re().find(reply)?;
    serde_json::from_str(m.as_str()).ok()
}
