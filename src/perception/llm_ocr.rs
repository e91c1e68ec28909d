// Text recognition delegated to a vision language model.
use std::time::Duration;

use async_trait::async_trait;
use image::DynamicImage;

use crate::config::OcrConfig;
use crate::errors::{ReplayError, ReplayResult};
use crate::llm::{extract_json, VisionClient, VisionSettings};
use crate::perception::traits::OcrAdapter;
use crate::perception::types::{Position, Region, TextRegion};

const DEFAULT_REGION_CONFIDENCE: f64 = 0.8;

/// `OcrAdapter` over an OpenAI-compatible vision model. `find_text` asks the
/// model for the target directly instead of transcribing the whole image.
pub struct LlmVisionOcr {
    client: VisionClient,
}

impl LlmVisionOcr {
    pub fn from_config(cfg: &OcrConfig) -> ReplayResult<Self> {
        let client = VisionClient::new(VisionSettings {
            api_base: cfg.api_base.clone(),
            api_key: cfg.resolve_api_key(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            timeout: Duration::from_secs(cfg.timeout_secs),
        })?;
        Ok(Self { client })
    }
}

fn recognize_prompt(width: u32, height: u32) -> String {
    format!(
        "Transcribe every piece of text visible in this {width}x{height} pixel image.\n\
         Reply with JSON only:\n\
         {{\"regions\": [{{\"text\": \"...\", \
         \"bbox\": {{\"x\": 0, \"y\": 0, \"width\": 0, \"height\": 0}}, \
         \"confidence\": 0.95}}]}}\n\
         - Coordinates are pixels from the top-left corner of the image.\n\
         - `confidence` is in [0, 1]."
    )
}

fn find_prompt(text: &str, width: u32, height: u32) -> String {
    format!(
        "Find the text \"{text}\" in this {width}x{height} pixel image.\n\
         If it is visible, reply {{\"found\": true, \"x\": <centre x>, \"y\": <centre y>}} \
         in pixels from the top-left corner.\n\
         Otherwise reply {{\"found\": false}}.\n\
         Reply with JSON only."
    )
}

fn int_field(v: &serde_json::Value, key: &str) -> i64 {
    v[key]
        .as_i64()
        .or_else(|| v[key].as_f64().map(|f| f.round() as i64))
        .unwrap_or(0)
}

/// Regions listed in a transcription reply. Entries without text are dropped.
pub fn parse_regions(reply: &str) -> ReplayResult<Vec<TextRegion>> {
    let data = extract_json(reply)
        .ok_or_else(|| ReplayError::Recognition("reply contains no JSON object".into()))?;
    let Some(items) = data["regions"].as_array() else {
        return Err(ReplayError::Recognition("reply has no `regions` array".into()));
    };

    Ok(items
        .iter()
        .filter_map(|item| {
            let text = item["text"].as_str().filter(|t| !t.is_empty())?;
            let bbox = &item["bbox"];
            Some(TextRegion {
                text: text.to_string(),
                bbox: Region::new(
                    int_field(bbox, "x") as i32,
                    int_field(bbox, "y") as i32,
                    int_field(bbox, "width").max(0) as u32,
                    int_field(bbox, "height").max(0) as u32,
                ),
                confidence: item["confidence"]
                    .as_f64()
                    .unwrap_or(DEFAULT_REGION_CONFIDENCE)
                    .clamp(0.0, 1.0) as f32,
            })
        })
        .collect())
}

/// Image-local centre from a lookup reply, `None` when the model says the
/// text is absent.
pub fn parse_text_hit(reply: &str) -> ReplayResult<Option<Position>> {
    let data = extract_json(reply)
        .ok_or_else(|| ReplayError::Recognition("reply contains no JSON object".into()))?;
    if !data["found"].as_bool().unwrap_or(false) {
        return Ok(None);
    }
    if data["x"].is_null() || data["y"].is_null() {
        return Err(ReplayError::Recognition("hit reported without coordinates".into()));
    }
    Ok(Some(Position::new(
        int_field(&data, "x") as i32,
        int_field(&data, "y") as i32,
    )))
}

#[async_trait]
impl OcrAdapter for LlmVisionOcr {
    async fn recognize(&self, image: &DynamicImage) -> ReplayResult<Vec<TextRegion>> {
        let prompt = recognize_prompt(image.width(), image.height());
        let reply = self.client.complete(image, &prompt).await?;
        let regions = parse_regions(&reply)?;
        tracing::debug!(model = self.client.model(), regions = regions.len(), "text recognised");
        Ok(regions)
    }

    async fn find_text(
        &self,
        image: &DynamicImage,
        text: &str,
    ) -> ReplayResult<Option<Position>> {
        let prompt = find_prompt(text, image.width(), image.height());
        let reply = self.client.complete(image, &prompt).await?;
        let hit = parse_text_hit(&reply)?;
        tracing::debug!(text, found = hit.is_some(), "text lookup answered");
        Ok(hit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_parse_from_fenced_reply() {
        let reply = r#"```json
        {"regions": [
            {"text": "Save", "confidence": 0.97,
             "bbox": {"x": 10, "y": 20, "width": 40, "height": 12}},
            {"text": "", "bbox": {"x": 0, "y": 0, "width": 1, "height": 1}},
            {"text": "Cancel", "bbox": {"x": 60.6, "y": 20, "width": 50, "height": 12}}
        ]}
        ```"#;
        let regions = parse_regions(reply).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].bbox, Region::new(10, 20, 40, 12));
        assert_eq!(regions[0].center(), Position::new(30, 26));
        assert_eq!(regions[1].bbox.x, 61);
        assert!((regions[1].confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn reply_without_json_is_a_recognition_error() {
        assert!(matches!(
            parse_regions("Sorry, I cannot read this."),
            Err(ReplayError::Recognition(_))
        ));
        assert!(matches!(
            parse_text_hit("no idea"),
            Err(ReplayError::Recognition(_))
        ));
    }

    #[test]
    fn text_hit_and_miss() {
        assert_eq!(
            parse_text_hit(r#"{"found": true, "x": 120, "y": 48}"#).unwrap(),
            Some(Position::new(120, 48))
        );
        assert_eq!(parse_text_hit(r#"{"found": false}"#).unwrap(), None);
        assert!(parse_text_hit(r#"{"found": true}"#).is_err());
    }

    #[test]
    fn prompts_carry_image_size_and_target() {
        assert!(recognize_prompt(640, 480).contains("640x480"));
        let p = find_prompt("Next", 400, 400);
        assert!(p.contains("\"Next\""));
        assert!(p.contains("400x400"));
    }
}
