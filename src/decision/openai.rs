use std::time::Duration;

use async_trait::async_trait;
use image::DynamicImage;

use crate::config::DecisionConfig;
use crate::decision::prompts::{build_decision_prompt, parse_decision};
use crate::decision::types::{Decision, DecisionEngine, DecisionOption};
use crate::errors::ReplayResult;
use crate::llm::{VisionClient, VisionSettings};

/// Decision engine speaking the OpenAI-compatible chat-completions protocol
/// with an inline base64 PNG screenshot.
pub struct OpenAiDecisionEngine {
    client: VisionClient,
}

impl OpenAiDecisionEngine {
    pub fn from_config(cfg: &DecisionConfig) -> ReplayResult<Self> {
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

#[async_trait]
impl DecisionEngine for OpenAiDecisionEngine {
    async fn decide(
        &self,
        screenshot: &DynamicImage,
        prompt: &str,
        options: &[DecisionOption],
    ) -> Decision {
        let full_prompt = build_decision_prompt(prompt, options);
        match self.client.complete(screenshot, &full_prompt).await {
            Ok(reply) => {
                let decision = parse_decision(&reply, options);
                tracing::info!(
                    model = self.client.model(),
                    selected = ?decision.selected_option,
                    confidence = decision.confidence,
                    "decision received"
                );
                decision
            }
            Err(e) => {
                tracing::warn!(error = %e, "decision request failed");
                Decision::failed(format!("AI decision error: {e}"))
            }
        }
    }
}
