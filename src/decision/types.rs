use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::perception::types::{Position, Region};

/// A choice the vision model may pick, tied to the screen area it stands for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionOption {
    pub label: String,
    pub region: Region,
    #[serde(default)]
    pub description: String,
}

/// Per-step prompt and options for `ai_decision` clicks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AiConfig {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<DecisionOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Decision {
    pub selected_option: Option<String>,
    pub position: Option<Position>,
    pub confidence: f32,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub raw_response: String,
}

impl Decision {
    /// Zero-confidence, position-less decision carrying the failure reason.
    pub fn failed(reasoning: impl Into<String>) -> Self {
        Self {
            reasoning: reasoning.into(),
            ..Self::default()
        }
    }
}

/// Vision-based choice among labelled options.
///
/// Implementations must absorb their own failures into [`Decision::failed`];
/// the player never sees an error from here.
#[async_trait]
pub trait DecisionEngine: Send + Sync {
    async fn decide(
        &self,
        screenshot: &DynamicImage,
        prompt: &str,
        options: &[DecisionOption],
    ) -> Decision;
}
