use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::decision::types::AiConfig;
use crate::errors::ReplayResult;
use crate::executor::input::{MouseButton, ScrollDirection};
use crate::perception::types::{Position, Region};

/// How a click resolves its target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepMode {
    /// Click the recorded position as-is.
    #[default]
    Fixed,
    /// Re-locate by text, then template, then the recorded position.
    Smart,
    /// Let the decision engine pick among configured options.
    AiDecision,
}

/// One recorded action. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub mode: StepMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// Visible text used by the OCR strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Template image reference (path or data URI) for the template strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Capture time in milliseconds since the recording started.
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_config: Option<AiConfig>,
    #[serde(flatten)]
    pub action: StepAction,
}

/// Type-specific payload, tagged by `type` in the exchange format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepAction {
    Click {
        #[serde(default)]
        button: MouseButton,
    },
    Scroll {
        #[serde(default)]
        direction: ScrollDirection,
        #[serde(default = "default_scroll_amount")]
        amount: i32,
    },
    Drag {
        from: Position,
        to: Position,
    },
    Input {
        #[serde(default)]
        input_text: String,
    },
    Key {
        key: String,
    },
    Wait {
        wait: WaitSpec,
    },
    FileSelect {
        file_path: String,
    },
    /// Any step type this player does not know; replayed as skipped.
    #[serde(other)]
    Unknown,
}

fn default_scroll_amount() -> i32 {
    3
}

impl StepAction {
    pub fn kind(&self) -> &'static str {
        match self {
            StepAction::Click { .. } => "click",
            StepAction::Scroll { .. } => "scroll",
            StepAction::Drag { .. } => "drag",
            StepAction::Input { .. } => "input",
            StepAction::Key { .. } => "key",
            StepAction::Wait { .. } => "wait",
            StepAction::FileSelect { .. } => "file_select",
            StepAction::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WaitSpec {
    /// Sleep for `duration` milliseconds.
    Time { duration: u64 },
    /// Poll until `condition` holds or `timeout` milliseconds pass.
    Condition {
        condition: WaitCondition,
        #[serde(default = "default_wait_timeout")]
        timeout: u64,
    },
}

fn default_wait_timeout() -> u64 {
    30_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitCondition {
    #[serde(rename = "type")]
    pub kind: ConditionKind,
    /// Text to look for, or a template reference for `image_match`.
    #[serde(default)]
    pub value: String,
    /// Overrides the configured match threshold for `image_match`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f32>,
    /// Restricts the polled capture; whole window otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    TextAppear,
    TextDisappear,
    ImageMatch,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetWindow {
    pub title: String,
    #[serde(default)]
    pub process_name: String,
    pub rect: Region,
}

/// A named, ordered step sequence as produced by the recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_window: Option<TargetWindow>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Recording {
    pub fn from_steps(steps: Vec<Step>) -> Self {
        Self {
            id: format!("rec_{}", &uuid::Uuid::new_v4().simple().to_string()[..8]),
            name: String::new(),
            target_window: None,
            steps,
        }
    }

    pub fn from_json_file(path: &Path) -> ReplayResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let recording: Recording = serde_json::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            id = %recording.id,
            steps = recording.steps.len(),
            "recording loaded"
        );
        Ok(recording)
    }

    /// Structural problems that would make a replay fail or misbehave,
    /// one message per problem. Template references are not resolved.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for (i, step) in self.steps.iter().enumerate() {
            let at = format!("step {i} ({})", step.id);
            if step.id.is_empty() {
                problems.push(format!("step {i}: empty id"));
            } else if !seen.insert(step.id.as_str()) {
                problems.push(format!("{at}: duplicate id"));
            }
            match &step.action {
                StepAction::Click { .. } => match step.mode {
                    StepMode::Fixed if step.position.is_none() => {
                        problems.push(format!("{at}: fixed click without position"));
                    }
                    StepMode::Smart
                        if step.position.is_none()
                            && step.text.is_none()
                            && step.screenshot.is_none() =>
                    {
                        problems.push(format!(
                            "{at}: smart click has no text, template or position"
                        ));
                    }
                    StepMode::AiDecision
                        if step.ai_config.is_none() && step.position.is_none() =>
                    {
                        problems.push(format!(
                            "{at}: ai_decision click has no ai_config or position"
                        ));
                    }
                    _ => {}
                },
                StepAction::Key { key } if key.trim().is_empty() => {
                    problems.push(format!("{at}: empty key"));
                }
                StepAction::Wait {
                    wait: WaitSpec::Condition { condition, .. },
                } => {
                    if condition.kind == ConditionKind::Unknown {
                        problems.push(format!("{at}: unknown wait condition type"));
                    }
                    if condition.value.is_empty() {
                        problems.push(format!("{at}: wait condition without value"));
                    }
                }
                StepAction::Unknown => {
                    problems.push(format!("{at}: unknown step type, will be skipped"));
                }
                _ => {}
            }
        }
        problems
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed,
    Skipped,
    Timeout,
}

/// Outcome of executing one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub step_index: usize,
    pub status: StepStatus,
    #[serde(default)]
    pub message: String,
    /// Where the action was actually performed, when it had a target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    pub duration_ms: u64,
    /// Failed attempts consumed before this result.
    #[serde(default)]
    pub retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    pub fn new(
        step: &Step,
        step_index: usize,
        status: StepStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            step_id: step.id.clone(),
            step_index,
            status,
            message: message.into(),
            position: None,
            duration_ms: 0,
            retries: 0,
            error: None,
        }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn click_step_round_trips() {
        let json = r#"{
            "id": "step_1", "index": 0, "type": "click", "mode": "smart",
            "position": {"x": 300, "y": 400}, "text": "Next", "button": "right",
            "screenshot": "tpl/next.png"
        }"#;
        let step: Step = serde_json::from_str(json).unwrap();
        assert_eq!(step.mode, StepMode::Smart);
        assert_eq!(step.action, StepAction::Click { button: MouseButton::Right });
        assert_eq!(step.position, Some(Position::new(300, 400)));

        let back: Step = serde_json::from_value(serde_json::to_value(&step).unwrap()).unwrap();
        assert_eq!(back, step);
    }

    #[test]
    fn wait_step_round_trips() {
        let json = r#"{
            "id": "w", "type": "wait",
            "wait": {"mode": "condition", "timeout": 1000,
                     "condition": {"type": "image_match", "value": "a.png", "threshold": 0.9}}
        }"#;
        let step: Step = serde_json::from_str(json).unwrap();
        match &step.action {
            StepAction::Wait { wait: WaitSpec::Condition { condition, timeout } } => {
                assert_eq!(*timeout, 1000);
                assert_eq!(condition.kind, ConditionKind::ImageMatch);
                assert_eq!(condition.threshold, Some(0.9));
            }
            other => panic!("unexpected action {other:?}"),
        }
        let back: Step = serde_json::from_str(&serde_json::to_string(&step).unwrap()).unwrap();
        assert_eq!(back, step);
    }

    #[test]
    fn unknown_types_are_kept_as_unknown() {
        let step: Step = serde_json::from_str(r#"{"id": "x", "type": "teleport"}"#).unwrap();
        assert_eq!(step.action, StepAction::Unknown);

        let cond: WaitCondition =
            serde_json::from_str(r#"{"type": "color_change", "value": "red"}"#).unwrap();
        assert_eq!(cond.kind, ConditionKind::Unknown);
    }

    #[test]
    fn validate_flags_unplayable_steps() {
        let rec: Recording = serde_json::from_str(
            r#"{"id": "r", "steps": [
                {"id": "a", "type": "click"},
                {"id": "a", "type": "click", "mode": "smart", "text": "OK"},
                {"id": "c", "type": "wait", "wait": {"mode": "condition",
                    "condition": {"type": "blink", "value": "x"}}},
                {"id": "d", "type": "hover"}
            ]}"#,
        )
        .unwrap();
        let problems = rec.validate();
        assert_eq!(problems.len(), 4, "{problems:?}");
        assert!(problems[0].contains("fixed click without position"));
        assert!(problems[1].contains("duplicate id"));
    }

    #[test]
    fn recording_defaults() {
        let rec: Recording = serde_json::from_str(
            r#"{"id": "rec_1", "steps": [{"id": "k", "type": "key", "key": "ctrl+s"}]}"#,
        )
        .unwrap();
        assert_eq!(rec.steps.len(), 1);
        assert_eq!(rec.steps[0].mode, StepMode::Fixed);
        assert_eq!(rec.steps[0].action.kind(), "key");
    }
}
