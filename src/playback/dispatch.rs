use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::decision::types::{AiConfig, DecisionEngine};
use crate::errors::ReplayResult;
use crate::executor::input::{InputDriver, MouseButton};
use crate::executor::keys::{is_chord, parse_chord};
use crate::locator::template::load_template;
use crate::locator::{Locator, LocatorResult, SearchArea};
use crate::perception::types::Position;
use crate::playback::control::RunControl;
use crate::playback::types::{
    ConditionKind, Step, StepAction, StepMode, StepResult, StepStatus, WaitCondition, WaitSpec,
};

/// Executes single steps against the injected collaborators.
///
/// `execute` separates the two failure kinds: an `Err` is a collaborator
/// fault and is retried by `run_step`; an `Ok` result with a non-success
/// status is a logical outcome and is returned as-is.
#[derive(Clone)]
pub struct StepDispatcher {
    locator: Locator,
    driver: Arc<dyn InputDriver>,
    decision: Option<Arc<dyn DecisionEngine>>,
}

impl StepDispatcher {
    pub fn new(
        locator: Locator,
        driver: Arc<dyn InputDriver>,
        decision: Option<Arc<dyn DecisionEngine>>,
    ) -> Self {
        Self {
            locator,
            driver,
            decision,
        }
    }

    /// Execute with the bounded retry policy and stamp duration and retries.
    pub async fn run_step(&self, step: &Step, index: usize, control: &RunControl) -> StepResult {
        let config = self.locator.config();
        let started = Instant::now();
        let mut failures: u32 = 0;

        let mut result = loop {
            match self.execute(step, index).await {
                Ok(result) => break result,
                Err(e) => {
                    failures += 1;
                    tracing::warn!(
                        step = %step.id,
                        attempt = failures,
                        max_retries = config.retry_count,
                        error = %e,
                        "step attempt failed"
                    );
                    if failures > config.retry_count {
                        // Every allowed retry was spent.
                        let mut failed = StepResult::new(
                            step,
                            index,
                            StepStatus::Failed,
                            format!("Failed after {} retries", config.retry_count),
                        );
                        failed.error = Some(e.to_string());
                        failures = config.retry_count;
                        break failed;
                    }
                    if !control.sleep(config.retry_delay()).await {
                        let mut failed = StepResult::new(
                            step,
                            index,
                            StepStatus::Failed,
                            "stopped during retry",
                        );
                        failed.error = Some(e.to_string());
                        break failed;
                    }
                }
            }
        };

        result.retries = failures;
        result.duration_ms = started.elapsed().as_millis() as u64;
        result
    }

    /// One attempt at a step.
    pub async fn execute(&self, step: &Step, index: usize) -> ReplayResult<StepResult> {
        match &step.action {
            StepAction::Click { button } => self.click(step, index, *button).await,
            StepAction::Scroll { direction, amount } => {
                let at = step.position.unwrap_or(Position::new(0, 0));
                self.driver.scroll(at, *amount, *direction).await?;
                Ok(StepResult::new(
                    step,
                    index,
                    StepStatus::Success,
                    format!("Scrolled {amount} {direction:?} at {at}"),
                )
                .with_position(at))
            }
            StepAction::Drag { from, to } => {
                self.driver.drag(*from, *to).await?;
                Ok(StepResult::new(
                    step,
                    index,
                    StepStatus::Success,
                    format!("Dragged {from} -> {to}"),
                )
                .with_position(*to))
            }
            StepAction::Input { input_text } => {
                self.driver.type_text(input_text, step.position).await?;
                let chars = input_text.chars().count();
                Ok(StepResult::new(
                    step,
                    index,
                    StepStatus::Success,
                    format!("Typed {chars} characters"),
                ))
            }
            StepAction::Key { key } => {
                if is_chord(key) {
                    self.driver.hotkey(&parse_chord(key)).await?;
                } else {
                    self.driver.press_key(key.trim()).await?;
                }
                Ok(StepResult::new(
                    step,
                    index,
                    StepStatus::Success,
                    format!("Pressed {key}"),
                ))
            }
            StepAction::FileSelect { file_path } => {
                self.driver.type_text(file_path, None).await?;
                self.driver.press_key("enter").await?;
                Ok(StepResult::new(
                    step,
                    index,
                    StepStatus::Success,
                    format!("Selected file: {file_path}"),
                ))
            }
            StepAction::Wait { wait } => Ok(self.wait(step, index, wait).await),
            StepAction::Unknown => {
                tracing::warn!(step = %step.id, "skipping step of unknown type");
                Ok(StepResult::new(
                    step,
                    index,
                    StepStatus::Skipped,
                    "Unknown step type",
                ))
            }
        }
    }

    // ── click ────────────────────────────────────────────────────────────

    async fn click(
        &self,
        step: &Step,
        index: usize,
        button: MouseButton,
    ) -> ReplayResult<StepResult> {
        let target = match step.mode {
            StepMode::Fixed => step.position,
            StepMode::Smart => {
                let located = self.smart_locate(step).await;
                if !located.found {
                    tracing::info!(step = %step.id, message = %located.message, "target not found");
                    return Ok(StepResult::new(
                        step,
                        index,
                        StepStatus::Failed,
                        located.message,
                    ));
                }
                located.position
            }
            StepMode::AiDecision => self.decide_target(step).await,
        };

        let Some(at) = target else {
            return Ok(StepResult::new(
                step,
                index,
                StepStatus::Failed,
                "No target position for click",
            ));
        };

        self.driver.click(at, button).await?;
        tracing::debug!(step = %step.id, x = at.x, y = at.y, ?button, "clicked");
        let message = format!("Clicked at {at}");
        Ok(StepResult::new(step, index, StepStatus::Success, message).with_position(at))
    }

    /// Text, then template, then the recorded position. An unloadable
    /// template only removes that strategy from the cascade.
    async fn smart_locate(&self, step: &Step) -> LocatorResult {
        let template = step.screenshot.as_deref().and_then(|reference| {
            load_template(reference)
                .map_err(|e| {
                    tracing::warn!(
                        step = %step.id,
                        error = %e,
                        "template unavailable, skipping template strategy"
                    );
                })
                .ok()
        });
        self.locator
            .locate(
                step.text.as_deref(),
                template.as_ref(),
                step.position,
                step.position,
            )
            .await
    }

    /// Ask the decision engine; any gap (no engine, no capture, capture
    /// failure, position-less decision) falls back to the recorded position.
    async fn decide_target(&self, step: &Step) -> Option<Position> {
        let fallback = step.position;
        let (Some(engine), Some(capture)) = (self.decision.as_ref(), self.locator.capture())
        else {
            tracing::debug!(
                step = %step.id,
                "no decision engine or capture; using recorded position"
            );
            return fallback;
        };
        let Some(frame) = capture.capture_window(self.locator.window()).await else {
            tracing::warn!(step = %step.id, "capture failed; using recorded position");
            return fallback;
        };

        let default_config = AiConfig::default();
        let ai = step.ai_config.as_ref().unwrap_or(&default_config);
        let decision = engine.decide(&frame.image, &ai.prompt, &ai.options).await;
        tracing::info!(
            step = %step.id,
            selected = ?decision.selected_option,
            confidence = decision.confidence,
            reasoning = %decision.reasoning,
            "decision made"
        );
        decision.position.or(fallback)
    }

    // ── wait ─────────────────────────────────────────────────────────────

    async fn wait(&self, step: &Step, index: usize, wait: &WaitSpec) -> StepResult {
        match wait {
            WaitSpec::Time { duration } => {
                tokio::time::sleep(Duration::from_millis(*duration)).await;
                StepResult::new(
                    step,
                    index,
                    StepStatus::Success,
                    format!("Waited {duration}ms"),
                )
            }
            WaitSpec::Condition { condition, timeout } => {
                self.wait_condition(step, index, condition, Duration::from_millis(*timeout))
                    .await
            }
        }
    }

    async fn wait_condition(
        &self,
        step: &Step,
        index: usize,
        condition: &WaitCondition,
        timeout: Duration,
    ) -> StepResult {
        let area = condition.region.map_or(SearchArea::Window, SearchArea::Region);
        let outcome = match condition.kind {
            ConditionKind::TextAppear => {
                self.locator.wait_for_text(&condition.value, timeout, area).await
            }
            ConditionKind::TextDisappear => {
                // Inverts the outcome of the polling sequence; absence is not
                // confirmed over the whole window.
                let mut r = self.locator.wait_for_text(&condition.value, timeout, area).await;
                r.found = !r.found;
                r
            }
            ConditionKind::ImageMatch => {
                let template = match load_template(&condition.value) {
                    Ok(t) => t,
                    Err(e) => {
                        let mut failed = StepResult::new(
                            step,
                            index,
                            StepStatus::Failed,
                            "Template image not found",
                        );
                        failed.error = Some(e.to_string());
                        return failed;
                    }
                };
                self.locator
                    .wait_for_template(&template, timeout, area, condition.threshold)
                    .await
            }
            ConditionKind::Unknown => {
                return StepResult::new(
                    step,
                    index,
                    StepStatus::Failed,
                    "Unknown condition type",
                );
            }
        };

        let status = if outcome.found {
            StepStatus::Success
        } else {
            StepStatus::Timeout
        };
        let mut result = StepResult::new(step, index, status, outcome.message);
        if outcome.found {
            result.position = outcome.position;
        }
        result
    }
}
