// Scripted collaborators shared by the unit tests.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use image::DynamicImage;

use crate::decision::types::{Decision, DecisionEngine, DecisionOption};
use crate::errors::{ReplayError, ReplayResult};
use crate::executor::input::{InputDriver, MouseButton, ScrollDirection};
use crate::locator::matching::{MatchPeak, TemplateMatcher};
use crate::perception::traits::{Frame, OcrAdapter, ScreenCapture};
use crate::perception::types::{Position, Region, TextRegion};
use crate::playback::types::{Step, StepAction, StepMode};

pub fn step(id: &str, action: StepAction) -> Step {
    Step {
        id: id.to_string(),
        index: 0,
        mode: StepMode::Fixed,
        position: None,
        text: None,
        screenshot: None,
        description: String::new(),
        timestamp: 0,
        ai_config: None,
        action,
    }
}

// ── capture ──────────────────────────────────────────────────────────────

/// Blank frames: 800x600 for windows, region-sized for regions. Window
/// frames sit at `window_origin` on screen.
pub struct FakeCapture {
    fail: bool,
    window_origin: Position,
    regions: Mutex<Vec<Region>>,
    window_ids: Mutex<Vec<Option<u32>>>,
}

impl FakeCapture {
    pub fn new() -> Self {
        Self {
            fail: false,
            window_origin: Position::new(0, 0),
            regions: Mutex::new(Vec::new()),
            window_ids: Mutex::new(Vec::new()),
        }
    }

    pub fn with_window_origin(mut self, origin: Position) -> Self {
        self.window_origin = origin;
        self
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn regions(&self) -> Vec<Region> {
        self.regions.lock().unwrap().clone()
    }

    pub fn window_captures(&self) -> usize {
        self.window_ids.lock().unwrap().len()
    }

    pub fn window_ids(&self) -> Vec<Option<u32>> {
        self.window_ids.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScreenCapture for FakeCapture {
    async fn capture_window(&self, window_id: Option<u32>) -> Option<Frame> {
        self.window_ids.lock().unwrap().push(window_id);
        (!self.fail).then(|| Frame::new(DynamicImage::new_rgb8(800, 600), self.window_origin))
    }

    async fn capture_region(&self, region: Region) -> Option<Frame> {
        self.regions.lock().unwrap().push(region);
        (!self.fail).then(|| {
            Frame::new(
                DynamicImage::new_rgb8(region.width, region.height),
                region.origin(),
            )
        })
    }
}

// ── ocr ──────────────────────────────────────────────────────────────────

/// Answers `find_text` from a script; the last entry repeats once the
/// script runs out.
pub struct ScriptedOcr {
    script: Mutex<VecDeque<ReplayResult<Option<Position>>>>,
    fallback: Option<Position>,
    fail_always: bool,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedOcr {
    pub fn always(position: Option<Position>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: position,
            fail_always: false,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Answers `position` only after `delay`.
    pub fn slow(delay: Duration, position: Option<Position>) -> Self {
        Self {
            delay,
            ..Self::always(position)
        }
    }

    pub fn sequence(script: Vec<ReplayResult<Option<Position>>>) -> Self {
        let fallback = script
            .last()
            .and_then(|r| r.as_ref().ok().copied().flatten());
        Self {
            script: Mutex::new(script.into()),
            fallback,
            fail_always: false,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn erroring() -> Self {
        Self {
            fail_always: true,
            ..Self::always(None)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrAdapter for ScriptedOcr {
    async fn recognize(&self, _image: &DynamicImage) -> ReplayResult<Vec<TextRegion>> {
        Ok(Vec::new())
    }

    async fn find_text(
        &self,
        _image: &DynamicImage,
        _text: &str,
    ) -> ReplayResult<Option<Position>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_always {
            return Err(ReplayError::Recognition("engine crashed".into()));
        }
        match self.script.lock().unwrap().pop_front() {
            Some(next) => next,
            None => Ok(self.fallback),
        }
    }
}

// ── matching ─────────────────────────────────────────────────────────────

pub struct ScriptedMatcher {
    peak: MatchPeak,
}

impl ScriptedMatcher {
    pub fn peak(score: f32, x: u32, y: u32) -> Self {
        Self {
            peak: MatchPeak { score, x, y },
        }
    }
}

impl TemplateMatcher for ScriptedMatcher {
    fn best_match(&self, _haystack: &DynamicImage, _template: &DynamicImage) -> Option<MatchPeak> {
        Some(self.peak)
    }
}

// ── input ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Click(Position, MouseButton),
    Scroll(Position, i32, ScrollDirection),
    Drag(Position, Position),
    Type(String, Option<Position>),
    Key(String),
    Hotkey(Vec<String>),
    Move(Position),
}

/// Records every successful action. The first `failing_clicks` click
/// attempts return an input error.
pub struct RecordingDriver {
    calls: Mutex<Vec<DriverCall>>,
    failing_clicks: usize,
    click_attempts: AtomicUsize,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing_clicks: 0,
            click_attempts: AtomicUsize::new(0),
        }
    }

    pub fn failing_clicks(mut self, n: usize) -> Self {
        self.failing_clicks = n;
        self
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn click_attempts(&self) -> usize {
        self.click_attempts.load(Ordering::SeqCst)
    }

    fn push(&self, call: DriverCall) -> ReplayResult<()> {
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

#[async_trait]
impl InputDriver for RecordingDriver {
    async fn click(&self, at: Position, button: MouseButton) -> ReplayResult<()> {
        let attempt = self.click_attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failing_clicks {
            return Err(ReplayError::Input(format!("click attempt {} refused", attempt + 1)));
        }
        self.push(DriverCall::Click(at, button))
    }

    async fn scroll(
        &self,
        at: Position,
        amount: i32,
        direction: ScrollDirection,
    ) -> ReplayResult<()> {
        self.push(DriverCall::Scroll(at, amount, direction))
    }

    async fn drag(&self, from: Position, to: Position) -> ReplayResult<()> {
        self.push(DriverCall::Drag(from, to))
    }

    async fn type_text(&self, text: &str, focus: Option<Position>) -> ReplayResult<()> {
        self.push(DriverCall::Type(text.to_string(), focus))
    }

    async fn press_key(&self, key: &str) -> ReplayResult<()> {
        self.push(DriverCall::Key(key.to_string()))
    }

    async fn hotkey(&self, keys: &[String]) -> ReplayResult<()> {
        self.push(DriverCall::Hotkey(keys.to_vec()))
    }

    async fn move_to(&self, at: Position) -> ReplayResult<()> {
        self.push(DriverCall::Move(at))
    }
}

// ── decision ─────────────────────────────────────────────────────────────

pub struct ScriptedDecision {
    position: Option<Position>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedDecision {
    pub fn at(position: Option<Position>) -> Self {
        Self {
            position,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecisionEngine for ScriptedDecision {
    async fn decide(
        &self,
        _screenshot: &DynamicImage,
        prompt: &str,
        options: &[DecisionOption],
    ) -> Decision {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Decision {
            selected_option: options.first().map(|o| o.label.clone()),
            position: self.position,
            confidence: if self.position.is_some() { 0.9 } else { 0.0 },
            reasoning: "scripted".into(),
            raw_response: String::new(),
        }
    }
}
