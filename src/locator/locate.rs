use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::config::PlayerConfig;
use crate::locator::matching::{NccMatcher, TemplateMatcher};
use crate::perception::traits::{Frame, OcrAdapter, ScreenCapture};
use crate::perception::types::{Position, Region};

/// Confidence reported for any OCR hit; recognisers do not expose a
/// comparable score at this layer.
pub const TEXT_CONFIDENCE: f32 = 0.9;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocateMethod {
    Ocr,
    Template,
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatorResult {
    pub found: bool,
    pub position: Option<Position>,
    /// In [0, 1]. For a template miss this is the best score seen.
    pub confidence: f32,
    pub method: Option<LocateMethod>,
    pub message: String,
}

impl LocatorResult {
    fn hit(position: Position, confidence: f32, method: LocateMethod, message: String) -> Self {
        Self {
            found: true,
            position: Some(position),
            confidence,
            method: Some(method),
            message,
        }
    }

    fn miss(method: Option<LocateMethod>, confidence: f32, message: impl Into<String>) -> Self {
        Self {
            found: false,
            position: None,
            confidence,
            method,
            message: message.into(),
        }
    }
}

/// Where a strategy captures its search image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchArea {
    /// The whole target window (or primary screen).
    Window,
    /// Square of side `2 * search_region_expand` centred on a hint.
    Around(Position),
    Region(Region),
}

/// Resolves a target descriptor to an absolute point.
///
/// Strategies run in a fixed order (text, template, literal position) and the
/// first hit wins. Collaborator failures are folded into `found = false`;
/// nothing here returns an error.
#[derive(Clone)]
pub struct Locator {
    config: PlayerConfig,
    capture: Option<Arc<dyn ScreenCapture>>,
    ocr: Option<Arc<dyn OcrAdapter>>,
    matcher: Arc<dyn TemplateMatcher>,
    window: Option<u32>,
    poll_interval: Duration,
}

impl Locator {
    pub fn new(config: PlayerConfig) -> Self {
        Self {
            config,
            capture: None,
            ocr: None,
            matcher: Arc::new(NccMatcher),
            window: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_capture(mut self, capture: Arc<dyn ScreenCapture>) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn with_ocr(mut self, ocr: Arc<dyn OcrAdapter>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn with_matcher(mut self, matcher: Arc<dyn TemplateMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    /// Window used for whole-window searches; the primary screen otherwise.
    pub fn with_window(mut self, window_id: u32) -> Self {
        self.window = Some(window_id);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn capture(&self) -> Option<&Arc<dyn ScreenCapture>> {
        self.capture.as_ref()
    }

    pub fn window(&self) -> Option<u32> {
        self.window
    }

    /// Try text, then template, then the literal position.
    ///
    /// When every attempted strategy misses, the last miss is returned so the
    /// caller sees its method and best confidence.
    pub async fn locate(
        &self,
        text: Option<&str>,
        template: Option<&DynamicImage>,
        fixed_position: Option<Position>,
        hint_position: Option<Position>,
    ) -> LocatorResult {
        let area = hint_position.map_or(SearchArea::Window, SearchArea::Around);
        let mut last_miss: Option<LocatorResult> = None;

        if let Some(text) = text.filter(|t| !t.is_empty()) {
            if self.ocr.is_some() && self.capture.is_some() {
                let result = self.locate_text(text, area).await;
                if result.found {
                    return result;
                }
                tracing::debug!(text, message = %result.message, "text strategy missed");
                last_miss = Some(result);
            }
        }

        if let Some(template) = template {
            if self.capture.is_some() {
                let result = self.locate_template(template, area, None).await;
                if result.found {
                    return result;
                }
                tracing::debug!(
                    confidence = result.confidence,
                    message = %result.message,
                    "template strategy missed"
                );
                last_miss = Some(result);
            }
        }

        if let Some(position) = fixed_position {
            return LocatorResult::hit(
                position,
                1.0,
                LocateMethod::Fixed,
                "Using fixed position".into(),
            );
        }

        last_miss.unwrap_or_else(|| LocatorResult::miss(None, 0.0, "No element found"))
    }

    async fn grab(&self, area: SearchArea) -> Option<Frame> {
        let capture = self.capture.as_ref()?;
        match area {
            SearchArea::Window => capture.capture_window(self.window).await,
            SearchArea::Around(hint) => {
                let region = Region::around(hint, self.config.search_region_expand);
                capture.capture_region(region).await
            }
            SearchArea::Region(region) => capture.capture_region(region).await,
        }
    }

    /// Text strategy: OCR inside the search area, translated to screen space.
    pub async fn locate_text(&self, text: &str, area: SearchArea) -> LocatorResult {
        let Some(ocr) = self.ocr.as_ref() else {
            return LocatorResult::miss(Some(LocateMethod::Ocr), 0.0, "No OCR adapter configured");
        };
        let Some(frame) = self.grab(area).await else {
            return LocatorResult::miss(Some(LocateMethod::Ocr), 0.0, "Failed to capture screen");
        };

        let lookup = ocr.find_text(&frame.image, text);
        match tokio::time::timeout(self.config.ocr_timeout(), lookup).await {
            Ok(Ok(Some(local))) => {
                let position = frame.to_screen(local);
                tracing::debug!(text, x = position.x, y = position.y, "text located");
                LocatorResult::hit(
                    position,
                    TEXT_CONFIDENCE,
                    LocateMethod::Ocr,
                    format!("Found text: {text}"),
                )
            }
            Ok(Ok(None)) => {
                LocatorResult::miss(Some(LocateMethod::Ocr), 0.0, format!("Text not found: {text}"))
            }
            Ok(Err(e)) => {
                tracing::warn!(text, error = %e, "OCR failed");
                LocatorResult::miss(Some(LocateMethod::Ocr), 0.0, format!("OCR error: {e}"))
            }
            Err(_) => {
                tracing::warn!(text, timeout_ms = self.config.ocr_timeout, "OCR timed out");
                LocatorResult::miss(
                    Some(LocateMethod::Ocr),
                    0.0,
                    format!("OCR timed out after {}ms", self.config.ocr_timeout),
                )
            }
        }
    }

    /// Template strategy. `threshold` overrides the configured match threshold.
    pub async fn locate_template(
        &self,
        template: &DynamicImage,
        area: SearchArea,
        threshold: Option<f32>,
    ) -> LocatorResult {
        let threshold = threshold.unwrap_or(self.config.match_threshold);
        let Some(frame) = self.grab(area).await else {
            return LocatorResult::miss(
                Some(LocateMethod::Template),
                0.0,
                "Failed to capture screen",
            );
        };
        let origin = frame.origin;

        let matcher = Arc::clone(&self.matcher);
        let template_owned = template.clone();
        let peak =
            tokio::task::spawn_blocking(move || matcher.best_match(&frame.image, &template_owned))
                .await;

        let peak = match peak {
            Ok(Some(peak)) => peak,
            Ok(None) => {
                return LocatorResult::miss(
                    Some(LocateMethod::Template),
                    0.0,
                    "Template is larger than the search area",
                )
            }
            Err(e) => {
                tracing::warn!(error = %e, "template matching task failed");
                return LocatorResult::miss(
                    Some(LocateMethod::Template),
                    0.0,
                    format!("Template matching error: {e}"),
                );
            }
        };

        if peak.score >= threshold {
            let position = Position::new(
                peak.x as i32 + (template.width() / 2) as i32,
                peak.y as i32 + (template.height() / 2) as i32,
            )
            .offset(origin);
            tracing::debug!(score = peak.score, x = position.x, y = position.y, "template matched");
            LocatorResult::hit(
                position,
                peak.score,
                LocateMethod::Template,
                format!("Template matched with confidence: {:.2}", peak.score),
            )
        } else {
            LocatorResult::miss(
                Some(LocateMethod::Template),
                peak.score,
                format!("Template match confidence too low: {:.2}", peak.score),
            )
        }
    }

    /// Poll the text strategy until it hits or `timeout` runs out.
    /// At least one poll is made.
    pub async fn wait_for_text(
        &self,
        text: &str,
        timeout: Duration,
        area: SearchArea,
    ) -> LocatorResult {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let result = self.locate_text(text, area).await;
            if result.found {
                return result;
            }
            if !self.sleep_until_next_poll(deadline).await {
                return timed_out(result, timeout);
            }
        }
    }

    pub async fn wait_for_template(
        &self,
        template: &DynamicImage,
        timeout: Duration,
        area: SearchArea,
        threshold: Option<f32>,
    ) -> LocatorResult {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let result = self.locate_template(template, area, threshold).await;
            if result.found {
                return result;
            }
            if !self.sleep_until_next_poll(deadline).await {
                return timed_out(result, timeout);
            }
        }
    }

    /// Sleeps one poll interval; false when the next poll would start past
    /// the deadline.
    async fn sleep_until_next_poll(&self, deadline: tokio::time::Instant) -> bool {
        let now = tokio::time::Instant::now();
        if now + self.poll_interval >= deadline {
            return false;
        }
        tokio::time::sleep(self.poll_interval).await;
        true
    }
}

fn timed_out(mut last: LocatorResult, timeout: Duration) -> LocatorResult {
    last.message = format!("Timed out after {}ms: {}", timeout.as_millis(), last.message);
    last
}
