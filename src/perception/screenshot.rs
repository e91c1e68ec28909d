// Screen capture backed by xcap. Captures run on the blocking pool.
use async_trait::async_trait;
use image::DynamicImage;
use xcap::{Monitor, Window};

use crate::errors::{ReplayError, ReplayResult};
use crate::perception::traits::{Frame, ScreenCapture};
use crate::perception::types::{Position, Region};

/// Captures the primary monitor, or a specific window when an id is given.
#[derive(Debug, Clone, Default)]
pub struct XcapCapture {
    /// Window captured by `capture_window(None)`; primary monitor when unset.
    default_window: Option<u32>,
}

impl XcapCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_window(mut self, window_id: u32) -> Self {
        self.default_window = Some(window_id);
        self
    }
}

fn primary_monitor() -> ReplayResult<Monitor> {
    let monitors =
        Monitor::all().map_err(|e| ReplayError::Capture(format!("list monitors: {e}")))?;
    monitors
        .into_iter()
        .find(|m| m.is_primary())
        .ok_or_else(|| ReplayError::Capture("no primary monitor".into()))
}

fn capture_monitor() -> ReplayResult<Frame> {
    let monitor = primary_monitor()?;
    let shot = monitor
        .capture_image()
        .map_err(|e| ReplayError::Capture(format!("capture monitor: {e}")))?;
    Ok(Frame::new(
        DynamicImage::ImageRgba8(shot),
        Position::new(monitor.x(), monitor.y()),
    ))
}

fn capture_window_by_id(id: u32) -> ReplayResult<Frame> {
    let windows = Window::all().map_err(|e| ReplayError::Capture(format!("list windows: {e}")))?;
    let window = windows
        .into_iter()
        .find(|w| w.id() == id)
        .ok_or_else(|| ReplayError::Capture(format!("window {id} not found")))?;
    if window.is_minimized() {
        return Err(ReplayError::Capture(format!("window {id} is minimized")));
    }
    let shot = window
        .capture_image()
        .map_err(|e| ReplayError::Capture(format!("capture window {id}: {e}")))?;
    Ok(Frame::new(
        DynamicImage::ImageRgba8(shot),
        Position::new(window.x(), window.y()),
    ))
}

/// Crop `region` (absolute coordinates) out of a monitor image whose top-left
/// sits at `origin`. The crop is clamped to the image bounds and the frame's
/// origin follows the clamped rectangle.
pub fn crop_region(full: &DynamicImage, origin: Position, region: Region) -> ReplayResult<Frame> {
    let (w, h) = (full.width() as i64, full.height() as i64);
    let x1 = (region.x as i64 - origin.x as i64).clamp(0, w);
    let y1 = (region.y as i64 - origin.y as i64).clamp(0, h);
    let x2 = (region.x as i64 - origin.x as i64 + region.width as i64).min(w);
    let y2 = (region.y as i64 - origin.y as i64 + region.height as i64).min(h);
    if x2 <= x1 || y2 <= y1 {
        return Err(ReplayError::Capture(format!(
            "region {region:?} lies outside the captured {w}x{h} frame"
        )));
    }
    let image = full.crop_imm(x1 as u32, y1 as u32, (x2 - x1) as u32, (y2 - y1) as u32);
    Ok(Frame::new(
        image,
        Position::new(origin.x + x1 as i32, origin.y + y1 as i32),
    ))
}

fn capture_region_blocking(region: Region) -> ReplayResult<Frame> {
    let monitor = primary_monitor()?;
    let origin = Position::new(monitor.x(), monitor.y());
    let shot = monitor
        .capture_image()
        .map_err(|e| ReplayError::Capture(format!("capture monitor: {e}")))?;
    crop_region(&DynamicImage::ImageRgba8(shot), origin, region)
}

async fn run_blocking<F>(what: &'static str, f: F) -> Option<Frame>
where
    F: FnOnce() -> ReplayResult<Frame> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(frame)) => {
            tracing::debug!(
                what,
                width = frame.image.width(),
                height = frame.image.height(),
                x = frame.origin.x,
                y = frame.origin.y,
                "frame captured"
            );
            Some(frame)
        }
        Ok(Err(e)) => {
            tracing::warn!(what, error = %e, "capture failed");
            None
        }
        Err(e) => {
            tracing::warn!(what, error = %e, "capture task join failed");
            None
        }
    }
}

#[async_trait]
impl ScreenCapture for XcapCapture {
    async fn capture_window(&self, window_id: Option<u32>) -> Option<Frame> {
        match window_id.or(self.default_window) {
            Some(id) => run_blocking("window", move || capture_window_by_id(id)).await,
            None => run_blocking("monitor", capture_monitor).await,
        }
    }

    async fn capture_region(&self, region: Region) -> Option<Frame> {
        run_blocking("region", move || capture_region_blocking(region)).await
    }
}
