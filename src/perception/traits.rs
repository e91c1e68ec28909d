use async_trait::async_trait;
use image::DynamicImage;

use crate::errors::ReplayResult;
use crate::perception::types::{Position, Region, TextRegion};

/// A captured image and the absolute screen point of its top-left pixel.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: DynamicImage,
    pub origin: Position,
}

impl Frame {
    pub fn new(image: DynamicImage, origin: Position) -> Self {
        Self { image, origin }
    }

    /// Translate an image-local point to screen coordinates.
    pub fn to_screen(&self, local: Position) -> Position {
        local.offset(self.origin)
    }
}

/// Frame acquisition. Failures surface as `None`, never as errors.
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    /// Capture a window by platform id, or the default target when `None`.
    async fn capture_window(&self, window_id: Option<u32>) -> Option<Frame>;

    /// Capture an absolute screen rectangle. The frame may be smaller than
    /// `region` when it reaches past the screen edge.
    async fn capture_region(&self, region: Region) -> Option<Frame>;
}

/// Text localisation inside a single image.
///
/// Implementors only have to provide `recognize`; the lookups are derived
/// from it but may be overridden by engines that can search directly.
#[async_trait]
pub trait OcrAdapter: Send + Sync {
    async fn recognize(&self, image: &DynamicImage) -> ReplayResult<Vec<TextRegion>>;

    /// Centre of the first region whose text contains `text`, image-local.
    async fn find_text(&self, image: &DynamicImage, text: &str) -> ReplayResult<Option<Position>> {
        let regions = self.recognize(image).await?;
        Ok(regions
            .iter()
            .find(|r| r.text.contains(text))
            .map(TextRegion::center))
    }

    async fn find_all_text(&self, image: &DynamicImage, text: &str) -> ReplayResult<Vec<Position>> {
        let regions = self.recognize(image).await?;
        Ok(regions
            .iter()
            .filter(|r| r.text.contains(text))
            .map(TextRegion::center)
            .collect())
    }

    /// Best region scoring at least `threshold` under [`text_similarity`].
    async fn find_text_fuzzy(
        &self,
        image: &DynamicImage,
        text: &str,
        threshold: f32,
    ) -> ReplayResult<Option<Position>> {
        let regions = self.recognize(image).await?;
        let mut best: Option<(&TextRegion, f32)> = None;
        for region in &regions {
            let score = text_similarity(text, &region.text);
            if score >= threshold && best.map_or(true, |(_, s)| score > s) {
                best = Some((region, score));
            }
        }
        Ok(best.map(|(r, _)| r.center()))
    }
}

/// Cheap similarity in [0, 1]: exact match is 1, containment scores by length
/// ratio, otherwise the share of `a`'s characters that occur in `b`.
pub fn text_similarity(a: &str, b: &str) -> f32 {
    if a == b {
        return 1.0;
    }
    let (la, lb) = (a.chars().count(), b.chars().count());
    let longest = la.max(lb);
    if longest == 0 {
        return 0.0;
    }
    if a.contains(b) || b.contains(a) {
        return la.min(lb) as f32 / longest as f32;
    }
    let common = a.chars().filter(|c| b.contains(*c)).count();
    common as f32 / longest as f32
}
