//! Template matching by normalized cross-correlation (zero-mean, the
//! `TM_CCOEFF_NORMED` formulation) over 8-bit luma.
//!
//! Window sums and squared sums come from integral images, so only the
//! cross term costs a full template pass per candidate position. Large
//! searches first run on a downscaled copy of both images and then refine
//! the coarse peak inside a small neighbourhood at full resolution.

use std::ops::RangeInclusive;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};

/// Global maximum of the similarity surface, in haystack-local pixels
/// (top-left corner of the best window).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPeak {
    pub score: f32,
    pub x: u32,
    pub y: u32,
}

/// Seam for the similarity computation so the locator can be driven by a
/// scripted surface in tests.
pub trait TemplateMatcher: Send + Sync {
    /// `None` when the template cannot fit inside the haystack.
    fn best_match(&self, haystack: &DynamicImage, template: &DynamicImage) -> Option<MatchPeak>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NccMatcher;

impl TemplateMatcher for NccMatcher {
    fn best_match(&self, haystack: &DynamicImage, template: &DynamicImage) -> Option<MatchPeak> {
        let (hay, tpl) = (haystack.to_luma8(), template.to_luma8());
        match pyramid_scale(&hay, &tpl) {
            Some(scale) => match_template_coarse_to_fine(&hay, &tpl, scale),
            None => match_template(&hay, &tpl),
        }
    }
}

/// Coarse templates keep at least this many pixels on their short side.
const MIN_COARSE_SIDE: u32 = 8;
const MAX_SCALE: u32 = 4;
/// Multiply-adds below which the exhaustive scan is used as-is.
const EXHAUSTIVE_BUDGET: u64 = 50_000_000;

/// Downscale factor for a coarse pass, or `None` when the exhaustive scan is
/// cheap enough or the template is too small to shrink.
pub fn pyramid_scale(haystack: &GrayImage, template: &GrayImage) -> Option<u32> {
    let (hw, hh) = haystack.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > hw || th > hh {
        return None;
    }
    let positions = u64::from(hw - tw + 1) * u64::from(hh - th + 1);
    if positions * u64::from(tw) * u64::from(th) <= EXHAUSTIVE_BUDGET {
        return None;
    }
    let scale = (tw.min(th) / MIN_COARSE_SIDE).min(MAX_SCALE);
    (scale >= 2).then_some(scale)
}

/// Summed-area table with a zero row/column of padding.
struct Integral {
    stride: usize,
    sum: Vec<f64>,
    sq: Vec<f64>,
}

impl Integral {
    fn new(img: &GrayImage) -> Self {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0.0; stride * (h + 1)];
        let mut sq = vec![0.0; stride * (h + 1)];
        for y in 0..h {
            let mut row_sum = 0.0;
            let mut row_sq = 0.0;
            for x in 0..w {
                let v = img.get_pixel(x as u32, y as u32)[0] as f64;
                row_sum += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + (x + 1);
                sum[idx] = sum[idx - stride] + row_sum;
                sq[idx] = sq[idx - stride] + row_sq;
            }
        }
        Self { stride, sum, sq }
    }

    fn window(&self, table: &[f64], x: usize, y: usize, w: usize, h: usize) -> f64 {
        let s = self.stride;
        table[(y + h) * s + (x + w)] - table[y * s + (x + w)] - table[(y + h) * s + x]
            + table[y * s + x]
    }
}

const FLAT_EPSILON: f64 = 1e-9;

/// Precomputed template statistics plus the haystack tables.
struct Ncc {
    hay: Vec<f64>,
    hw: usize,
    integral: Integral,
    t_zero: Vec<f64>,
    t_var: f64,
    n: f64,
    tw: usize,
    th: usize,
}

impl Ncc {
    fn new(haystack: &GrayImage, template: &GrayImage) -> Self {
        let (tw, th) = (template.width() as usize, template.height() as usize);
        let n = (tw * th) as f64;
        let t_vals: Vec<f64> = template.pixels().map(|p| p[0] as f64).collect();
        let t_mean = t_vals.iter().sum::<f64>() / n;
        let t_zero: Vec<f64> = t_vals.iter().map(|v| v - t_mean).collect();
        let t_var: f64 = t_zero.iter().map(|v| v * v).sum();
        Self {
            hay: haystack.pixels().map(|p| p[0] as f64).collect(),
            hw: haystack.width() as usize,
            integral: Integral::new(haystack),
            t_zero,
            t_var,
            n,
            tw,
            th,
        }
    }

    fn score(&self, x: usize, y: usize) -> f64 {
        let (tw, th) = (self.tw, self.th);
        let s = self.integral.window(&self.integral.sum, x, y, tw, th);
        let ss = self.integral.window(&self.integral.sq, x, y, tw, th);
        let i_var = (ss - s * s / self.n).max(0.0);
        let denom = (self.t_var * i_var).sqrt();
        if denom <= FLAT_EPSILON {
            return 0.0;
        }

        let mut cross = 0.0;
        for ty in 0..th {
            let hay_row = &self.hay[(y + ty) * self.hw + x..][..tw];
            let t_row = &self.t_zero[ty * tw..][..tw];
            cross += hay_row.iter().zip(t_row).map(|(h, t)| h * t).sum::<f64>();
        }
        (cross / denom).clamp(-1.0, 1.0)
    }

    /// Best window whose top-left corner lies in `xs` × `ys`.
    fn scan(&self, xs: RangeInclusive<usize>, ys: RangeInclusive<usize>) -> MatchPeak {
        let mut best = MatchPeak { score: f32::MIN, x: 0, y: 0 };
        for y in ys {
            for x in xs.clone() {
                let score = self.score(x, y) as f32;
                if score > best.score {
                    best = MatchPeak { score, x: x as u32, y: y as u32 };
                }
            }
        }
        best
    }
}

/// Best zero-mean normalized correlation of `template` over `haystack`,
/// scanning every position. Flat windows (no variance in either image)
/// score 0.
pub fn match_template(haystack: &GrayImage, template: &GrayImage) -> Option<MatchPeak> {
    let (hw, hh) = (haystack.width() as usize, haystack.height() as usize);
    let (tw, th) = (template.width() as usize, template.height() as usize);
    if tw == 0 || th == 0 || tw > hw || th > hh {
        return None;
    }
    Some(Ncc::new(haystack, template).scan(0..=(hw - tw), 0..=(hh - th)))
}

/// Locate the peak on copies shrunk by `scale`, then rescan `±2 * scale`
/// pixels around it at full resolution. The reported score is the
/// full-resolution one.
pub fn match_template_coarse_to_fine(
    haystack: &GrayImage,
    template: &GrayImage,
    scale: u32,
) -> Option<MatchPeak> {
    if scale < 2 {
        return match_template(haystack, template);
    }
    let (hw, hh) = haystack.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > hw || th > hh {
        return None;
    }

    let shrink = |img: &GrayImage| {
        let w = (img.width() / scale).max(1);
        let h = (img.height() / scale).max(1);
        imageops::resize(img, w, h, FilterType::Triangle)
    };
    let coarse = match_template(&shrink(haystack), &shrink(template))?;

    let (max_x, max_y) = ((hw - tw) as usize, (hh - th) as usize);
    let cx = ((coarse.x * scale) as usize).min(max_x);
    let cy = ((coarse.y * scale) as usize).min(max_y);
    let reach = (2 * scale) as usize;
    let xs = cx.saturating_sub(reach)..=(cx + reach).min(max_x);
    let ys = cy.saturating_sub(reach)..=(cy + reach).min(max_y);
    Some(Ncc::new(haystack, template).scan(xs, ys))
}
