use opencv::prelude::*;
use opencv::{core, imgproc};

use crate::config::ScorerConfig;
use crate::error::Result;
use crate::image_io::crop;
use crate::opencv_compat;
use crate::types::Rect;

/// Scores how well a reference template is reproduced inside a test search window.
pub trait RegionScorer: Send + Sync {
    /// Similarity in [0, 100]; 0 when the window is smaller than the template.
    fn score(&self, template: &Mat, search_window: &Mat) -> Result<u8>;
}

#[derive(Debug, Clone, Default)]
pub struct NccScorer {
    pub config: ScorerConfig,
}

impl NccScorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }
}

impl RegionScorer for NccScorer {
    fn score(&self, template: &Mat, search_window: &Mat) -> Result<u8> {
        score_region(template, search_window, &self.config)
    }
}

pub fn gray_stddev(img: &Mat) -> opencv::Result<f64> {
    let gray = opencv_compat::to_gray(img)?;
    let mut mean = Mat::default();
    let mut stddev = Mat::default();
    core::mean_std_dev(&gray, &mut mean, &mut stddev, &core::no_array())?;
    Ok(*stddev.at_2d::<f64>(0, 0)?)
}

/// Normalised cross-correlation of the blurred template over the blurred
/// window, penalised by the share of strongly differing pixels at the best
/// alignment.
pub fn score_region(template: &Mat, search_window: &Mat, config: &ScorerConfig) -> Result<u8> {
    if template.empty()
        || search_window.empty()
        || search_window.cols() < template.cols()
        || search_window.rows() < template.rows()
    {
        return Ok(0);
    }

    // Flat regions carry nothing to compare and never count as defects.
    let stddev = gray_stddev(template)?;
    if stddev < config.low_texture_stddev {
        return Ok(100);
    }

    let (template, search_window) = if template.channels() == search_window.channels() {
        (template.try_clone()?, search_window.try_clone()?)
    } else {
        (opencv_compat::to_gray(template)?, opencv_compat::to_gray(search_window)?)
    };

    let mut blurred_template = Mat::default();
    let mut blurred_window = Mat::default();
    opencv_compat::gaussian_blur(&template, &mut blurred_template, config.blur_kernel)?;
    opencv_compat::gaussian_blur(&search_window, &mut blurred_window, config.blur_kernel)?;

    let mut correlation = Mat::default();
    opencv_compat::match_template(
        &blurred_window,
        &blurred_template,
        &mut correlation,
        imgproc::TM_CCOEFF_NORMED,
    )?;

    let mut max_val = 0.0;
    let mut max_loc = core::Point::default();
    core::min_max_loc(
        &correlation,
        None,
        Some(&mut max_val),
        None,
        Some(&mut max_loc),
        &core::no_array(),
    )?;
    let max_val = if max_val.is_finite() { max_val } else { 0.0 };
    let match_score = max_val.max(0.0) * 100.0;

    let (tw, th) = (blurred_template.cols(), blurred_template.rows());
    let aligned = crop(&blurred_window, Rect::new(max_loc.x, max_loc.y, tw, th))?;

    let mut diff = Mat::default();
    core::absdiff(&aligned, &blurred_template, &mut diff)?;
    let diff_gray = opencv_compat::to_gray(&diff)?;
    let mut mask = Mat::default();
    imgproc::threshold(&diff_gray, &mut mask, config.diff_threshold, 255.0, imgproc::THRESH_BINARY)?;
    let differing = core::count_non_zero(&mask)?;

    let diff_ratio = differing as f64 / (tw as f64 * th as f64);
    let penalty = if diff_ratio > config.diff_tolerance {
        diff_ratio * 100.0 * config.penalty_factor
    } else {
        0.0
    };

    let score = (match_score - penalty).clamp(0.0, 100.0).round() as u8;
    log::trace!(
        "score: ncc={:.3} at ({}, {}), diff_ratio={:.4}, penalty={:.1} -> {}",
        max_val,
        max_loc.x,
        max_loc.y,
        diff_ratio,
        penalty,
        score
    );
    Ok(score)
}
