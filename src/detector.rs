//! Remote full-image detector path.
//!
//! The detector itself is an opaque remote call. This module prepares the
//! upload, parses its answer and turns normalised boxes into final defects,
//! bypassing grid scan and fusion.

use opencv::prelude::*;
use serde::{Deserialize, Serialize};

use crate::image_io::{encode_jpeg, UPLOAD_JPEG_QUALITY};
use crate::types::{DefectCategory, FinalDefect, Rect};

/// Box coordinates are expressed in this many units per image side.
pub const NORMALIZED_EXTENT: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// `[x0, y0, x1, y1]` in `[0, 1000]` units.
    pub box_2d: [i32; 4],
    #[serde(alias = "label")]
    pub category: DefectCategory,
    #[serde(default)]
    pub description: String,
}

pub trait RemoteDetector {
    fn detect(&self, reference_jpeg: &[u8], test_jpeg: &[u8]) -> anyhow::Result<Vec<Detection>>;
}

pub fn parse_detections(json: &str) -> anyhow::Result<Vec<Detection>> {
    Ok(serde_json::from_str(json)?)
}

/// Scale normalised boxes onto a `width` x `height` image. Reversed corners
/// are reordered; every rectangle ends up inside the image and at least 1x1.
pub fn defects_from_detections(detections: &[Detection], width: i32, height: i32) -> Vec<FinalDefect> {
    let bounds = Rect::new(0, 0, width.max(1), height.max(1));
    let scale = |v: i32, extent: i32| (v as f64 * extent as f64 / NORMALIZED_EXTENT).round() as i32;

    detections
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let [x0, y0, x1, y1] = d.box_2d;
            let (left, right) = (x0.min(x1), x0.max(x1));
            let (top, bottom) = (y0.min(y1), y0.max(y1));
            let x = scale(left, width);
            let y = scale(top, height);
            let rect = Rect::new(x, y, scale(right, width) - x, scale(bottom, height) - y).clamp_to(&bounds);
            FinalDefect {
                id: i + 1,
                rect,
                description: (!d.description.is_empty()).then(|| d.description.clone()),
                category: Some(d.category),
                confident: true,
            }
        })
        .collect()
}

/// Encode both working images, query the detector and map its answer onto
/// the reference image.
pub fn detect_defects(detector: &dyn RemoteDetector, reference: &Mat, test: &Mat) -> anyhow::Result<Vec<FinalDefect>> {
    let reference_jpeg = encode_jpeg(reference, UPLOAD_JPEG_QUALITY)?;
    let test_jpeg = encode_jpeg(test, UPLOAD_JPEG_QUALITY)?;
    log::info!(
        "Querying remote detector ({} + {} bytes)",
        reference_jpeg.len(),
        test_jpeg.len()
    );

    let detections = detector.detect(&reference_jpeg, &test_jpeg)?;
    let defects = defects_from_detections(&detections, reference.cols(), reference.rows());
    log::info!("Remote detector reported {} defects", defects.len());
    Ok(defects)
}
