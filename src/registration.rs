//! Feature-based registration of the test image onto the reference frame.
//!
//! Registration degrades through three tiers instead of failing:
//! a full homography warp, an identity fallback when matching is too weak to
//! estimate one, and a full-frame intersection crop when the warped safe crop
//! would be unusably small. Only a missing detector is reported as an error
//! the caller has to treat as fatal.

use opencv::prelude::*;
use opencv::{calib3d, core, features2d, imgproc};
use serde::Serialize;

use crate::config::{FeatureDetector, RegistrationConfig};
use crate::error::{InspectError, Result};
use crate::image_io::{crop, image_bounds};
use crate::opencv_compat;
use crate::types::Rect;

/// Which degradation tier produced a [`Registration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegistrationTier {
    Registered,
    IdentityFallback,
    IntersectionFallback,
}

/// Row-major 3x3 projective transform mapping test coordinates to reference coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography(pub [f64; 9]);

impl Homography {
    pub fn identity() -> Self {
        Homography([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0])
    }

    /// `None` for an empty or non-3x3 matrix.
    pub fn from_mat(mat: &Mat) -> opencv::Result<Option<Self>> {
        if mat.empty() || mat.rows() != 3 || mat.cols() != 3 {
            return Ok(None);
        }
        let mut m = Mat::default();
        mat.convert_to(&mut m, core::CV_64F, 1.0, 0.0)?;
        let data = m.data_typed::<f64>()?;
        let mut h = [0.0; 9];
        h.copy_from_slice(&data[..9]);
        Ok(Some(Homography(h)))
    }

    pub fn to_mat(&self) -> opencv::Result<Mat> {
        let h = &self.0;
        Mat::from_slice_2d(&[[h[0], h[1], h[2]], [h[3], h[4], h[5]], [h[6], h[7], h[8]]])
    }

    pub fn determinant(&self) -> f64 {
        let h = &self.0;
        h[0] * (h[4] * h[8] - h[5] * h[7]) - h[1] * (h[3] * h[8] - h[5] * h[6])
            + h[2] * (h[3] * h[7] - h[4] * h[6])
    }

    pub fn is_degenerate(&self) -> bool {
        self.0.iter().any(|v| !v.is_finite()) || self.determinant().abs() < 1e-9
    }

    /// Project a point; `None` when it maps to infinity.
    pub fn project(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let h = &self.0;
        let w = h[6] * x + h[7] * y + h[8];
        if w.abs() < 1e-12 {
            return None;
        }
        Some(((h[0] * x + h[1] * y + h[2]) / w, (h[3] * x + h[4] * y + h[5]) / w))
    }
}

/// Registered image pair, both cropped to `crop` in reference coordinates.
#[derive(Debug)]
pub struct Registration {
    pub aligned_reference: Mat,
    pub aligned_test: Mat,
    pub crop: Rect,
    pub tier: RegistrationTier,
    pub homography: Option<Homography>,
    pub good_matches: usize,
}

/// Keypoint locations in full-resolution image coordinates plus their descriptors.
#[derive(Debug)]
pub struct FeatureSet {
    pub points: Vec<core::Point2f>,
    pub descriptors: Mat,
}

/// Registration seam used by the grid scanner.
pub trait Registrar: Send + Sync {
    fn register(&self, reference: &Mat, test: &Mat) -> Result<Registration>;
}

#[derive(Debug, Clone, Default)]
pub struct FeatureRegistrar {
    pub config: RegistrationConfig,
}

impl FeatureRegistrar {
    pub fn new(config: RegistrationConfig) -> Self {
        Self { config }
    }
}

impl Registrar for FeatureRegistrar {
    fn register(&self, reference: &Mat, test: &Mat) -> Result<Registration> {
        register(reference, test, &self.config)
    }
}

fn capability(e: opencv::Error) -> InspectError {
    InspectError::CapabilityUnavailable(e.to_string())
}

/// Detect keypoints and descriptors on the grayscale image, optionally
/// CLAHE-enhanced and downscaled per the configured precision.
pub fn extract_features(img: &Mat, config: &RegistrationConfig) -> Result<FeatureSet> {
    let gray = opencv_compat::to_gray(img)?;

    let preprocessed = if config.use_clahe {
        let mut clahe = imgproc::create_clahe(2.0, core::Size::new(8, 8))?;
        let mut enhanced = Mat::default();
        clahe.apply(&gray, &mut enhanced)?;
        enhanced
    } else {
        gray
    };

    let scale = config.precision.detection_scale();
    let small = if scale < 1.0 {
        let mut resized = Mat::default();
        imgproc::resize(
            &preprocessed,
            &mut resized,
            core::Size::default(),
            scale,
            scale,
            imgproc::INTER_AREA,
        )?;
        resized
    } else {
        preprocessed
    };

    let mut keypoints = core::Vector::<core::KeyPoint>::new();
    let mut descriptors = Mat::default();
    let no_mask = Mat::default();

    match config.feature_detector {
        FeatureDetector::ORB => {
            let mut orb = opencv_compat::orb_create(config.precision.max_features()).map_err(capability)?;
            orb.detect_and_compute(&small, &no_mask, &mut keypoints, &mut descriptors, false)?;
        }
        FeatureDetector::AKAZE => {
            let mut akaze = opencv_compat::akaze_create().map_err(capability)?;
            akaze.detect_and_compute(&small, &no_mask, &mut keypoints, &mut descriptors, false)?;
        }
        FeatureDetector::SIFT => {
            let mut sift = opencv_compat::sift_create().map_err(capability)?;
            sift.detect_and_compute(&small, &no_mask, &mut keypoints, &mut descriptors, false)?;
        }
    }

    let points = keypoints
        .iter()
        .map(|kp| {
            let pt = kp.pt();
            core::Point2f::new(pt.x / scale as f32, pt.y / scale as f32)
        })
        .collect();

    Ok(FeatureSet { points, descriptors })
}

/// Brute-force nearest-neighbour matching, reference descriptors querying
/// into the test set, with cross-check.
pub fn match_features(reference: &FeatureSet, test: &FeatureSet, norm_type: i32) -> Result<Vec<core::DMatch>> {
    if reference.descriptors.empty() || test.descriptors.empty() {
        return Ok(Vec::new());
    }

    let mut matcher = features2d::BFMatcher::create(norm_type, true)?;
    let mut train_descriptors = core::Vector::<Mat>::new();
    train_descriptors.push(test.descriptors.try_clone()?);
    matcher.add(&train_descriptors)?;

    let mut matches = core::Vector::<core::DMatch>::new();
    matcher.match_(&reference.descriptors, &mut matches, &Mat::default())?;
    Ok(matches.to_vec())
}

/// Number of distance-sorted matches kept out of `total`.
pub fn good_match_count(total: usize, config: &RegistrationConfig) -> usize {
    let count = (total as f32 * config.match_keep_ratio) as usize;
    count
        .max(config.min_good_matches)
        .min(config.max_good_matches)
        .min(total)
}

pub fn select_good_matches(mut matches: Vec<core::DMatch>, config: &RegistrationConfig) -> Vec<core::DMatch> {
    matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    let count = good_match_count(matches.len(), config);
    matches.truncate(count);
    matches
}

/// Robustly estimate the test-to-reference homography. `None` when fewer than
/// four matches are available or the estimate is empty or degenerate.
pub fn estimate_homography(
    reference: &FeatureSet,
    test: &FeatureSet,
    good_matches: &[core::DMatch],
    reproj_threshold: f64,
) -> Result<Option<Homography>> {
    if good_matches.len() < 4 {
        return Ok(None);
    }

    let mut src_pts = core::Vector::<core::Point2f>::new();
    let mut dst_pts = core::Vector::<core::Point2f>::new();
    for m in good_matches {
        src_pts.push(test.points[m.train_idx as usize]);
        dst_pts.push(reference.points[m.query_idx as usize]);
    }

    let h = match calib3d::find_homography(
        &src_pts,
        &dst_pts,
        &mut Mat::default(),
        calib3d::RANSAC,
        reproj_threshold,
    ) {
        Ok(matrix) => matrix,
        Err(e) => {
            log::warn!("Homography estimation failed: {}", e);
            return Ok(None);
        }
    };

    Ok(Homography::from_mat(&h)?.filter(|h| !h.is_degenerate()))
}

/// Rectangle shared by both images when no warp is applied.
pub fn full_intersection(reference: (i32, i32), test: (i32, i32)) -> Rect {
    Rect::new(0, 0, reference.0.min(test.0).max(1), reference.1.min(test.1).max(1))
}

/// Projected corners this close to a pixel boundary are treated as on it.
const EDGE_EPSILON: f64 = 1e-3;

/// Inscribed axis-aligned rectangle holding only real content of both images
/// once the test image is warped into the reference frame. `None` when a
/// corner projects to infinity or the rectangle is below `min_size`.
pub fn safe_crop(h: &Homography, reference: (i32, i32), test: (i32, i32), min_size: i32) -> Option<Rect> {
    let (tw, th) = (test.0 as f64, test.1 as f64);
    let tl = h.project(0.0, 0.0)?;
    let tr = h.project(tw, 0.0)?;
    let br = h.project(tw, th)?;
    let bl = h.project(0.0, th)?;

    // Inward rounding: a partially covered edge pixel is blended with the border.
    let left = (tl.0.max(bl.0).max(0.0) - EDGE_EPSILON).ceil() as i32;
    let top = (tl.1.max(tr.1).max(0.0) - EDGE_EPSILON).ceil() as i32;
    let right = (tr.0.min(br.0).min(reference.0 as f64) + EDGE_EPSILON).floor() as i32;
    let bottom = (bl.1.min(br.1).min(reference.1 as f64) + EDGE_EPSILON).floor() as i32;

    let (width, height) = (right - left, bottom - top);
    if width < min_size || height < min_size {
        return None;
    }
    Some(Rect::new(left, top, width, height))
}

fn size_of(img: &Mat) -> (i32, i32) {
    (img.cols(), img.rows())
}

fn identity_fallback(reference: &Mat, test: &Mat, good_matches: usize) -> Result<Registration> {
    let rect = full_intersection(size_of(reference), size_of(test));
    log::warn!(
        "Registration fell back to identity ({} good matches), using intersection {}",
        good_matches,
        rect
    );
    Ok(Registration {
        aligned_reference: crop(reference, rect)?,
        aligned_test: crop(test, rect)?,
        crop: rect,
        tier: RegistrationTier::IdentityFallback,
        homography: None,
        good_matches,
    })
}

/// Register `test` onto `reference` and crop both to their shared safe region.
pub fn register(reference: &Mat, test: &Mat, config: &RegistrationConfig) -> Result<Registration> {
    if reference.empty() || test.empty() {
        return Err(InspectError::Registration("empty input image".to_string()));
    }
    let start = std::time::Instant::now();

    let ref_owned = reference.try_clone()?;
    let test_owned = test.try_clone()?;
    let (ref_features, test_features) = rayon::join(
        move || extract_features(&ref_owned, config),
        move || extract_features(&test_owned, config),
    );
    let (ref_features, test_features) = (ref_features?, test_features?);
    log::info!(
        "Detected {} reference / {} test keypoints using {}",
        ref_features.points.len(),
        test_features.points.len(),
        config.feature_detector
    );

    let matches = match_features(&ref_features, &test_features, config.feature_detector.norm_type())?;
    let total_matches = matches.len();
    let good = select_good_matches(matches, config);
    log::info!("Kept {} of {} cross-checked matches", good.len(), total_matches);

    let Some(h) = estimate_homography(&ref_features, &test_features, &good, config.ransac_reproj_threshold)? else {
        return identity_fallback(reference, test, good.len());
    };
    let registration = warp_and_crop(reference, test, h, good.len(), config)?;
    log::info!(
        "Registration {:?} in {:?}: crop {}",
        registration.tier,
        start.elapsed(),
        registration.crop
    );
    Ok(registration)
}

/// Warp `test` into the reference frame with `h` and crop both to the safe
/// region, or to the plain intersection when that region is too small.
pub fn warp_and_crop(
    reference: &Mat,
    test: &Mat,
    h: Homography,
    good_matches: usize,
    config: &RegistrationConfig,
) -> Result<Registration> {
    let mut warped = Mat::default();
    imgproc::warp_perspective(
        test,
        &mut warped,
        &h.to_mat()?,
        core::Size::new(reference.cols(), reference.rows()),
        imgproc::INTER_LINEAR,
        core::BORDER_CONSTANT,
        core::Scalar::all(0.0),
    )?;

    let (rect, tier) = match safe_crop(&h, size_of(reference), size_of(test), config.min_crop_size) {
        Some(rect) => (rect, RegistrationTier::Registered),
        None => {
            let rect = full_intersection(size_of(reference), size_of(test));
            log::warn!("Safe crop below {} px, using full-frame intersection {}", config.min_crop_size, rect);
            (rect, RegistrationTier::IntersectionFallback)
        }
    };
    let rect = rect
        .clamp_to(&image_bounds(reference))
        .clamp_to(&image_bounds(&warped));

    Ok(Registration {
        aligned_reference: crop(reference, rect)?,
        aligned_test: crop(&warped, rect)?,
        crop: rect,
        tier,
        homography: Some(h),
        good_matches,
    })
}
