//! Thin wrappers over OpenCV calls whose generated signatures differ between
//! OpenCV releases.
//!
//! OpenCV 4.11 added an `AlgorithmHint` argument to colour conversion and
//! blurring, 4.8 extended `SIFT::create` and 4.7 extended `AKAZE::create`.
//! The `_def` variants exist in every supported version and apply OpenCV's
//! own defaults for the trailing parameters, so everything here goes through
//! them.

use opencv::core::{ToInputArray, ToOutputArray};
use opencv::prelude::*;
use opencv::{core, features2d, imgproc, Result};

/// Convert any 1, 3 or 4 channel 8-bit image to single-channel grayscale.
/// Single-channel input is returned as an owned copy.
pub fn to_gray(img: &Mat) -> Result<Mat> {
    let code = match img.channels() {
        1 => return img.try_clone(),
        4 => imgproc::COLOR_BGRA2GRAY,
        _ => imgproc::COLOR_BGR2GRAY,
    };
    let mut gray = Mat::default();
    imgproc::cvt_color_def(img, &mut gray, code)?;
    Ok(gray)
}

/// Gaussian blur with a square kernel; sigma derived from the kernel size.
pub fn gaussian_blur(src: &impl ToInputArray, dst: &mut impl ToOutputArray, ksize: i32) -> Result<()> {
    imgproc::gaussian_blur_def(src, dst, core::Size::new(ksize, ksize), 0.0)
}

/// Template matching without a mask.
pub fn match_template(
    image: &impl ToInputArray,
    templ: &impl ToInputArray,
    result: &mut impl ToOutputArray,
    method: i32,
) -> Result<()> {
    imgproc::match_template_def(image, templ, result, method)
}

/// ORB tuned for dense detection on low-contrast assemblies.
/// `ORB::create` has kept the same arity across all supported versions.
pub fn orb_create(max_features: i32) -> Result<core::Ptr<features2d::ORB>> {
    features2d::ORB::create(
        max_features,
        1.2, // scaleFactor
        8,   // nlevels
        15,  // edgeThreshold, below the default 31 to keep features near borders
        0,   // firstLevel
        2,   // WTA_K
        features2d::ORB_ScoreType::HARRIS_SCORE,
        31, // patchSize
        10, // fastThreshold, below the default 20 for weak texture
    )
}

/// AKAZE with default parameters; no keypoint cap on older releases.
pub fn akaze_create() -> Result<core::Ptr<features2d::AKAZE>> {
    features2d::AKAZE::create_def()
}

/// SIFT with default parameters (unlimited features).
pub fn sift_create() -> Result<core::Ptr<features2d::SIFT>> {
    features2d::SIFT::create_def()
}
