use serde::{Deserialize, Serialize};

use crate::error::{InspectError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureDetector {
    ORB,
    SIFT,
    AKAZE,
}

impl FeatureDetector {
    /// Distance norm matching the descriptor layout of the detector.
    pub fn norm_type(&self) -> i32 {
        match self {
            FeatureDetector::ORB => opencv::core::NORM_HAMMING,   // Binary descriptors
            FeatureDetector::AKAZE => opencv::core::NORM_HAMMING, // Binary descriptors
            FeatureDetector::SIFT => opencv::core::NORM_L2,       // Float descriptors
        }
    }
}

impl std::fmt::Display for FeatureDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureDetector::ORB => write!(f, "ORB (Fast)"),
            FeatureDetector::SIFT => write!(f, "SIFT (Best Quality)"),
            FeatureDetector::AKAZE => write!(f, "AKAZE (Balanced)"),
        }
    }
}

/// Trade-off between registration accuracy and latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationPrecision {
    HighPrecision,
    Interactive,
}

impl RegistrationPrecision {
    pub fn max_features(&self) -> i32 {
        match self {
            RegistrationPrecision::HighPrecision => 5000,
            RegistrationPrecision::Interactive => 1500,
        }
    }

    /// Downscale applied before detection; keypoints are scaled back afterwards.
    pub fn detection_scale(&self) -> f64 {
        match self {
            RegistrationPrecision::HighPrecision => 1.0,
            RegistrationPrecision::Interactive => 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    pub feature_detector: FeatureDetector,
    pub precision: RegistrationPrecision,
    pub use_clahe: bool,
    /// Fraction of distance-sorted matches kept for estimation.
    pub match_keep_ratio: f32,
    pub min_good_matches: usize,
    pub max_good_matches: usize,
    pub ransac_reproj_threshold: f64,
    /// Safe crops narrower or shorter than this fall back to the full-frame intersection.
    pub min_crop_size: i32,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            feature_detector: FeatureDetector::ORB,
            precision: RegistrationPrecision::HighPrecision,
            use_clahe: false,
            match_keep_ratio: 0.15,
            min_good_matches: 10,
            max_good_matches: 500,
            ransac_reproj_threshold: 5.0,
            min_crop_size: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    /// Templates whose grayscale stddev is below this are treated as featureless.
    pub low_texture_stddev: f64,
    /// Odd Gaussian kernel size used to absorb residual misalignment.
    pub blur_kernel: i32,
    pub diff_threshold: f64,
    pub diff_tolerance: f64,
    pub penalty_factor: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            low_texture_stddev: 10.0,
            blur_kernel: 3,
            diff_threshold: 45.0,
            diff_tolerance: 0.02,
            penalty_factor: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridStrategy {
    /// Cells of a fixed size, edge cells clamped to the remaining extent.
    FixedCellSize { width: i32, height: i32 },
    /// `per_axis` x `per_axis` cells tiling the image exactly.
    FixedCellCount { per_axis: i32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub grid: GridStrategy,
    /// Search window padding per side, as a fraction of the cell size.
    pub search_padding: f64,
    /// Cells scoring below this are defects.
    pub defect_threshold: u8,
    pub fusion_tolerance: i32,
    /// Number of cell workers. 1 keeps the scan strictly sequential.
    pub worker_count: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            grid: GridStrategy::FixedCellSize {
                width: 200,
                height: 200,
            },
            search_padding: 0.30,
            defect_threshold: 85,
            fusion_tolerance: 5,
            worker_count: 1,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InspectionConfig {
    pub registration: RegistrationConfig,
    pub scorer: ScorerConfig,
    pub scan: ScanConfig,
}

impl InspectionConfig {
    pub fn validate(&self) -> Result<()> {
        let reg = &self.registration;
        if !(reg.match_keep_ratio > 0.0 && reg.match_keep_ratio <= 1.0) {
            return Err(InspectError::Config(format!(
                "match_keep_ratio must be in (0, 1], got {}",
                reg.match_keep_ratio
            )));
        }
        if reg.max_good_matches < reg.min_good_matches {
            return Err(InspectError::Config(
                "max_good_matches must not be below min_good_matches".to_string(),
            ));
        }
        if reg.ransac_reproj_threshold <= 0.0 || reg.min_crop_size < 1 {
            return Err(InspectError::Config(
                "ransac threshold and minimum crop size must be positive".to_string(),
            ));
        }
        if self.scorer.blur_kernel < 1 || self.scorer.blur_kernel % 2 == 0 {
            return Err(InspectError::Config(format!(
                "blur_kernel must be odd and positive, got {}",
                self.scorer.blur_kernel
            )));
        }
        match self.scan.grid {
            GridStrategy::FixedCellSize { width, height } if width < 1 || height < 1 => {
                return Err(InspectError::Config(format!(
                    "cell size must be at least 1x1, got {}x{}",
                    width, height
                )));
            }
            GridStrategy::FixedCellCount { per_axis } if per_axis < 1 => {
                return Err(InspectError::Config(format!(
                    "cell count must be positive, got {}",
                    per_axis
                )));
            }
            _ => {}
        }
        if self.scan.search_padding < 0.0 || self.scan.defect_threshold > 100 {
            return Err(InspectError::Config(
                "search_padding must be non-negative and defect_threshold at most 100".to_string(),
            ));
        }
        if self.scan.worker_count == 0 {
            return Err(InspectError::Config("worker_count must be at least 1".to_string()));
        }
        Ok(())
    }
}
