//! Reference-vs-test image comparison.
//!
//! A scan registers the test image onto the reference, tiles the shared
//! working area into a grid, scores each cell by template matching and fuses
//! the cells that fall below the defect threshold into final defect boxes.

pub mod config;
pub mod detector;
pub mod error;
pub mod fusion;
pub mod grid;
pub mod image_io;
pub mod logger;
pub mod opencv_compat;
pub mod registration;
pub mod scan;
pub mod session;
pub mod settings;
pub mod similarity;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::{GridStrategy, InspectionConfig, RegistrationConfig, ScanConfig, ScorerConfig};
pub use error::{InspectError, Result};
pub use registration::{Registration, RegistrationTier};
pub use scan::{CancellationToken, GridScanner, ScanEvent, ScanObserver, ScanOutcome, ScanReport, ScanState};
pub use session::Inspector;
pub use types::{CellStatus, DefectCategory, FinalDefect, GridCell, Rect, ScanSession};
