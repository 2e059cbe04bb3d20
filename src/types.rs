use opencv::core;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in reference-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }

    pub fn is_empty(&self) -> bool {
        self.width < 1 || self.height < 1
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Smallest rectangle covering both.
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(x, y, right - x, bottom - y)
    }

    /// Overlap of both rectangles, `None` when they are disjoint.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right > x && bottom > y {
            Some(Rect::new(x, y, right - x, bottom - y))
        } else {
            None
        }
    }

    /// True unless the rectangles are separated by more than `tolerance`
    /// pixels along either axis.
    pub fn touches(&self, other: &Rect, tolerance: i32) -> bool {
        let separated = other.x > self.right() + tolerance
            || self.x > other.right() + tolerance
            || other.y > self.bottom() + tolerance
            || self.y > other.bottom() + tolerance;
        !separated
    }

    /// Clamp into `bounds`, keeping width and height at least one pixel.
    pub fn clamp_to(&self, bounds: &Rect) -> Rect {
        let x = self.x.clamp(bounds.x, (bounds.right() - 1).max(bounds.x));
        let y = self.y.clamp(bounds.y, (bounds.bottom() - 1).max(bounds.y));
        let right = self.right().min(bounds.right()).max(x + 1);
        let bottom = self.bottom().min(bounds.bottom()).max(y + 1);
        Rect::new(x, y, right - x, bottom - y)
    }
}

impl From<core::Rect> for Rect {
    fn from(r: core::Rect) -> Self {
        Rect::new(r.x, r.y, r.width, r.height)
    }
}

impl From<Rect> for core::Rect {
    fn from(r: Rect) -> Self {
        core::Rect::new(r.x, r.y, r.width, r.height)
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{} at ({}, {})", self.width, self.height, self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellStatus {
    Pending,
    Analyzing,
    Ok,
    Defect,
    /// Scoring raised an error; the cell is skipped and never counts as a defect.
    Unscored,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub id: usize,
    pub rect: Rect,
    /// Similarity score in [0, 100].
    pub score: u8,
    pub status: CellStatus,
}

impl GridCell {
    pub fn new(id: usize, rect: Rect) -> Self {
        Self {
            id,
            rect,
            score: 0,
            status: CellStatus::Pending,
        }
    }
}

/// Closed category set reported by the remote detector. Unknown labels map to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum DefectCategory {
    Missing,
    Extra,
    Misaligned,
    Other,
}

impl From<String> for DefectCategory {
    fn from(label: String) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "missing" => DefectCategory::Missing,
            "extra" => DefectCategory::Extra,
            "misaligned" => DefectCategory::Misaligned,
            _ => DefectCategory::Other,
        }
    }
}

/// Terminal output unit of a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalDefect {
    /// Sequential, 1-based, derived from final rectangle order.
    pub id: usize,
    pub rect: Rect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<DefectCategory>,
    pub confident: bool,
}

/// Transient progress state of the running scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanSession {
    pub progress: u8,
    pub current_step: String,
    pub aborted: bool,
}
