use crate::config::GridStrategy;
use crate::types::{GridCell, Rect};

/// Partition a `width` x `height` working area into pending cells, row-major.
pub fn build_grid(width: i32, height: i32, strategy: GridStrategy) -> Vec<GridCell> {
    if width < 1 || height < 1 {
        return Vec::new();
    }
    let rects = match strategy {
        GridStrategy::FixedCellSize {
            width: cell_w,
            height: cell_h,
        } => fixed_size_rects(width, height, cell_w.max(1), cell_h.max(1)),
        GridStrategy::FixedCellCount { per_axis } => fixed_count_rects(width, height, per_axis.max(1)),
    };
    rects
        .into_iter()
        .enumerate()
        .map(|(id, rect)| GridCell::new(id, rect))
        .collect()
}

fn fixed_size_rects(width: i32, height: i32, cell_w: i32, cell_h: i32) -> Vec<Rect> {
    let mut rects = Vec::new();
    for y in (0..height).step_by(cell_h as usize) {
        for x in (0..width).step_by(cell_w as usize) {
            rects.push(Rect::new(x, y, cell_w.min(width - x), cell_h.min(height - y)));
        }
    }
    rects
}

/// Cell edges sit at `round(i * extent / n)`, so the cells tile the area
/// exactly even when `n` does not divide it. More cells than pixels along an
/// axis collapse to one cell per pixel.
fn fixed_count_rects(width: i32, height: i32, per_axis: i32) -> Vec<Rect> {
    let xs = edges(width, per_axis);
    let ys = edges(height, per_axis);
    let mut rects = Vec::with_capacity((xs.len() - 1) * (ys.len() - 1));
    for row in ys.windows(2) {
        for col in xs.windows(2) {
            rects.push(Rect::new(col[0], row[0], col[1] - col[0], row[1] - row[0]));
        }
    }
    rects
}

fn edges(extent: i32, n: i32) -> Vec<i32> {
    let n = n.min(extent);
    let step = extent as f64 / n as f64;
    (0..=n).map(|i| (i as f64 * step).round() as i32).collect()
}
