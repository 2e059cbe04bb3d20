use crate::types::{FinalDefect, Rect};

pub const DEFAULT_TOLERANCE: i32 = 5;

/// Merge rectangles lying within `tolerance` pixels of each other into their
/// bounding unions until no pair touches. Each merge removes one rectangle,
/// so the loop ends after at most `rects.len()` merges.
pub fn fuse(rects: &[Rect], tolerance: i32) -> Vec<Rect> {
    let mut working = rects.to_vec();
    loop {
        let mut merged = false;
        let mut i = 0;
        while i < working.len() {
            let mut j = i + 1;
            while j < working.len() {
                if working[i].touches(&working[j], tolerance) {
                    working[i] = working[i].union(&working[j]);
                    working.remove(j);
                    merged = true;
                } else {
                    j += 1;
                }
            }
            i += 1;
        }
        if !merged {
            return working;
        }
    }
}

/// Number fused rectangles in output order.
pub fn to_final_defects(rects: Vec<Rect>) -> Vec<FinalDefect> {
    rects
        .into_iter()
        .enumerate()
        .map(|(i, rect)| FinalDefect {
            id: i + 1,
            rect,
            description: Some("Region differs from reference".to_string()),
            category: None,
            confident: true,
        })
        .collect()
}
