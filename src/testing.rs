//! Deterministic synthetic images for tests.

use opencv::prelude::*;
use opencv::{core, imgproc};

use crate::types::Rect;

/// Fixed-seed LCG so textures are identical across runs.
struct Lcg(u64);

impl Lcg {
    fn next_u8_in(&mut self, lo: u8, hi: u8) -> u8 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let span = (hi - lo) as u64 + 1;
        lo + ((self.0 >> 33) % span) as u8
    }
}

/// Gray block noise replicated into three channels; every `block`x`block`
/// square gets one random value in `[lo, hi]`.
pub fn block_noise(width: i32, height: i32, block: i32, lo: u8, hi: u8, seed: u64) -> opencv::Result<Mat> {
    let mut img = Mat::new_rows_cols_with_default(height, width, core::CV_8UC3, core::Scalar::all(0.0))?;
    let blocks_x = (width + block - 1) / block;
    let blocks_y = (height + block - 1) / block;
    let mut rng = Lcg(seed);
    let values: Vec<u8> = (0..blocks_x * blocks_y).map(|_| rng.next_u8_in(lo, hi)).collect();

    let data = img.data_bytes_mut()?;
    for y in 0..height {
        for x in 0..width {
            let v = values[((y / block) * blocks_x + x / block) as usize];
            let idx = ((y * width + x) * 3) as usize;
            data[idx..idx + 3].fill(v);
        }
    }
    Ok(img)
}

pub fn flat(width: i32, height: i32, value: f64) -> opencv::Result<Mat> {
    Mat::new_rows_cols_with_default(height, width, core::CV_8UC3, core::Scalar::all(value))
}

/// Copy of `img` with `rect` filled by a solid gray `value`.
pub fn with_patch(img: &Mat, rect: Rect, value: f64) -> opencv::Result<Mat> {
    let mut out = img.try_clone()?;
    imgproc::rectangle(
        &mut out,
        rect.into(),
        core::Scalar::all(value),
        imgproc::FILLED,
        imgproc::LINE_8,
        0,
    )?;
    Ok(out)
}
