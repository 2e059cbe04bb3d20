use anyhow::Result;
use opencv::prelude::*;
use opencv::{core, imgcodecs};
use std::path::Path;

use crate::types::Rect;

/// JPEG quality used when preparing images for the remote detector.
pub const UPLOAD_JPEG_QUALITY: i32 = 90;

/// Load an image from disk with timing and logging
pub fn load_image(path: &Path) -> Result<Mat> {
    let start = std::time::Instant::now();
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid path encoding: {}", path.display()))?;

    let img = imgcodecs::imread(path_str, imgcodecs::IMREAD_COLOR)?;
    if img.empty() {
        return Err(anyhow::anyhow!("Failed to decode image: {}", path.display()));
    }

    log::info!(
        "Loaded {} in {:?} - Size: {}x{}, Channels: {}",
        path.display(),
        start.elapsed(),
        img.cols(),
        img.rows(),
        img.channels()
    );
    Ok(img)
}

/// Decode an in-memory encoded image (PNG, JPEG, ...) into a colour buffer.
pub fn decode_image(bytes: &[u8]) -> Result<Mat> {
    let buf = core::Vector::<u8>::from_slice(bytes);
    let img = imgcodecs::imdecode(&buf, imgcodecs::IMREAD_COLOR)?;
    if img.empty() {
        return Err(anyhow::anyhow!("Failed to decode {} bytes of image data", bytes.len()));
    }
    Ok(img)
}

pub fn encode_jpeg(img: &Mat, quality: i32) -> Result<Vec<u8>> {
    let mut buf = core::Vector::<u8>::new();
    let mut params = core::Vector::<i32>::new();
    params.push(imgcodecs::IMWRITE_JPEG_QUALITY);
    params.push(quality.clamp(1, 100));

    if !imgcodecs::imencode(".jpg", img, &mut buf, &params)? {
        return Err(anyhow::anyhow!("Failed to encode image as JPEG"));
    }
    Ok(buf.to_vec())
}

pub fn image_bounds(img: &Mat) -> Rect {
    Rect::new(0, 0, img.cols(), img.rows())
}

/// Copy `rect` out of `img` into a new owned buffer. `rect` must lie inside the image.
pub fn crop(img: &Mat, rect: Rect) -> opencv::Result<Mat> {
    let roi = Mat::roi(img, rect.into())?;
    let mut cropped = Mat::default();
    roi.copy_to(&mut cropped)?;
    Ok(cropped)
}

/// Copy `rect` out of `img`, producing a buffer of exactly `rect` size.
/// Pixels of `rect` outside the image are zero.
pub fn crop_padded(img: &Mat, rect: Rect) -> opencv::Result<Mat> {
    let Some(inside) = rect.intersection(&image_bounds(img)) else {
        return Mat::new_rows_cols_with_default(
            rect.height.max(1),
            rect.width.max(1),
            img.typ(),
            core::Scalar::all(0.0),
        );
    };

    let src = crop(img, inside)?;
    let mut padded = Mat::default();
    core::copy_make_border(
        &src,
        &mut padded,
        inside.y - rect.y,
        rect.bottom() - inside.bottom(),
        inside.x - rect.x,
        rect.right() - inside.right(),
        core::BORDER_CONSTANT,
        core::Scalar::all(0.0),
    )?;
    Ok(padded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::block_noise;

    #[test]
    fn test_crop_is_independent_copy() -> anyhow::Result<()> {
        let img = block_noise(100, 80, 8, 60, 120, 1)?;
        let mut cropped = crop(&img, Rect::new(10, 20, 30, 40))?;
        assert_eq!((cropped.cols(), cropped.rows()), (30, 40));

        let original = *img.at_2d::<core::Vec3b>(20, 10)?;
        cropped.at_2d_mut::<core::Vec3b>(0, 0)?[0] = original[0].wrapping_add(1);
        assert_eq!(*img.at_2d::<core::Vec3b>(20, 10)?, original);
        Ok(())
    }

    #[test]
    fn test_crop_padded_fills_outside_with_zero() -> anyhow::Result<()> {
        let img = Mat::new_rows_cols_with_default(50, 50, core::CV_8UC3, core::Scalar::all(200.0))?;
        let padded = crop_padded(&img, Rect::new(30, 30, 40, 40))?;
        assert_eq!((padded.cols(), padded.rows()), (40, 40));
        assert_eq!(padded.at_2d::<core::Vec3b>(0, 0)?[0], 200);
        assert_eq!(padded.at_2d::<core::Vec3b>(19, 19)?[0], 200);
        assert_eq!(padded.at_2d::<core::Vec3b>(20, 20)?[0], 0);
        assert_eq!(padded.at_2d::<core::Vec3b>(39, 0)?[0], 0);
        Ok(())
    }

    #[test]
    fn test_jpeg_roundtrip_keeps_size() -> anyhow::Result<()> {
        let img = block_noise(64, 48, 8, 0, 255, 2)?;
        let bytes = encode_jpeg(&img, UPLOAD_JPEG_QUALITY)?;
        let decoded = decode_image(&bytes)?;
        assert_eq!((decoded.cols(), decoded.rows()), (64, 48));
        Ok(())
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode_image(&[0u8, 1, 2, 3]).is_err());
    }
}
