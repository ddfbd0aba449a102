use anyhow::{Context, Result, bail};
use fast_image_resize as fir;
use image::RgbaImage;

use crate::processing::fit::Rect;

/// Largest size with the same aspect that fits inside `max_dim` on both axes.
/// Never enlarges.
pub fn bounded_size(width: u32, height: u32, max_dim: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_dim || longest == 0 {
        return (width, height);
    }
    let scale = f64::from(max_dim) / f64::from(longest);
    let w = (f64::from(width) * scale).round().max(1.0) as u32;
    let h = (f64::from(height) * scale).round().max(1.0) as u32;
    (w, h)
}

pub fn resize_rgba(source: &RgbaImage, target_w: u32, target_h: u32) -> Result<RgbaImage> {
    if source.width() == target_w && source.height() == target_h {
        return Ok(source.clone());
    }
    resample_region(
        source,
        Rect::from_size(f64::from(source.width()), f64::from(source.height())),
        target_w,
        target_h,
    )
}

/// Resamples `region` of `source` (clamped to its bounds) into a
/// `target_w x target_h` image.
pub fn resample_region(
    source: &RgbaImage,
    region: Rect,
    target_w: u32,
    target_h: u32,
) -> Result<RgbaImage> {
    if target_w == 0 || target_h == 0 {
        bail!("resample dimensions must be positive");
    }
    let bounds = Rect::from_size(f64::from(source.width()), f64::from(source.height()));
    let region = region.intersection(&bounds);
    if region.is_empty() {
        bail!("resample region lies outside the source image");
    }

    let src_view = fir::images::ImageRef::new(
        source.width(),
        source.height(),
        source.as_raw(),
        fir::PixelType::U8x4,
    )
    .context("failed to create source view for resample")?;
    let mut dst_image = fir::images::Image::new(target_w, target_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .crop(region.x, region.y, region.width, region.height)
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::CatmullRom));
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_view, &mut dst_image, Some(&options))
        .context("resample failed")?;
    RgbaImage::from_raw(target_w, target_h, dst_image.into_vec())
        .context("failed to construct resampled RGBA image")
}
