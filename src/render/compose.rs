use anyhow::Result;
use image::{Rgba, RgbaImage, imageops};

use crate::frame::PixelFormat;
use crate::processing::fit::{FitPlan, Rect};
use crate::processing::resample::resample_region;

const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// A finished framebuffer in the surface's pixel layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub bytes: Vec<u8>,
}

impl ComposedFrame {
    /// Back to RGBA regardless of the surface layout.
    pub fn to_rgba_image(&self) -> Option<RgbaImage> {
        let mut bytes = self.bytes.clone();
        if self.format == PixelFormat::Bgra8 {
            swap_red_blue(&mut bytes);
        }
        RgbaImage::from_raw(self.width, self.height, bytes)
    }
}

/// Clears an output-sized canvas and resamples the plan's source region into
/// its content rect. Surface coordinates have a top-left origin.
pub fn compose(source: &RgbaImage, plan: &FitPlan, format: PixelFormat) -> Result<ComposedFrame> {
    let (width, height) = plan.output_size();
    let mut canvas = RgbaImage::from_pixel(width, height, CLEAR);

    let out = plan.output_rect();
    let visible = plan.content.intersection(&out);
    let x0 = visible.x.round();
    let y0 = visible.y.round();
    let x1 = visible.max_x().round().min(out.width);
    let y1 = visible.max_y().round().min(out.height);
    if x1 > x0 && y1 > y0 {
        let snapped = Rect::new(x0, y0, x1 - x0, y1 - y0);
        let region = plan.source_region_for(&snapped);
        let content = resample_region(source, region, snapped.width as u32, snapped.height as u32)?;
        imageops::replace(&mut canvas, &content, x0 as i64, y0 as i64);
    }

    let mut bytes = canvas.into_raw();
    if format == PixelFormat::Bgra8 {
        swap_red_blue(&mut bytes);
    }
    Ok(ComposedFrame {
        width,
        height,
        format,
        bytes,
    })
}

fn swap_red_blue(bytes: &mut [u8]) {
    let pixels: &mut [[u8; 4]] = bytemuck::cast_slice_mut(bytes);
    for px in pixels {
        px.swap(0, 2);
    }
}
