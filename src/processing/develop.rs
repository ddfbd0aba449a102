//! Software development filter used as the image source collaborator.
//!
//! Not a RAW decoder: it takes any image the `image` crate can decode and
//! applies the six development parameters on a downsampled working copy.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use image::{ImageReader, RgbaImage};
use tracing::{debug, info};

use crate::frame::{ImageSource, SourceImage};
use crate::params::FilterParameters;
use crate::processing::color::{linear_to_srgb, srgb_to_linear, white_balance_gains};
use crate::processing::fit::Rect;
use crate::processing::resample::{bounded_size, resize_rgba};

/// Strength of the shadow-bias black-point shift at `shadow_bias = ±1`.
const SHADOW_BIAS_SCALE: f32 = 0.1;

/// An immutable developed frame. Cloning shares the pixel buffer.
#[derive(Debug, Clone)]
pub struct DevelopedImage {
    pixels: Arc<RgbaImage>,
}

impl DevelopedImage {
    pub fn new(pixels: RgbaImage) -> Self {
        Self {
            pixels: Arc::new(pixels),
        }
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }
}

impl SourceImage for DevelopedImage {
    fn extent(&self) -> Rect {
        Rect::from_size(
            f64::from(self.pixels.width()),
            f64::from(self.pixels.height()),
        )
    }
}

#[derive(Debug)]
pub struct DevelopFilter {
    name: String,
    path: Option<PathBuf>,
    base: Arc<RgbaImage>,
    defaults: FilterParameters,
    cache: Option<(FilterParameters, DevelopedImage)>,
}

impl DevelopFilter {
    /// Decodes `path` and keeps a working copy no larger than `working_max_dim`.
    pub fn open(
        name: impl Into<String>,
        path: &Path,
        working_max_dim: u32,
        defaults: FilterParameters,
    ) -> Result<Self> {
        let decoded = ImageReader::open(path)
            .with_context(|| format!("failed to open source image {}", path.display()))?
            .with_guessed_format()
            .context("failed to guess source image format")?
            .decode()
            .with_context(|| format!("failed to decode source image {}", path.display()))?
            .to_rgba8();
        let (w, h) = bounded_size(decoded.width(), decoded.height(), working_max_dim);
        let base = resize_rgba(&decoded, w, h)?;
        let name = name.into();
        info!(
            source = %name,
            path = %path.display(),
            native = ?decoded.dimensions(),
            working = ?base.dimensions(),
            "source image loaded",
        );
        let mut filter = Self::from_image(name, base, defaults);
        filter.path = Some(path.to_path_buf());
        Ok(filter)
    }

    pub fn from_image(name: impl Into<String>, base: RgbaImage, defaults: FilterParameters) -> Self {
        Self {
            name: name.into(),
            path: None,
            base: Arc::new(base),
            defaults,
            cache: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn working_size(&self) -> (u32, u32) {
        self.base.dimensions()
    }
}

impl ImageSource for DevelopFilter {
    type Image = DevelopedImage;

    fn name(&self) -> &str {
        &self.name
    }

    fn default_parameters(&self) -> FilterParameters {
        self.defaults
    }

    fn output_image(&mut self, params: &FilterParameters) -> Option<DevelopedImage> {
        if self.base.width() == 0 || self.base.height() == 0 {
            return None;
        }
        if let Some((cached_params, image)) = self.cache.as_ref() {
            if cached_params == params {
                return Some(image.clone());
            }
        }
        let image = DevelopedImage::new(develop(&self.base, params));
        debug!(source = %self.name, ?params, "developed new output");
        self.cache = Some((*params, image.clone()));
        Some(image)
    }
}

/// Applies the development parameters to an sRGB image.
///
/// Order: linearize, white balance, exposure, black point (shadow bias),
/// shadow lift, re-encode, then blend toward the boost tone curve.
pub fn develop(base: &RgbaImage, params: &FilterParameters) -> RgbaImage {
    let to_linear: Vec<f32> = (0..=255u8)
        .map(|v| srgb_to_linear(f32::from(v) / 255.0))
        .collect();
    let gains = white_balance_gains(params.neutral_temperature, params.neutral_tint);
    let exposure = 2.0_f32.powf(params.exposure);
    let black = params.shadow_bias * SHADOW_BIAS_SCALE;
    let lift = params.boost_shadow_amount - 1.0;
    let boost = params.boost_amount.clamp(0.0, 1.0);

    let mut out = RgbaImage::new(base.width(), base.height());
    for (src, dst) in base.pixels().zip(out.pixels_mut()) {
        let mut rgb = [0f32; 3];
        for c in 0..3 {
            let lin = to_linear[usize::from(src[c])] * gains[c] * exposure;
            rgb[c] = ((lin - black) / (1.0 - black)).max(0.0);
        }

        if lift.abs() > f32::EPSILON {
            let luma = 0.2126 * rgb[0] + 0.7152 * rgb[1] + 0.0722 * rgb[2];
            let weight = 1.0 - smoothstep(0.0, 0.5, luma);
            let gain = (1.0 + lift * weight).max(0.0);
            for v in &mut rgb {
                *v *= gain;
            }
        }

        for c in 0..3 {
            let v = linear_to_srgb(rgb[c]);
            let curved = v * v * (3.0 - 2.0 * v);
            let v = v + (curved - v) * boost;
            dst[c] = (v * 255.0).round().clamp(0.0, 255.0) as u8;
        }
        dst[3] = src[3];
    }
    out
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;
    use crate::processing::color::average_color;

    fn gray(level: u8) -> RgbaImage {
        RgbaImage::from_pixel(4, 4, Rgba([level, level, level, 255]))
    }

    fn flat() -> FilterParameters {
        FilterParameters {
            boost_amount: 0.0,
            ..FilterParameters::default()
        }
    }

    #[test]
    fn flat_parameters_preserve_gray() {
        let out = develop(&gray(128), &flat());
        let avg = average_color(&out);
        for c in avg {
            assert!((c - 128.0 / 255.0).abs() < 2.0 / 255.0, "{avg:?}");
        }
    }

    #[test]
    fn positive_exposure_brightens() {
        let base = gray(64);
        let before = average_color(&develop(&base, &flat()))[1];
        let brighter = FilterParameters {
            exposure: 1.0,
            ..flat()
        };
        let after = average_color(&develop(&base, &brighter))[1];
        assert!(after > before + 0.05, "{before} -> {after}");
    }

    #[test]
    fn shadow_boost_lifts_dark_tones() {
        let base = gray(30);
        let lifted = FilterParameters {
            boost_shadow_amount: 2.0,
            ..flat()
        };
        let before = average_color(&develop(&base, &flat()))[0];
        let after = average_color(&develop(&base, &lifted))[0];
        assert!(after > before, "{before} -> {after}");
    }

    #[test]
    fn warm_reference_cools_the_image() {
        let warm = FilterParameters {
            neutral_temperature: 3000.0,
            ..flat()
        };
        let avg = average_color(&develop(&gray(128), &warm));
        assert!(avg[2] > avg[0], "{avg:?}");
    }

    #[test]
    fn output_is_cached_per_parameter_set() {
        let mut filter = DevelopFilter::from_image("gray", gray(100), FilterParameters::default());
        let params = filter.default_parameters();
        let a = filter.output_image(&params).unwrap();
        let b = filter.output_image(&params).unwrap();
        assert!(Arc::ptr_eq(&a.pixels, &b.pixels));

        let changed = FilterParameters {
            exposure: 0.5,
            ..params
        };
        let c = filter.output_image(&changed).unwrap();
        assert!(!Arc::ptr_eq(&a.pixels, &c.pixels));
        assert_eq!(c.extent(), Rect::from_size(4.0, 4.0));
    }

    #[test]
    fn empty_base_yields_no_output() {
        let mut filter =
            DevelopFilter::from_image("empty", RgbaImage::new(0, 0), FilterParameters::default());
        assert!(filter.output_image(&FilterParameters::default()).is_none());
    }
}
