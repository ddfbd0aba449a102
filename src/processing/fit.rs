//! Width-driven aspect fill of a source extent onto a fixed-size surface.
//!
//! The transform is scale, center-crop, then an integer re-centering shift.
//! The scale factor comes from the width alone, so a source that is narrower
//! than the target's aspect ends up under-filled on Y. That is kept as-is;
//! [`FitPlan::covers_target`] reports it.

use serde::Deserialize;

use crate::error::FrameError;

/// Axis-aligned rectangle in floating-point image units (origin + size).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn from_size(width: f64, height: f64) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Uniform scale about the coordinate origin (origin and size both scale).
    pub fn scaled(&self, factor: f64) -> Self {
        Self::new(
            self.x * factor,
            self.y * factor,
            self.width * factor,
            self.height * factor,
        )
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Intersection; an empty result collapses to a zero-size rect at the
    /// clamped origin.
    pub fn intersection(&self, other: &Rect) -> Self {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.max_x().min(other.max_x());
        let y1 = self.max_y().min(other.max_y());
        Self::new(x0, y0, (x1 - x0).max(0.0), (y1 - y0).max(0.0))
    }
}

/// Tie-break used by the re-centering shift.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rounding {
    /// `0.5 -> 1`, `-0.5 -> -1`, `2.5 -> 3`.
    #[default]
    HalfAwayFromZero,
    /// `0.5 -> 0`, `1.5 -> 2`, `2.5 -> 2`.
    HalfToEven,
}

impl Rounding {
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Self::HalfAwayFromZero => value.round(),
            Self::HalfToEven => value.round_ties_even(),
        }
    }
}

/// Result of fitting one source extent to one surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitPlan {
    /// Original source extent.
    pub source: Rect,
    /// `target_width / source.width`.
    pub scale: f64,
    /// Crop origin in scaled space.
    pub crop_origin: (f64, f64),
    /// Integer re-centering shift applied after the crop.
    pub shift: (f64, f64),
    /// Where the image content lands in surface coordinates.
    pub content: Rect,
    /// Surface pixel size; always the output extent.
    pub output_width: u32,
    pub output_height: u32,
}

impl FitPlan {
    pub fn output_size(&self) -> (u32, u32) {
        (self.output_width, self.output_height)
    }

    pub fn output_rect(&self) -> Rect {
        Rect::from_size(f64::from(self.output_width), f64::from(self.output_height))
    }

    /// Whether the content covers the whole output (within half a pixel).
    pub fn covers_target(&self) -> bool {
        let out = self.output_rect();
        self.content.x <= 0.5
            && self.content.y <= 0.5
            && self.content.max_x() >= out.width - 0.5
            && self.content.max_y() >= out.height - 0.5
    }

    /// Maps a surface-space rect back into source coordinates.
    pub fn source_region_for(&self, surface: &Rect) -> Rect {
        let (ox, oy) = self.crop_origin;
        let (sx, sy) = self.shift;
        Rect::new(
            (surface.x - sx + ox) / self.scale,
            (surface.y - sy + oy) / self.scale,
            surface.width / self.scale,
            surface.height / self.scale,
        )
    }

    /// Source pixels that end up in [`FitPlan::content`].
    pub fn source_region(&self) -> Rect {
        self.source_region_for(&self.content)
    }
}

/// Fit `source` onto a `target_width x target_height` surface.
///
/// Returns `Ok(None)` when the surface has no area (hidden or minimized view),
/// which callers treat as "skip this frame".
pub fn fit_to_surface(
    source: Rect,
    target_width: u32,
    target_height: u32,
    rounding: Rounding,
) -> Result<Option<FitPlan>, FrameError> {
    if target_width == 0 || target_height == 0 {
        return Ok(None);
    }
    let finite = source.width.is_finite() && source.height.is_finite();
    if !finite || source.width <= 0.0 || source.height <= 0.0 {
        return Err(FrameError::DegenerateInput {
            width: source.width,
            height: source.height,
        });
    }

    let tw = f64::from(target_width);
    let th = f64::from(target_height);

    let scale = tw / source.width;
    let scaled = source.scaled(scale);

    let origin_x = (scaled.width - tw).max(0.0) / 2.0;
    let origin_y = (scaled.height - th).max(0.0) / 2.0;

    let cropped = scaled
        .intersection(&Rect::new(origin_x, origin_y, tw, th))
        .translated(-origin_x, -origin_y);

    let shift_x = rounding.apply((tw + cropped.x - cropped.width) * 0.5);
    let shift_y = rounding.apply((th + cropped.y - cropped.height) * 0.5);
    let content = cropped.translated(shift_x, shift_y);

    Ok(Some(FitPlan {
        source,
        scale,
        crop_origin: (origin_x, origin_y),
        shift: (shift_x, shift_y),
        content,
        output_width: target_width,
        output_height: target_height,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::SkipReason;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn rounding_modes_differ_only_on_ties() {
        assert_eq!(Rounding::HalfAwayFromZero.apply(0.5), 1.0);
        assert_eq!(Rounding::HalfToEven.apply(0.5), 0.0);
        assert_eq!(Rounding::HalfAwayFromZero.apply(2.5), 3.0);
        assert_eq!(Rounding::HalfToEven.apply(2.5), 2.0);
        assert_eq!(Rounding::HalfAwayFromZero.apply(-0.5), -1.0);
        assert_eq!(Rounding::HalfToEven.apply(-0.5), 0.0);
        assert_eq!(Rounding::HalfAwayFromZero.apply(1.4), 1.0);
        assert_eq!(Rounding::HalfToEven.apply(1.6), 2.0);
    }

    #[test]
    fn odd_residual_shift_follows_rounding_mode() {
        // 100x101 source on 100x200: scaled height 101, residual 99 / 2 = 49.5.
        let source = Rect::from_size(100.0, 101.0);
        let away = fit_to_surface(source, 100, 200, Rounding::HalfAwayFromZero)
            .unwrap()
            .unwrap();
        let even = fit_to_surface(source, 100, 200, Rounding::HalfToEven)
            .unwrap()
            .unwrap();
        assert_eq!(away.shift.1, 50.0);
        assert_eq!(even.shift.1, 50.0);

        // 100x103 -> residual 48.5: the modes disagree.
        let source = Rect::from_size(100.0, 103.0);
        let away = fit_to_surface(source, 100, 200, Rounding::HalfAwayFromZero)
            .unwrap()
            .unwrap();
        let even = fit_to_surface(source, 100, 200, Rounding::HalfToEven)
            .unwrap()
            .unwrap();
        assert_eq!(away.shift.1, 49.0);
        assert_eq!(even.shift.1, 48.0);
    }

    #[test]
    fn zero_target_is_skipped() {
        let source = Rect::from_size(4032.0, 3024.0);
        assert!(
            fit_to_surface(source, 0, 1080, Rounding::default())
                .unwrap()
                .is_none()
        );
        assert!(
            fit_to_surface(source, 1920, 0, Rounding::default())
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn zero_width_source_is_degenerate() {
        let err = fit_to_surface(Rect::from_size(0.0, 100.0), 640, 480, Rounding::default())
            .unwrap_err();
        assert!(matches!(err, FrameError::DegenerateInput { .. }));
        assert_eq!(err.skip_reason(), Some(SkipReason::DegenerateInput));
    }

    #[test]
    fn zero_height_source_is_degenerate() {
        let err = fit_to_surface(Rect::from_size(4032.0, 0.0), 1920, 1080, Rounding::default())
            .unwrap_err();
        assert!(matches!(
            err,
            FrameError::DegenerateInput { width, height } if width == 4032.0 && height == 0.0
        ));
    }

    #[test]
    fn source_region_inverts_the_transform() {
        let plan = fit_to_surface(
            Rect::from_size(4032.0, 3024.0),
            1920,
            1080,
            Rounding::default(),
        )
        .unwrap()
        .unwrap();
        let region = plan.source_region();
        assert!(close(region.x, 0.0));
        assert!(close(region.y, 180.0 / plan.scale));
        assert!(close(region.width, 4032.0));
        assert!(close(region.height, 1080.0 / plan.scale));
    }

    #[test]
    fn offset_source_origin_is_scaled_with_the_extent() {
        let plan = fit_to_surface(
            Rect::new(10.0, 20.0, 200.0, 100.0),
            100,
            50,
            Rounding::default(),
        )
        .unwrap()
        .unwrap();
        assert!(close(plan.scale, 0.5));
        assert_eq!(plan.output_size(), (100, 50));
        assert!(plan.content.width <= 100.0 && plan.content.height <= 50.0);
    }

    #[test]
    fn intersection_of_disjoint_rects_is_empty() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, 20.0, 5.0, 5.0);
        assert!(a.intersection(&b).is_empty());
    }
}
