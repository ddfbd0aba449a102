#[cfg(test)]
use image::RgbaImage;

/// Reference white the temperature control is measured against.
pub const REFERENCE_KELVIN: f32 = 6500.0;

pub fn srgb_to_linear(v: f32) -> f32 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

pub fn linear_to_srgb(v: f32) -> f32 {
    let v = v.clamp(0.0, 1.0);
    if v <= 0.003_130_8 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

/// RGB of a black body at `kelvin`, normalized to 0..1 (Tanner Helland fit).
#[allow(clippy::excessive_precision)]
pub fn kelvin_to_rgb(kelvin: f32) -> [f32; 3] {
    let temp = (kelvin / 100.0).clamp(10.0, 400.0);
    let (r, g, b) = if temp <= 66.0 {
        let g = 99.470_802_586_1 * temp.ln() - 161.119_568_166_1;
        let b = if temp <= 19.0 {
            0.0
        } else {
            138.517_731_223_1 * (temp - 10.0).ln() - 305.044_792_730_7
        };
        (255.0, g, b)
    } else {
        let r = 329.698_727_446 * (temp - 60.0).powf(-0.133_204_759_2);
        let g = 288.122_169_528_3 * (temp - 60.0).powf(-0.075_514_849_2);
        (r, g, 255.0)
    };
    [
        (r / 255.0).clamp(0.001, 1.0),
        (g / 255.0).clamp(0.001, 1.0),
        (b / 255.0).clamp(0.001, 1.0),
    ]
}

/// Channel gains that neutralize a scene lit at `kelvin` with `tint`.
///
/// Gains are 1.0 at [`REFERENCE_KELVIN`] with zero tint. Positive tint pushes
/// toward magenta by pulling green down.
pub fn white_balance_gains(kelvin: f32, tint: f32) -> [f32; 3] {
    let scene = kelvin_to_rgb(kelvin);
    let reference = kelvin_to_rgb(REFERENCE_KELVIN);
    let mut gains = [
        scene[1] / scene[0] * (reference[0] / reference[1]),
        1.0,
        scene[1] / scene[2] * (reference[2] / reference[1]),
    ];
    gains[1] *= (1.0 - tint / 300.0).max(0.05);
    gains
}

/// Mean RGB of the opaque pixels, 0..1.
#[cfg(test)]
pub(crate) fn average_color(img: &RgbaImage) -> [f32; 3] {
    let mut accum = [0f64; 3];
    let mut total = 0f64;
    for pixel in img.pixels() {
        let alpha = f64::from(pixel[3]) / 255.0;
        if alpha <= 0.0 {
            continue;
        }
        total += alpha;
        for c in 0..3 {
            accum[c] += f64::from(pixel[c]) * alpha;
        }
    }
    if total <= f64::EPSILON {
        return [0.0; 3];
    }
    [
        (accum[0] / (255.0 * total)) as f32,
        (accum[1] / (255.0 * total)) as f32,
        (accum[2] / (255.0 * total)) as f32,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn srgb_round_trips_midtones() {
        for v in [0.0_f32, 0.02, 0.18, 0.5, 0.9, 1.0] {
            let back = linear_to_srgb(srgb_to_linear(v));
            assert!((back - v).abs() < 1e-4, "{v} -> {back}");
        }
    }

    #[test]
    fn reference_temperature_is_neutral() {
        let gains = white_balance_gains(REFERENCE_KELVIN, 0.0);
        for g in gains {
            assert!((g - 1.0).abs() < 1e-5, "{gains:?}");
        }
    }

    #[test]
    fn warm_scene_gets_blue_boost() {
        let gains = white_balance_gains(3200.0, 0.0);
        assert!(gains[2] > 1.0, "{gains:?}");
        assert!(gains[0] < 1.0, "{gains:?}");
    }

    #[test]
    fn positive_tint_reduces_green() {
        let gains = white_balance_gains(REFERENCE_KELVIN, 150.0);
        assert!(gains[1] < 1.0);
    }
}
