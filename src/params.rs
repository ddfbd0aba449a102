//! Development parameters and the live control state that feeds them.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use anyhow::{Result, anyhow, ensure};
use serde::Deserialize;
use tracing::{debug, info};

use crate::frame::ImageSource;

/// The six knobs read once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct FilterParameters {
    /// Exposure in stops.
    pub exposure: f32,
    /// Blend between linear response (0) and the full boost curve (1).
    pub boost_amount: f32,
    /// Shadow lift strength.
    pub boost_shadow_amount: f32,
    /// Black-point offset.
    pub shadow_bias: f32,
    /// White balance reference in Kelvin.
    pub neutral_temperature: f32,
    /// Green/magenta balance.
    pub neutral_tint: f32,
}

impl Default for FilterParameters {
    fn default() -> Self {
        Self {
            exposure: 0.0,
            boost_amount: 1.0,
            boost_shadow_amount: 1.0,
            shadow_bias: 0.0,
            neutral_temperature: 6500.0,
            neutral_tint: 0.0,
        }
    }
}

impl FilterParameters {
    pub fn get(&self, kind: ParamKind) -> f32 {
        match kind {
            ParamKind::Exposure => self.exposure,
            ParamKind::BoostAmount => self.boost_amount,
            ParamKind::BoostShadowAmount => self.boost_shadow_amount,
            ParamKind::ShadowBias => self.shadow_bias,
            ParamKind::NeutralTemperature => self.neutral_temperature,
            ParamKind::NeutralTint => self.neutral_tint,
        }
    }

    fn slot_mut(&mut self, kind: ParamKind) -> &mut f32 {
        match kind {
            ParamKind::Exposure => &mut self.exposure,
            ParamKind::BoostAmount => &mut self.boost_amount,
            ParamKind::BoostShadowAmount => &mut self.boost_shadow_amount,
            ParamKind::ShadowBias => &mut self.shadow_bias,
            ParamKind::NeutralTemperature => &mut self.neutral_temperature,
            ParamKind::NeutralTint => &mut self.neutral_tint,
        }
    }

    /// Sets `kind` the way its slider would: snapped to the step grid and
    /// clamped to the range. Returns the stored value.
    pub fn set(&mut self, kind: ParamKind, value: f32) -> f32 {
        let stored = kind.quantize(value);
        *self.slot_mut(kind) = stored;
        stored
    }

    /// Fails on the first value outside its knob's range.
    pub fn validate(&self) -> Result<()> {
        for kind in ParamKind::ALL {
            let value = self.get(*kind);
            ensure!(
                value.is_finite() && kind.range().contains(&value),
                "{kind} = {value} is outside {:?}",
                kind.range()
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Exposure,
    BoostAmount,
    BoostShadowAmount,
    ShadowBias,
    NeutralTemperature,
    NeutralTint,
}

impl ParamKind {
    pub const ALL: &'static [Self] = &[
        Self::Exposure,
        Self::BoostAmount,
        Self::BoostShadowAmount,
        Self::ShadowBias,
        Self::NeutralTemperature,
        Self::NeutralTint,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exposure => "exposure",
            Self::BoostAmount => "boost-amount",
            Self::BoostShadowAmount => "boost-shadow-amount",
            Self::ShadowBias => "shadow-bias",
            Self::NeutralTemperature => "neutral-temperature",
            Self::NeutralTint => "neutral-tint",
        }
    }

    pub fn range(&self) -> RangeInclusive<f32> {
        match self {
            Self::Exposure => -5.0..=5.0,
            Self::BoostAmount => 0.0..=1.0,
            Self::BoostShadowAmount => 0.0..=2.0,
            Self::ShadowBias => -1.0..=1.0,
            Self::NeutralTemperature => 2000.0..=10000.0,
            Self::NeutralTint => -150.0..=150.0,
        }
    }

    /// Slider increment.
    pub fn step(&self) -> f32 {
        match self {
            Self::NeutralTemperature | Self::NeutralTint => 1.0,
            _ => 0.01,
        }
    }

    pub fn clamp(&self, value: f32) -> f32 {
        let range = self.range();
        if value.is_nan() {
            return *range.start();
        }
        value.clamp(*range.start(), *range.end())
    }

    /// Nearest value on the slider grid (`start + n * step`), clamped to the
    /// range. Non-finite input clamps first.
    pub fn quantize(&self, value: f32) -> f32 {
        let value = self.clamp(value);
        let start = f64::from(*self.range().start());
        let per_unit = (1.0 / f64::from(self.step())).round();
        let snapped = ((f64::from(value) - start) * per_unit).round() / per_unit + start;
        self.clamp(snapped as f32)
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamKind {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace('_', "-");
        let alias = match normalized.as_str() {
            "ev" => Some(Self::Exposure),
            "boost" => Some(Self::BoostAmount),
            "shadows" | "boost-shadow" => Some(Self::BoostShadowAmount),
            "bias" => Some(Self::ShadowBias),
            "temperature" | "temp" => Some(Self::NeutralTemperature),
            "tint" => Some(Self::NeutralTint),
            _ => None,
        };
        alias
            .or_else(|| {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|kind| kind.as_str() == normalized)
            })
            .ok_or_else(|| anyhow!("unknown parameter '{raw}'"))
    }
}

/// Live control state: the source set, which one is active, and the
/// parameter values the UI side last wrote.
///
/// Each tick takes a by-value snapshot; nothing is smoothed or interpolated.
#[derive(Debug)]
pub struct Controls<S> {
    sources: Vec<S>,
    active: usize,
    params: FilterParameters,
}

impl<S: ImageSource> Controls<S> {
    /// Activates the first source and adopts its defaults.
    pub fn new(sources: Vec<S>) -> Result<Self> {
        let first = sources
            .first()
            .ok_or_else(|| anyhow!("at least one image source is required"))?;
        let params = first.default_parameters();
        Ok(Self {
            sources,
            active: 0,
            params,
        })
    }

    pub fn parameters(&self) -> FilterParameters {
        self.params
    }

    pub fn set(&mut self, kind: ParamKind, value: f32) -> f32 {
        let stored = self.params.set(kind, value);
        debug!(param = %kind, value = stored, "parameter updated");
        stored
    }

    /// Restores the active source's defaults.
    pub fn reset(&mut self) {
        self.params = self.sources[self.active].default_parameters();
    }

    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|source| source.name())
    }

    pub fn active_name(&self) -> &str {
        self.sources[self.active].name()
    }

    /// Switches the active source and resets every parameter to the new
    /// source's own defaults.
    pub fn select_source(&mut self, name: &str) -> Result<()> {
        let index = self
            .sources
            .iter()
            .position(|source| source.name() == name)
            .ok_or_else(|| anyhow!("unknown source '{name}'"))?;
        self.active = index;
        self.reset();
        info!(source = name, params = ?self.params, "active source changed");
        Ok(())
    }

    /// Snapshot the parameters and request output from the active source.
    pub fn render_source(&mut self) -> Option<S::Image> {
        let params = self.params;
        self.sources[self.active].output_image(&params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_in_range() {
        FilterParameters::default().validate().unwrap();
    }

    #[test]
    fn set_clamps_to_slider_range() {
        let mut params = FilterParameters::default();
        assert_eq!(params.set(ParamKind::Exposure, 9.0), 5.0);
        assert_eq!(params.set(ParamKind::NeutralTint, -400.0), -150.0);
        assert_eq!(params.set(ParamKind::BoostAmount, f32::NAN), 0.0);
        assert_eq!(params.exposure, 5.0);
    }

    #[test]
    fn set_snaps_to_slider_step() {
        let mut params = FilterParameters::default();
        assert_eq!(params.set(ParamKind::Exposure, 1.23456), 1.23);
        assert_eq!(params.set(ParamKind::Exposure, -0.004), 0.0);
        assert_eq!(params.set(ParamKind::NeutralTemperature, 5200.7), 5201.0);
        assert_eq!(params.set(ParamKind::NeutralTint, -12.4), -12.0);
        assert_eq!(params.set(ParamKind::BoostShadowAmount, 1.996), 2.0);
        assert_eq!(params.set(ParamKind::NeutralTemperature, f32::INFINITY), 10000.0);
        for kind in ParamKind::ALL {
            let stored = params.set(*kind, 0.123_456);
            let steps = (stored - kind.range().start()) / kind.step();
            assert!((steps - steps.round()).abs() < 1e-3, "{kind}: {stored}");
        }
    }

    #[test]
    fn parse_names_and_aliases() {
        assert_eq!("exposure".parse::<ParamKind>().unwrap(), ParamKind::Exposure);
        assert_eq!(
            "neutral_temperature".parse::<ParamKind>().unwrap(),
            ParamKind::NeutralTemperature
        );
        assert_eq!("tint".parse::<ParamKind>().unwrap(), ParamKind::NeutralTint);
        assert_eq!(
            "Boost-Shadow-Amount".parse::<ParamKind>().unwrap(),
            ParamKind::BoostShadowAmount
        );
        assert!("saturation".parse::<ParamKind>().is_err());
    }

    #[test]
    fn out_of_range_values_fail_validation() {
        let params = FilterParameters {
            neutral_temperature: 100.0,
            ..FilterParameters::default()
        };
        let err = params.validate().unwrap_err().to_string();
        assert!(err.contains("neutral-temperature"), "{err}");
    }
}
