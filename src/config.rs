use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::frame::PixelFormat;
use crate::frame::budget::DEFAULT_FRAMES_IN_FLIGHT;
use crate::params::FilterParameters;
use crate::processing::fit::Rounding;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SourceConfig {
    /// Name used by the source picker (`source <name>`).
    pub name: String,
    /// Image file to develop.
    pub path: PathBuf,
    /// Parameter values the source starts from; unspecified knobs use the
    /// built-in defaults.
    #[serde(default)]
    pub defaults: FilterParameters,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PacingConfig {
    /// Frames allowed between submission and completion.
    pub max_frames_in_flight: usize,
    /// Host tick period (33ms is roughly 30 Hz).
    #[serde(with = "humantime_serde")]
    pub frame_interval: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            max_frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            frame_interval: Duration::from_millis(33),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct FitConfig {
    /// Tie-break for the re-centering shift.
    pub rounding: Rounding,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct DevelopConfig {
    /// Longest edge of the working copy each source is developed at.
    pub working_max_dim: u32,
}

impl Default for DevelopConfig {
    fn default() -> Self {
        Self {
            working_max_dim: 2048,
        }
    }
}

/// Offscreen surface used when no window is opened.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct SurfaceConfig {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            pixel_format: PixelFormat::Rgba8,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Sources offered by the picker, in order.
    pub sources: Vec<SourceConfig>,
    /// Source active at startup; the first one when unset.
    pub initial_source: Option<String>,
    pub pacing: PacingConfig,
    pub fit: FitConfig,
    pub develop: DevelopConfig,
    pub surface: SurfaceConfig,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(!self.sources.is_empty(), "at least one source must be configured");
        let mut names = HashSet::new();
        for source in &self.sources {
            ensure!(!source.name.trim().is_empty(), "source names must not be empty");
            ensure!(
                names.insert(source.name.as_str()),
                "duplicate source name '{}'",
                source.name
            );
            source
                .defaults
                .validate()
                .with_context(|| format!("invalid defaults for source '{}'", source.name))?;
        }
        if let Some(initial) = self.initial_source.as_deref() {
            ensure!(
                names.contains(initial),
                "initial-source '{initial}' is not a configured source"
            );
        }
        ensure!(
            self.pacing.max_frames_in_flight >= 1,
            "pacing.max-frames-in-flight must be at least 1"
        );
        ensure!(
            !self.pacing.frame_interval.is_zero(),
            "pacing.frame-interval must be positive"
        );
        ensure!(
            self.develop.working_max_dim >= 16,
            "develop.working-max-dim must be at least 16"
        );
        ensure!(
            self.surface.width > 0 && self.surface.height > 0,
            "surface width and height must be positive"
        );
        Ok(self)
    }
}
