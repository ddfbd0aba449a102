use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use raw_preview::config::Configuration;
use raw_preview::frame::PixelFormat;
use raw_preview::processing::fit::Rounding;

#[test]
fn parse_minimal_config() {
    let yaml = r#"
sources:
  - name: raw
    path: "/photos/sample.tif"
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let cfg = cfg.validated().unwrap();
    assert_eq!(cfg.sources.len(), 1);
    assert_eq!(cfg.sources[0].path, PathBuf::from("/photos/sample.tif"));
    assert_eq!(cfg.sources[0].defaults.neutral_temperature, 6500.0);
    assert_eq!(cfg.pacing.max_frames_in_flight, 3);
    assert_eq!(cfg.pacing.frame_interval, Duration::from_millis(33));
    assert_eq!(cfg.fit.rounding, Rounding::HalfAwayFromZero);
    assert_eq!(cfg.surface.width, 1920);
    assert_eq!(cfg.surface.height, 1080);
    assert_eq!(cfg.surface.pixel_format, PixelFormat::Rgba8);
    assert!(cfg.initial_source.is_none());
}

#[test]
fn parse_full_kebab_case_config() {
    let yaml = r#"
sources:
  - name: raw
    path: "/photos/raw.tif"
    defaults:
      exposure: 0.5
      boost-amount: 0.7
      neutral-temperature: 5000
  - name: jpeg
    path: "/photos/raw.jpg"
initial-source: jpeg
pacing:
  max-frames-in-flight: 2
  frame-interval: 16ms
fit:
  rounding: half-to-even
develop:
  working-max-dim: 1024
surface:
  width: 1280
  height: 720
  pixel-format: bgra8
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let cfg = cfg.validated().unwrap();
    let raw = &cfg.sources[0].defaults;
    assert!((raw.exposure - 0.5).abs() < f32::EPSILON);
    assert!((raw.boost_amount - 0.7).abs() < f32::EPSILON);
    assert_eq!(raw.neutral_temperature, 5000.0);
    // unspecified knobs keep the built-in defaults
    assert_eq!(raw.boost_shadow_amount, 1.0);
    assert_eq!(cfg.initial_source.as_deref(), Some("jpeg"));
    assert_eq!(cfg.pacing.max_frames_in_flight, 2);
    assert_eq!(cfg.pacing.frame_interval, Duration::from_millis(16));
    assert_eq!(cfg.fit.rounding, Rounding::HalfToEven);
    assert_eq!(cfg.develop.working_max_dim, 1024);
    assert_eq!(cfg.surface.pixel_format, PixelFormat::Bgra8);
}

#[test]
fn unknown_keys_are_rejected() {
    let yaml = r#"
sources:
  - name: raw
    path: "/p.tif"
    defaults:
      saturation: 1.0
"#;
    assert!(serde_yaml::from_str::<Configuration>(yaml).is_err());

    let yaml = r#"
sources: []
frames-per-second: 30
"#;
    assert!(serde_yaml::from_str::<Configuration>(yaml).is_err());
}

fn validation_error(yaml: &str) -> String {
    let cfg: Configuration = serde_yaml::from_str(yaml).expect("parses");
    format!("{:#}", cfg.validated().expect_err("validation should fail"))
}

#[test]
fn empty_source_list_fails_validation() {
    let err = validation_error("sources: []\n");
    assert!(err.contains("at least one source"), "{err}");
}

#[test]
fn duplicate_source_names_fail_validation() {
    let err = validation_error(
        r#"
sources:
  - { name: raw, path: "/a.tif" }
  - { name: raw, path: "/b.tif" }
"#,
    );
    assert!(err.contains("duplicate source name"), "{err}");
}

#[test]
fn unknown_initial_source_fails_validation() {
    let err = validation_error(
        r#"
sources:
  - { name: raw, path: "/a.tif" }
initial-source: heic
"#,
    );
    assert!(err.contains("initial-source"), "{err}");
}

#[test]
fn out_of_range_defaults_fail_validation() {
    let err = validation_error(
        r#"
sources:
  - name: raw
    path: "/a.tif"
    defaults:
      exposure: 9.0
"#,
    );
    assert!(err.contains("raw"), "{err}");
    assert!(err.contains("exposure"), "{err}");
}

#[test]
fn zero_pacing_values_fail_validation() {
    let err = validation_error(
        r#"
sources:
  - { name: raw, path: "/a.tif" }
pacing:
  max-frames-in-flight: 0
"#,
    );
    assert!(err.contains("max-frames-in-flight"), "{err}");

    let err = validation_error(
        r#"
sources:
  - { name: raw, path: "/a.tif" }
pacing:
  frame-interval: 0s
"#,
    );
    assert!(err.contains("frame-interval"), "{err}");
}

#[test]
fn zero_surface_fails_validation() {
    let err = validation_error(
        r#"
sources:
  - { name: raw, path: "/a.tif" }
surface:
  width: 0
"#,
    );
    assert!(err.contains("surface"), "{err}");
}

#[test]
fn from_yaml_file_reads_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "sources:\n  - name: raw\n    path: /photos/raw.tif\npacing:\n  frame-interval: 40ms"
    )
    .unwrap();
    let cfg = Configuration::from_yaml_file(file.path())
        .unwrap()
        .validated()
        .unwrap();
    assert_eq!(cfg.pacing.frame_interval, Duration::from_millis(40));

    let missing = Configuration::from_yaml_file("/definitely/not/here.yaml");
    assert!(missing.is_err());
}
