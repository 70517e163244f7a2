use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::motion::{CornerParams, FitterKind};
use crate::sink::Codec;
use crate::trajectory::DEFAULT_SMOOTHING_RADIUS;

pub const DEFAULT_STABILIZED_OUTPUT: &str = "stabilized_output.avi";
pub const DEFAULT_COMPARE_OUTPUT: &str = "before_after_output.avi";
const DEFAULT_CODEC: &str = "MJPG";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct StabilizerConfigFile {
    output: Option<PathBuf>,
    codec: Option<String>,
    smoothing_radius: Option<usize>,
    fitter: Option<FitterKind>,
    features: Option<FeaturesConfigFile>,
    compare: Option<CompareConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FeaturesConfigFile {
    max_corners: Option<usize>,
    quality_level: Option<f64>,
    min_distance: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CompareConfigFile {
    output: Option<PathBuf>,
    codec: Option<String>,
}

/// Settings for the `stabilize` binary.
#[derive(Debug, Clone, PartialEq)]
pub struct StabilizerConfig {
    pub output: PathBuf,
    pub codec: Codec,
    pub smoothing_radius: usize,
    pub features: CornerParams,
    pub fitter: FitterKind,
}

/// Command-line values layered over file and environment settings.
#[derive(Debug, Clone, Default)]
pub struct StabilizerOverrides {
    pub output: Option<PathBuf>,
    pub codec: Option<String>,
    pub smoothing_radius: Option<usize>,
    pub max_corners: Option<usize>,
    pub quality_level: Option<f64>,
    pub min_distance: Option<f64>,
    pub fitter: Option<String>,
}

/// Settings for the `before_after` binary.
#[derive(Debug, Clone, PartialEq)]
pub struct CompareConfig {
    pub output: PathBuf,
    pub codec: Codec,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from(DEFAULT_STABILIZED_OUTPUT),
            codec: Codec::Mjpg,
            smoothing_radius: DEFAULT_SMOOTHING_RADIUS,
            features: CornerParams::default(),
            fitter: FitterKind::default(),
        }
    }
}

impl StabilizerConfig {
    /// Defaults, then `STABILIZER_CONFIG` file, then environment.
    pub fn load() -> Result<Self> {
        Self::load_with(&StabilizerOverrides::default())
    }

    /// Like `load`, with command-line overrides applied last.
    pub fn load_with(overrides: &StabilizerOverrides) -> Result<Self> {
        let file_cfg = load_config_file()?;
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.apply_overrides(overrides)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: StabilizerConfigFile) -> Result<Self> {
        let defaults = Self::default();
        let codec = parse_codec(file.codec.as_deref().unwrap_or(DEFAULT_CODEC))?;
        let features = CornerParams {
            max_corners: file
                .features
                .as_ref()
                .and_then(|f| f.max_corners)
                .unwrap_or(defaults.features.max_corners),
            quality_level: file
                .features
                .as_ref()
                .and_then(|f| f.quality_level)
                .unwrap_or(defaults.features.quality_level),
            min_distance: file
                .features
                .as_ref()
                .and_then(|f| f.min_distance)
                .unwrap_or(defaults.features.min_distance),
        };
        Ok(Self {
            output: file.output.unwrap_or(defaults.output),
            codec,
            smoothing_radius: file.smoothing_radius.unwrap_or(defaults.smoothing_radius),
            features,
            fitter: file.fitter.unwrap_or(defaults.fitter),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(output) = env_value("STABILIZER_OUTPUT") {
            self.output = PathBuf::from(output);
        }
        if let Some(codec) = env_value("STABILIZER_CODEC") {
            self.codec = parse_codec(&codec)?;
        }
        if let Some(radius) = env_value("STABILIZER_SMOOTHING_RADIUS") {
            self.smoothing_radius = radius.trim().parse().map_err(|_| {
                anyhow!("STABILIZER_SMOOTHING_RADIUS must be a non-negative integer")
            })?;
        }
        if let Some(count) = env_value("STABILIZER_MAX_CORNERS") {
            self.features.max_corners = count
                .trim()
                .parse()
                .map_err(|_| anyhow!("STABILIZER_MAX_CORNERS must be a positive integer"))?;
        }
        if let Some(quality) = env_value("STABILIZER_QUALITY_LEVEL") {
            self.features.quality_level = quality
                .trim()
                .parse()
                .map_err(|_| anyhow!("STABILIZER_QUALITY_LEVEL must be a number"))?;
        }
        if let Some(distance) = env_value("STABILIZER_MIN_DISTANCE") {
            self.features.min_distance = distance
                .trim()
                .parse()
                .map_err(|_| anyhow!("STABILIZER_MIN_DISTANCE must be a number"))?;
        }
        if let Some(fitter) = env_value("STABILIZER_FITTER") {
            self.fitter = fitter.parse()?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &StabilizerOverrides) -> Result<()> {
        if let Some(output) = &overrides.output {
            self.output = output.clone();
        }
        if let Some(codec) = &overrides.codec {
            self.codec = parse_codec(codec)?;
        }
        if let Some(radius) = overrides.smoothing_radius {
            self.smoothing_radius = radius;
        }
        if let Some(count) = overrides.max_corners {
            self.features.max_corners = count;
        }
        if let Some(quality) = overrides.quality_level {
            self.features.quality_level = quality;
        }
        if let Some(distance) = overrides.min_distance {
            self.features.min_distance = distance;
        }
        if let Some(fitter) = &overrides.fitter {
            self.fitter = fitter.parse()?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        validate_output(&self.output)?;
        if self.features.max_corners == 0 {
            return Err(anyhow!("max corners must be at least 1"));
        }
        let quality = self.features.quality_level;
        if !(quality.is_finite() && quality > 0.0 && quality <= 1.0) {
            return Err(anyhow!("quality level must be in (0, 1], got {}", quality));
        }
        let distance = self.features.min_distance;
        if !(distance.is_finite() && distance >= 0.0) {
            return Err(anyhow!("min distance must be >= 0, got {}", distance));
        }
        Ok(())
    }
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from(DEFAULT_COMPARE_OUTPUT),
            codec: Codec::Mjpg,
        }
    }
}

impl CompareConfig {
    /// Defaults, then the `compare` section of the `STABILIZER_CONFIG` file,
    /// then `STABILIZER_CODEC`, then the given command-line values.
    pub fn load_with(output: Option<PathBuf>, codec: Option<&str>) -> Result<Self> {
        let file_cfg = load_config_file()?.compare.unwrap_or_default();
        let mut cfg = Self {
            output: file_cfg
                .output
                .unwrap_or_else(|| PathBuf::from(DEFAULT_COMPARE_OUTPUT)),
            codec: parse_codec(file_cfg.codec.as_deref().unwrap_or(DEFAULT_CODEC))?,
        };
        if let Some(env_codec) = env_value("STABILIZER_CODEC") {
            cfg.codec = parse_codec(&env_codec)?;
        }
        if let Some(output) = output {
            cfg.output = output;
        }
        if let Some(codec) = codec {
            cfg.codec = parse_codec(codec)?;
        }
        validate_output(&cfg.output)?;
        Ok(cfg)
    }
}

fn load_config_file() -> Result<StabilizerConfigFile> {
    match env_value("STABILIZER_CONFIG") {
        Some(path) => read_config_file(Path::new(&path)),
        None => Ok(StabilizerConfigFile::default()),
    }
}

fn read_config_file(path: &Path) -> Result<StabilizerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg: StabilizerConfigFile = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_codec(code: &str) -> Result<Codec> {
    Codec::from_fourcc(code)
}

fn validate_output(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(anyhow!("output path must not be empty"));
    }
    Ok(())
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_sections_fill_missing_values_with_defaults() -> Result<()> {
        let file: StabilizerConfigFile = serde_json::from_str(
            r#"{ "smoothing_radius": 12, "features": { "max_corners": 50 }, "fitter": "lmeds" }"#,
        )?;
        let cfg = StabilizerConfig::from_file(file)?;
        assert_eq!(cfg.smoothing_radius, 12);
        assert_eq!(cfg.features.max_corners, 50);
        assert_eq!(cfg.features.quality_level, 0.01);
        assert_eq!(cfg.features.min_distance, 30.0);
        assert_eq!(cfg.fitter, FitterKind::Lmeds);
        assert_eq!(cfg.output, PathBuf::from(DEFAULT_STABILIZED_OUTPUT));
        assert_eq!(cfg.codec, Codec::Mjpg);
        Ok(())
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let parsed: std::result::Result<StabilizerConfigFile, _> =
            serde_json::from_str(r#"{ "radius": 3 }"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn overrides_win_and_are_validated() -> Result<()> {
        let mut cfg = StabilizerConfig::default();
        cfg.apply_overrides(&StabilizerOverrides {
            smoothing_radius: Some(0),
            codec: Some("DIB ".to_string()),
            fitter: Some("LMEDS".to_string()),
            ..StabilizerOverrides::default()
        })?;
        assert_eq!(cfg.smoothing_radius, 0);
        assert_eq!(cfg.codec, Codec::Dib);
        assert_eq!(cfg.fitter, FitterKind::Lmeds);
        cfg.validate()?;

        cfg.features.quality_level = 0.0;
        assert!(cfg.validate().is_err());
        cfg.features.quality_level = 1.0;
        cfg.features.max_corners = 0;
        assert!(cfg.validate().is_err());
        Ok(())
    }
}
