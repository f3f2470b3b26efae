//! Experiment configuration: timing thresholds, target layout, probe path.
//!
//! Loaded from JSON (all fields optional, defaults below) and then
//! overridden field by field from the command line.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Configuration loading / validation failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{name} must be a finite, non-negative number of seconds (got {value})")]
    InvalidDuration { name: &'static str, value: f64 },
    #[error("at least one target is required")]
    NoTargets,
    #[error("{positions} target positions but {scales} target scales")]
    ScaleCountMismatch { positions: usize, scales: usize },
    #[error("trace mode requires a probe")]
    MissingProbe,
}

/// Which pipeline a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionMode {
    /// Dwell selection feeding the trial aggregator.
    #[default]
    Trials,
    /// Moving probe, vergence trace recording.
    Trace,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trials => "trials",
            Self::Trace => "trace",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "trials" => Some(Self::Trials),
            "trace" => Some(Self::Trace),
            _ => None,
        }
    }
}

/// Built-in target arrangements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutPreset {
    /// Three targets in depth, all 5 cm.
    Uniform,
    /// Three targets in depth, 5 / 10 / 15 cm.
    Graded,
}

impl LayoutPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uniform => "uniform",
            Self::Graded => "graded",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "uniform" => Some(Self::Uniform),
            "graded" => Some(Self::Graded),
            _ => None,
        }
    }

    /// Target positions and scales for this preset.
    pub fn layout(&self) -> (Vec<[f32; 3]>, Vec<[f32; 3]>) {
        let positions = vec![[0.0, 0.0, -0.2], [0.0, 0.0, 0.0], [0.0, 0.0, 0.2]];
        let scales = match self {
            Self::Uniform => vec![[0.05; 3]; 3],
            Self::Graded => vec![[0.05; 3], [0.1; 3], [0.15; 3]],
        };
        (positions, scales)
    }
}

/// Straight-line path of the trace probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub start: [f32; 3],
    pub end: [f32; 3],
    pub scale: [f32; 3],
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            start: [0.0, 0.0, 0.3],
            end: [0.0, 0.0, 1.5],
            scale: [0.05; 3],
        }
    }
}

/// Full experiment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Dwell needed to select a target.
    pub selection_time_s: f64,
    /// Grace period before a released contact is dropped.
    pub debounce_delay_s: f64,
    /// Length of one trace run.
    pub move_duration_s: f64,
    /// Delay between trial completion and the next trial.
    pub restart_delay_s: f64,
    pub target_positions: Vec<[f32; 3]>,
    pub target_scales: Vec<[f32; 3]>,
    pub probe: Option<ProbeConfig>,
    pub mode: SessionMode,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        let (target_positions, target_scales) = LayoutPreset::Uniform.layout();
        Self {
            selection_time_s: 0.5,
            debounce_delay_s: 0.1,
            move_duration_s: 2.0,
            restart_delay_s: 10.0,
            target_positions,
            target_scales,
            probe: None,
            mode: SessionMode::Trials,
        }
    }
}

impl ExperimentConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_json_str(&json)?;
        info!(path = %path.display(), "Experiment config loaded");
        Ok(config)
    }

    /// Replace the target layout with a preset.
    pub fn apply_preset(&mut self, preset: LayoutPreset) {
        let (positions, scales) = preset.layout();
        self.target_positions = positions;
        self.target_scales = scales;
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("selection_time_s", self.selection_time_s),
            ("debounce_delay_s", self.debounce_delay_s),
            ("move_duration_s", self.move_duration_s),
            ("restart_delay_s", self.restart_delay_s),
        ] {
            if Duration::try_from_secs_f64(value).is_err() {
                return Err(ConfigError::InvalidDuration { name, value });
            }
        }
        if self.target_positions.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        if self.target_positions.len() != self.target_scales.len() {
            return Err(ConfigError::ScaleCountMismatch {
                positions: self.target_positions.len(),
                scales: self.target_scales.len(),
            });
        }
        if self.mode == SessionMode::Trace && self.probe.is_none() {
            return Err(ConfigError::MissingProbe);
        }
        for (i, scale) in self.target_scales.iter().enumerate() {
            if scale[0] <= 0.0 {
                // Not fatal: the index of difficulty for this target reports NaN.
                warn!(target_index = i, size = scale[0], "Target has non-positive size");
            }
        }
        Ok(())
    }

    pub fn selection_time(&self) -> Duration {
        Duration::from_secs_f64(self.selection_time_s)
    }

    pub fn debounce_delay(&self) -> Duration {
        Duration::from_secs_f64(self.debounce_delay_s)
    }

    pub fn move_duration(&self) -> Duration {
        Duration::from_secs_f64(self.move_duration_s)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs_f64(self.restart_delay_s)
    }
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = ExperimentConfig::default();
        assert_eq!(c.selection_time(), Duration::from_millis(500));
        assert_eq!(c.debounce_delay(), Duration::from_millis(100));
        assert_eq!(c.restart_delay(), Duration::from_secs(10));
        assert_eq!(c.target_positions.len(), 3);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let c = ExperimentConfig::from_json_str(r#"{"selection_time_s": 0.8, "restart_delay_s": 3}"#)
            .unwrap();
        assert_eq!(c.selection_time(), Duration::from_millis(800));
        assert_eq!(c.debounce_delay(), Duration::from_millis(100));
        assert_eq!(c.restart_delay(), Duration::from_secs(3));
        assert_eq!(c.mode, SessionMode::Trials);
    }

    #[test]
    fn test_negative_duration_rejected() {
        let err = ExperimentConfig::from_json_str(r#"{"debounce_delay_s": -1.0}"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidDuration {
                name: "debounce_delay_s",
                ..
            }
        ));
    }

    #[test]
    fn test_overflowing_duration_rejected() {
        let err = ExperimentConfig::from_json_str(r#"{"restart_delay_s": 1e30}"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidDuration {
                name: "restart_delay_s",
                ..
            }
        ));
    }

    #[test]
    fn test_scale_mismatch_rejected() {
        let json = r#"{"target_positions": [[0,0,0],[0,0,1]], "target_scales": [[0.1,0.1,0.1]]}"#;
        let err = ExperimentConfig::from_json_str(json).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ScaleCountMismatch {
                positions: 2,
                scales: 1
            }
        ));
    }

    #[test]
    fn test_empty_targets_rejected() {
        let json = r#"{"target_positions": [], "target_scales": []}"#;
        assert!(matches!(
            ExperimentConfig::from_json_str(json),
            Err(ConfigError::NoTargets)
        ));
    }

    #[test]
    fn test_trace_mode_needs_probe() {
        assert!(matches!(
            ExperimentConfig::from_json_str(r#"{"mode": "trace"}"#),
            Err(ConfigError::MissingProbe)
        ));
        let c = ExperimentConfig::from_json_str(r#"{"mode": "trace", "probe": {"end": [0, 0, 2]}}"#)
            .unwrap();
        let probe = c.probe.unwrap();
        assert_eq!(probe.start, [0.0, 0.0, 0.3]);
        assert_eq!(probe.end, [0.0, 0.0, 2.0]);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            ExperimentConfig::from_json_str("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_zero_scale_is_accepted() {
        let json = r#"{"target_positions": [[0,0,0]], "target_scales": [[0,0,0]]}"#;
        assert!(ExperimentConfig::from_json_str(json).is_ok());
    }

    #[test]
    fn test_preset_roundtrip() {
        assert_eq!(LayoutPreset::from_str("graded"), Some(LayoutPreset::Graded));
        assert_eq!(LayoutPreset::from_str("uniform"), Some(LayoutPreset::Uniform));
        assert_eq!(LayoutPreset::from_str("spiral"), None);
        assert_eq!(SessionMode::from_str("trace"), Some(SessionMode::Trace));

        let mut c = ExperimentConfig::default();
        c.apply_preset(LayoutPreset::Graded);
        assert_eq!(c.target_scales[2], [0.15; 3]);
    }
}
