use std::collections::BTreeMap;
use std::path::Path;

use crate::animation::ease::Ease;
use crate::animation::motion::{AnimationOptions, DEFAULT_DURATION_MS};
use crate::foundation::error::{MarkerflowError, MarkerflowResult};
use crate::trail::visualizer::TrailOptions;

/// Thresholds installed when the config does not override them, in milliseconds.
pub const DEFAULT_THRESHOLDS: [(&str, f64); 4] = [
    ("marker-creation", 50.0),
    ("position-update", 16.0),
    ("map-pan", 300.0),
    ("api-request", 1000.0),
];

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct AnimationConfig {
    /// Milliseconds per marker animation.
    pub duration: f64,
    pub easing: Ease,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            duration: DEFAULT_DURATION_MS,
            easing: Ease::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct PerformanceConfig {
    /// Metric name to advisory duration limit in milliseconds.
    pub thresholds: BTreeMap<String, f64>,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            thresholds: DEFAULT_THRESHOLDS
                .iter()
                .map(|(name, ms)| ((*name).to_owned(), *ms))
                .collect(),
        }
    }
}

/// Every tunable of the engine. Missing fields take their defaults.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct EngineConfig {
    pub animation: AnimationConfig,
    pub trail: TrailOptions,
    pub performance: PerformanceConfig,
}

impl EngineConfig {
    pub fn from_json_str(s: &str) -> MarkerflowResult<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> MarkerflowResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            MarkerflowError::config(format!("read config '{}': {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> MarkerflowResult<()> {
        let duration = self.animation.duration;
        if !duration.is_finite() || duration < 0.0 {
            return Err(MarkerflowError::config(format!(
                "animation duration must be finite and >= 0, got {duration}"
            )));
        }

        let trail = &self.trail;
        if trail.max_points == 0 {
            return Err(MarkerflowError::config("trail maxPoints must be >= 1"));
        }
        if !(trail.line_opacity > 0.0 && trail.line_opacity <= 1.0) {
            return Err(MarkerflowError::config(format!(
                "trail lineOpacity must be in (0, 1], got {}",
                trail.line_opacity
            )));
        }
        if !trail.fade_out_ms.is_finite() || trail.fade_out_ms < 0.0 {
            return Err(MarkerflowError::config(format!(
                "trail fadeOutDuration must be finite and >= 0, got {}",
                trail.fade_out_ms
            )));
        }
        if trail.line_color.trim().is_empty() {
            return Err(MarkerflowError::config("trail lineColor must be non-empty"));
        }

        for (name, ms) in &self.performance.thresholds {
            if !ms.is_finite() || *ms < 0.0 {
                return Err(MarkerflowError::config(format!(
                    "threshold '{name}' must be finite and >= 0, got {ms}"
                )));
            }
        }
        Ok(())
    }

    /// Motion controller options without callbacks.
    pub fn animation_options(&self) -> AnimationOptions {
        AnimationOptions {
            duration_ms: self.animation.duration,
            ease: self.animation.easing,
            ..AnimationOptions::default()
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/config/config.rs"]
mod tests;
