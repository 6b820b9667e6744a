use std::str::FromStr;

use crate::foundation::error::MarkerflowError;

/// Easing curve mapping linear time progress in [0, 1] to motion progress in [0, 1].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Ease {
    #[serde(rename = "linear")]
    Linear,
    #[serde(rename = "easeIn")]
    InQuad,
    #[serde(rename = "easeOut")]
    OutQuad,
    #[default]
    #[serde(rename = "easeInOut")]
    InOutQuad,
    #[serde(rename = "easeInCubic")]
    InCubic,
    #[serde(rename = "easeOutCubic")]
    OutCubic,
    #[serde(rename = "easeInOutCubic")]
    InOutCubic,
}

impl Ease {
    pub const ALL: [Ease; 7] = [
        Ease::Linear,
        Ease::InQuad,
        Ease::OutQuad,
        Ease::InOutQuad,
        Ease::InCubic,
        Ease::OutCubic,
        Ease::InOutCubic,
    ];

    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::InQuad => t * t,
            Self::OutQuad => t * (2.0 - t),
            Self::InOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    -1.0 + (4.0 - 2.0 * t) * t
                }
            }
            Self::InCubic => t * t * t,
            Self::OutCubic => 1.0 - (1.0 - t).powi(3),
            Self::InOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - ((-2.0 * t + 2.0).powi(3) / 2.0)
                }
            }
        }
    }

    /// Configuration name of this curve.
    pub fn name(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::InQuad => "easeIn",
            Self::OutQuad => "easeOut",
            Self::InOutQuad => "easeInOut",
            Self::InCubic => "easeInCubic",
            Self::OutCubic => "easeOutCubic",
            Self::InOutCubic => "easeInOutCubic",
        }
    }
}

impl FromStr for Ease {
    type Err = MarkerflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|e| e.name() == s)
            .ok_or_else(|| MarkerflowError::config(format!("unknown easing '{s}'")))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/animation/ease.rs"]
mod tests;
