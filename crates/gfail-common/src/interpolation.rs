//! Resampling method names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Interpolation method used when resampling a layer onto the model grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationMethod {
    /// Nearest neighbor (preserves exact values, for categorical layers).
    Nearest,
    /// Bilinear interpolation.
    #[default]
    Linear,
    /// Bicubic (Catmull-Rom) interpolation.
    Cubic,
}

impl InterpolationMethod {
    pub const ALL: [InterpolationMethod; 3] = [Self::Linear, Self::Nearest, Self::Cubic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::Linear => "linear",
            Self::Cubic => "cubic",
        }
    }
}

impl FromStr for InterpolationMethod {
    type Err = String;

    /// Exact, lowercase method names only.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nearest" => Ok(Self::Nearest),
            "linear" => Ok(Self::Linear),
            "cubic" => Ok(Self::Cubic),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for InterpolationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
