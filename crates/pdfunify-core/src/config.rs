use serde::{Deserialize, Serialize};

use crate::error::{Result, UnifyError};

/// Width of an A4 sheet in PDF points.
pub const A4_WIDTH_PT: f64 = 595.2764;

/// Knobs for a unify run. Every field has a default, so a partial JSON
/// object is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnifyOptions {
    /// Page width every output page is scaled to, in points.
    pub target_width: f64,
    /// Compress streams before writing.
    pub compress: bool,
    /// Fallback font family for text in vector graphics.
    pub font_family: String,
}

impl Default for UnifyOptions {
    fn default() -> Self {
        Self {
            target_width: A4_WIDTH_PT,
            compress: true,
            font_family: "Arial".to_string(),
        }
    }
}

impl UnifyOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| UnifyError::InputError(format!("Invalid options: {}", e)))
    }
}
