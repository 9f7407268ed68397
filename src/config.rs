//! Layout options.
//!
//! Every value is a plain input to layout; nothing here touches the
//! outside world. Unknown JSON keys are rejected so typos surface early.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Target system width used when the caller passes none.
    pub width: f64,
    /// Paged layout is not supported; must stay `None`.
    pub height: Option<f64>,

    pub score_padding_top: f64,
    pub score_padding_bottom: f64,
    pub title_font_size: f64,
    pub title_padding_bottom: f64,
    pub part_label_font_size: f64,
    pub part_label_padding_right: f64,

    pub system_margin_bottom: f64,
    pub stave_margin_bottom: f64,
    pub stave_line_spacing: f64,
    pub stave_padding_left: f64,

    pub base_voice_width: f64,
    pub base_multi_rest_measure_width: f64,
    pub gap_width: f64,
    /// The last system is only justified when `slack / width` is below this.
    pub last_system_slack_threshold: f64,

    pub slow_warning_threshold_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            width: 900.0,
            height: None,
            score_padding_top: 40.0,
            score_padding_bottom: 40.0,
            title_font_size: 36.0,
            title_padding_bottom: 20.0,
            part_label_font_size: 13.0,
            part_label_padding_right: 8.0,
            system_margin_bottom: 20.0,
            stave_margin_bottom: 20.0,
            stave_line_spacing: 10.0,
            stave_padding_left: 10.0,
            base_voice_width: 64.0,
            base_multi_rest_measure_width: 200.0,
            gap_width: 120.0,
            last_system_slack_threshold: 0.25,
            slow_warning_threshold_ms: 100,
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Error::Config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config = Config::from_json(r#"{ "width": 640, "slow_warning_threshold_ms": 5 }"#).unwrap();
        assert_eq!(config.width, 640.0);
        assert_eq!(config.slow_warning_threshold_ms, 5);
        assert_eq!(config.base_voice_width, Config::default().base_voice_width);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Config::from_json(r#"{ "widht": 640 }"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().starts_with("invalid config"));
    }
}
