use serde::{Deserialize, Serialize};

use crate::error::{ChartError, ChartResult};
use crate::model::{
    ChartModelOptions, CrosshairMode, CrosshairOptions, PriceScaleMode, PriceScaleOptions,
    TimeScaleOptions,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutOptions {
    pub font_size: f64,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self { font_size: 12.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizationOptions {
    pub locale: String,
    /// `chrono` format string used for crosshair time labels.
    pub date_format: String,
}

impl Default for LocalizationOptions {
    fn default() -> Self {
        Self {
            locale: "en-US".to_owned(),
            date_format: "%d %b '%y".to_owned(),
        }
    }
}

/// Chart bootstrap configuration.
///
/// Every field falls back to its default, so partial JSON documents load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartOptions {
    pub width: f64,
    pub height: f64,
    pub layout: LayoutOptions,
    pub localization: LocalizationOptions,
    pub time_scale: TimeScaleOptions,
    pub left_price_scale: PriceScaleOptions,
    pub right_price_scale: PriceScaleOptions,
    pub overlay_price_scales: PriceScaleOptions,
    pub crosshair: CrosshairOptions,
}

impl Default for ChartOptions {
    fn default() -> Self {
        let model = ChartModelOptions::default();
        Self {
            width: 0.0,
            height: 0.0,
            layout: LayoutOptions::default(),
            localization: LocalizationOptions::default(),
            time_scale: model.time_scale,
            left_price_scale: model.left_price_scale,
            right_price_scale: model.right_price_scale,
            overlay_price_scales: model.overlay_price_scales,
            crosshair: model.crosshair,
        }
    }
}

impl ChartOptions {
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_time_scale(mut self, time_scale: TimeScaleOptions) -> Self {
        self.time_scale = time_scale;
        self
    }

    #[must_use]
    pub fn with_right_price_scale(mut self, options: PriceScaleOptions) -> Self {
        self.right_price_scale = options;
        self
    }

    #[must_use]
    pub fn with_left_price_scale(mut self, options: PriceScaleOptions) -> Self {
        self.left_price_scale = options;
        self
    }

    #[must_use]
    pub fn with_overlay_price_scales(mut self, options: PriceScaleOptions) -> Self {
        self.overlay_price_scales = options;
        self
    }

    #[must_use]
    pub fn with_price_scale_mode(mut self, mode: PriceScaleMode) -> Self {
        self.right_price_scale.mode = mode;
        self
    }

    #[must_use]
    pub fn with_crosshair_mode(mut self, mode: CrosshairMode) -> Self {
        self.crosshair.mode = mode;
        self
    }

    #[must_use]
    pub fn with_font_size(mut self, font_size: f64) -> Self {
        self.layout.font_size = font_size;
        self
    }

    #[must_use]
    pub fn with_localization(mut self, localization: LocalizationOptions) -> Self {
        self.localization = localization;
        self
    }

    pub fn validate(&self) -> ChartResult<()> {
        if !self.width.is_finite()
            || !self.height.is_finite()
            || self.width < 0.0
            || self.height < 0.0
        {
            return Err(ChartError::InvalidViewport {
                width: self.width,
                height: self.height,
            });
        }
        if !self.layout.font_size.is_finite() || self.layout.font_size <= 0.0 {
            return Err(ChartError::InvalidOptions(format!(
                "font size must be finite and > 0, got {}",
                self.layout.font_size
            )));
        }
        self.model_options().validate()
    }

    #[must_use]
    pub fn model_options(&self) -> ChartModelOptions {
        ChartModelOptions {
            time_scale: self.time_scale,
            left_price_scale: self.left_price_scale,
            right_price_scale: self.right_price_scale,
            overlay_price_scales: self.overlay_price_scales,
            crosshair: self.crosshair,
        }
    }

    pub fn to_json_pretty(&self) -> ChartResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ChartError::InvalidData(format!("failed to serialize options: {e}")))
    }

    /// Parses and validates options from JSON.
    pub fn from_json_str(input: &str) -> ChartResult<Self> {
        let options: Self = serde_json::from_str(input)
            .map_err(|e| ChartError::InvalidData(format!("failed to parse options: {e}")))?;
        options.validate()?;
        Ok(options)
    }
}
