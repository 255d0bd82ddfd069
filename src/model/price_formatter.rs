use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};

use crate::error::{ChartError, ChartResult};

/// Series price precision and minimal price step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceFormat {
    pub precision: u32,
    pub min_move: f64,
}

impl Default for PriceFormat {
    fn default() -> Self {
        Self {
            precision: 2,
            min_move: 0.01,
        }
    }
}

impl PriceFormat {
    pub fn validate(&self) -> ChartResult<()> {
        if !self.min_move.is_finite() || self.min_move <= 0.0 {
            return Err(ChartError::InvalidOptions(format!(
                "min move must be finite and > 0, got {}",
                self.min_move
            )));
        }
        if self.precision > 16 {
            return Err(ChartError::InvalidOptions(format!(
                "precision must be <= 16, got {}",
                self.precision
            )));
        }
        Ok(())
    }

    /// Number of min-move steps per unit; the tick span calculator's base.
    #[must_use]
    pub fn base(&self) -> f64 {
        (1.0 / self.min_move).round()
    }
}

/// Formats prices snapped to `min_move` with a fixed number of decimals.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceFormatter {
    precision: u32,
    min_move: Option<Decimal>,
    suffix: &'static str,
}

impl Default for PriceFormatter {
    fn default() -> Self {
        Self::from_format(PriceFormat::default())
    }
}

impl PriceFormatter {
    #[must_use]
    pub fn from_format(format: PriceFormat) -> Self {
        Self {
            precision: format.precision,
            min_move: Decimal::from_f64(format.min_move).filter(|step| !step.is_zero()),
            suffix: "",
        }
    }

    #[must_use]
    pub fn percentage() -> Self {
        Self {
            suffix: "%",
            ..Self::from_format(PriceFormat::default())
        }
    }

    #[must_use]
    pub fn format(&self, price: f64) -> String {
        let Some(mut value) = Decimal::from_f64(price) else {
            return format!("{price}{}", self.suffix);
        };
        if let Some(step) = self.min_move
            && let Some(snapped) = value
                .checked_div(step)
                .map(|steps| steps.round())
                .and_then(|steps| steps.checked_mul(step))
        {
            value = snapped;
        }
        value = value.round_dp(self.precision);
        if value.is_zero() {
            value.set_sign_positive(true);
        }
        format!(
            "{value:.precision$}{}",
            self.suffix,
            precision = self.precision as usize
        )
    }

    /// Parses a label produced by [`Self::format`] back into a price.
    #[must_use]
    pub fn parse(&self, label: &str) -> Option<f64> {
        label
            .trim()
            .trim_end_matches(self.suffix)
            .parse::<Decimal>()
            .ok()
            .and_then(|value| value.to_f64())
    }
}
