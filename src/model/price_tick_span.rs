use crate::error::{ChartError, ChartResult};

const TICK_SPAN_EPSILON: f64 = 1e-14;
const MAX_FRACTIONAL_DIVIDERS: usize = 100;

/// Chooses a "nice" price step: a power of ten divided through a cyclic
/// sequence of dividers, never finer than the base's minimal move.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTickSpanCalculator {
    base: f64,
    integral_dividers: [f64; 3],
    fractional_dividers: Vec<f64>,
}

impl PriceTickSpanCalculator {
    /// `base` is the number of minimal price steps per unit (100 for cents).
    pub fn new(base: f64, integral_dividers: [f64; 3]) -> ChartResult<Self> {
        if !base.is_finite() || base < 0.0 {
            return Err(ChartError::InvalidArgument(format!(
                "tick span base must be finite and >= 0, got {base}"
            )));
        }
        let fractional_dividers = if is_base_decimal(base) {
            vec![2.0, 2.5, 2.0]
        } else {
            let mut dividers = Vec::new();
            let mut rest = base;
            while rest != 1.0 {
                if rest % 2.0 == 0.0 {
                    dividers.push(2.0);
                    rest /= 2.0;
                } else if rest % 5.0 == 0.0 {
                    dividers.extend([2.0, 2.5]);
                    rest /= 5.0;
                } else {
                    return Err(ChartError::InvalidArgument(format!(
                        "unexpected tick span base {base}"
                    )));
                }
                if dividers.len() > MAX_FRACTIONAL_DIVIDERS {
                    return Err(ChartError::InvalidArgument(format!(
                        "tick span base {base} needs too many dividers"
                    )));
                }
            }
            dividers
        };
        Ok(Self {
            base,
            integral_dividers,
            fractional_dividers,
        })
    }

    /// Calculator for a power-of-ten `base` (`10^exponent` steps per unit).
    #[must_use]
    pub fn decimal(exponent: u32, integral_dividers: [f64; 3]) -> Self {
        Self {
            base: 10f64.powi(exponent as i32),
            integral_dividers,
            fractional_dividers: vec![2.0, 2.5, 2.0],
        }
    }

    #[must_use]
    pub fn tick_span(&self, high: f64, low: f64, max_tick_span: f64) -> f64 {
        let min_movement = if self.base == 0.0 { 0.0 } else { 1.0 / self.base };
        let mut result = 10f64.powf((high - low).log10().ceil().max(0.0));
        let mut index = 0;
        let mut divider = self.integral_dividers[0];

        loop {
            // the strict comparison covers spans around 1e-10 where the
            // epsilon comparison alone lets the span collapse
            let larger_than_min_movement = greater_or_equal(result, min_movement)
                && result > min_movement + TICK_SPAN_EPSILON;
            let larger_than_max_tick_span = greater_or_equal(result, max_tick_span * divider);
            let larger_than_one = greater_or_equal(result, 1.0);
            if !(larger_than_min_movement && larger_than_max_tick_span && larger_than_one) {
                break;
            }
            result /= divider;
            index += 1;
            divider = self.integral_dividers[index % self.integral_dividers.len()];
        }

        if result <= min_movement + TICK_SPAN_EPSILON {
            result = min_movement;
        }
        result = result.max(1.0);

        if !self.fractional_dividers.is_empty() && (result - 1.0).abs() < TICK_SPAN_EPSILON {
            index = 0;
            divider = self.fractional_dividers[0];
            while greater_or_equal(result, max_tick_span * divider)
                && result > min_movement + TICK_SPAN_EPSILON
            {
                result /= divider;
                index += 1;
                divider = self.fractional_dividers[index % self.fractional_dividers.len()];
            }
        }
        result
    }
}

fn greater_or_equal(left: f64, right: f64) -> bool {
    right - left <= TICK_SPAN_EPSILON
}

fn is_base_decimal(base: f64) -> bool {
    let mut current = base;
    while current > 1.0 {
        if current % 10.0 != 0.0 {
            return false;
        }
        current /= 10.0;
    }
    true
}
