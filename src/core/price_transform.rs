//! Forward/inverse transforms between raw prices and a price scale's logical
//! space for the log, percentage and indexed-to-100 modes.

use super::PriceRange;

const LOG_ZERO_EPSILON: f64 = 1e-15;

/// Offsets applied around `log10` so narrow ranges keep their precision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogFormula {
    pub logical_offset: f64,
    pub coord_offset: f64,
}

impl Default for LogFormula {
    fn default() -> Self {
        Self {
            logical_offset: 4.0,
            coord_offset: 0.0001,
        }
    }
}

impl LogFormula {
    #[must_use]
    pub fn same_as(self, other: LogFormula) -> bool {
        (self.logical_offset - other.logical_offset).abs() <= f64::EPSILON
            && (self.coord_offset - other.coord_offset).abs() <= f64::EPSILON
    }
}

#[must_use]
pub fn to_percent(value: f64, base_value: f64) -> f64 {
    let result = 100.0 * (value - base_value) / base_value;
    if base_value < 0.0 { -result } else { result }
}

#[must_use]
pub fn from_percent(value: f64, base_value: f64) -> f64 {
    let value = if base_value < 0.0 { -value } else { value };
    (value / 100.0) * base_value + base_value
}

#[must_use]
pub fn to_indexed_to_100(value: f64, base_value: f64) -> f64 {
    let result = 100.0 * (value - base_value) / base_value + 100.0;
    if base_value < 0.0 { -result } else { result }
}

#[must_use]
pub fn from_indexed_to_100(value: f64, base_value: f64) -> f64 {
    let mut value = value - 100.0;
    if base_value < 0.0 {
        value = -value;
    }
    (value / 100.0) * base_value + base_value
}

#[must_use]
pub fn to_percent_range(range: PriceRange, base_value: f64) -> PriceRange {
    PriceRange::new(
        to_percent(range.min(), base_value),
        to_percent(range.max(), base_value),
    )
}

#[must_use]
pub fn from_percent_range(range: PriceRange, base_value: f64) -> PriceRange {
    PriceRange::new(
        from_percent(range.min(), base_value),
        from_percent(range.max(), base_value),
    )
}

#[must_use]
pub fn to_indexed_to_100_range(range: PriceRange, base_value: f64) -> PriceRange {
    PriceRange::new(
        to_indexed_to_100(range.min(), base_value),
        to_indexed_to_100(range.max(), base_value),
    )
}

#[must_use]
pub fn from_indexed_to_100_range(range: PriceRange, base_value: f64) -> PriceRange {
    PriceRange::new(
        from_indexed_to_100(range.min(), base_value),
        from_indexed_to_100(range.max(), base_value),
    )
}

#[must_use]
pub fn to_log(price: f64, formula: LogFormula) -> f64 {
    let magnitude = price.abs();
    if magnitude < LOG_ZERO_EPSILON {
        return 0.0;
    }
    let value = (magnitude + formula.coord_offset).log10() + formula.logical_offset;
    if price < 0.0 { -value } else { value }
}

#[must_use]
pub fn from_log(logical: f64, formula: LogFormula) -> f64 {
    let magnitude = logical.abs();
    if magnitude < LOG_ZERO_EPSILON {
        return 0.0;
    }
    let value = 10f64.powf(magnitude - formula.logical_offset) - formula.coord_offset;
    if logical < 0.0 { -value } else { value }
}

#[must_use]
pub fn convert_price_range_to_log(
    range: Option<PriceRange>,
    formula: LogFormula,
) -> Option<PriceRange> {
    range.map(|r| PriceRange::new(to_log(r.min(), formula), to_log(r.max(), formula)))
}

#[must_use]
pub fn convert_price_range_from_log(
    range: Option<PriceRange>,
    formula: LogFormula,
) -> Option<PriceRange> {
    range.map(|r| PriceRange::new(from_log(r.min(), formula), from_log(r.max(), formula)))
}

/// Chooses log offsets for a raw (non-log) range. Ranges narrower than 1.0
/// shift the offsets by the number of leading decimal digits.
#[must_use]
pub fn log_formula_for_price_range(range: Option<PriceRange>) -> LogFormula {
    let default = LogFormula::default();
    let Some(range) = range else {
        return default;
    };
    let diff = (range.max() - range.min()).abs();
    if !(LOG_ZERO_EPSILON..1.0).contains(&diff) {
        return default;
    }
    let digits = diff.log10().abs().ceil();
    let logical_offset = default.logical_offset + digits;
    let coord_offset = 1.0 / 10f64.powf(logical_offset);
    LogFormula {
        logical_offset,
        coord_offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_scenario() {
        assert!((to_percent(110.0, 100.0) - 10.0).abs() < 1e-12);
        assert!((from_percent(10.0, 100.0) - 110.0).abs() < 1e-12);
    }

    #[test]
    fn percent_sign_flips_for_negative_base() {
        let value = to_percent(-110.0, -100.0);
        assert!((value - 10.0).abs() < 1e-12);
        assert!((from_percent(value, -100.0) + 110.0).abs() < 1e-12);
    }

    #[test]
    fn indexed_to_100_is_offset_percent() {
        assert!((to_indexed_to_100(110.0, 100.0) - 110.0).abs() < 1e-12);
        assert!((from_indexed_to_100(110.0, 100.0) - 110.0).abs() < 1e-12);
        assert!((to_indexed_to_100(50.0, 100.0) - 50.0).abs() < 1e-12);
    }

    #[test]
    fn log_of_near_zero_is_zero() {
        let formula = LogFormula::default();
        assert_eq!(to_log(1e-16, formula), 0.0);
        assert_eq!(from_log(-1e-16, formula), 0.0);
    }

    #[test]
    fn narrow_range_gets_more_decimal_digits() {
        let formula = log_formula_for_price_range(Some(PriceRange::new(0.001, 0.002)));
        assert_eq!(formula.logical_offset, 7.0);
        assert!((formula.coord_offset - 1e-7).abs() < 1e-20);
        let wide = log_formula_for_price_range(Some(PriceRange::new(1.0, 100.0)));
        assert!(wide.same_as(LogFormula::default()));
    }
}
