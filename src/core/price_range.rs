use serde::{Deserialize, Serialize};

/// Closed `[min, max]` price interval; `min == max` means empty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    min: f64,
    max: f64,
}

impl PriceRange {
    #[must_use]
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn min(self) -> f64 {
        self.min
    }

    #[must_use]
    pub fn max(self) -> f64 {
        self.max
    }

    #[must_use]
    pub fn length(self) -> f64 {
        self.max - self.min
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.min == self.max || self.min.is_nan() || self.max.is_nan()
    }

    /// Approximate value equality used to skip redundant invalidations.
    #[must_use]
    pub fn equals(self, other: PriceRange) -> bool {
        (self.min - other.min).abs() < 1e-12 && (self.max - other.max).abs() < 1e-12
    }

    /// Union of both ranges. A non-finite bound on one side leaves the other
    /// range's bound in charge of that side.
    #[must_use]
    pub fn merge(self, other: PriceRange) -> Self {
        Self {
            min: finite_fold(self.min, other.min, f64::min),
            max: finite_fold(self.max, other.max, f64::max),
        }
    }

    /// `merge` lifted over optional ranges; `None` is the identity.
    #[must_use]
    pub fn merge_opt(left: Option<PriceRange>, right: Option<PriceRange>) -> Option<PriceRange> {
        match (left, right) {
            (Some(l), Some(r)) => Some(l.merge(r)),
            (Some(range), None) | (None, Some(range)) => Some(range),
            (None, None) => None,
        }
    }

    pub fn scale_around_center(&mut self, coeff: f64) {
        if !coeff.is_finite() || self.length() == 0.0 {
            return;
        }
        let center = (self.max + self.min) * 0.5;
        let max_delta = (self.max - center) * coeff;
        let min_delta = (self.min - center) * coeff;
        self.max = center + max_delta;
        self.min = center + min_delta;
    }

    pub fn shift(&mut self, delta: f64) {
        if !delta.is_finite() {
            return;
        }
        self.max += delta;
        self.min += delta;
    }

    #[must_use]
    pub fn contains_strictly(self, other: PriceRange) -> bool {
        other.min > self.min && other.max < self.max
    }
}

fn finite_fold(left: f64, right: f64, pick: fn(f64, f64) -> f64) -> f64 {
    match (left.is_finite(), right.is_finite()) {
        (true, true) => pick(left, right),
        (true, false) => left,
        (false, true) => right,
        (false, false) => left,
    }
}
