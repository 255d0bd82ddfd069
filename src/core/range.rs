use serde::{Deserialize, Serialize};

use crate::error::{ChartError, ChartResult};

/// Logical bar index shared by every series on a chart.
pub type TimePointIndex = i64;

/// Closed integer interval `[left, right]` of logical indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StrictRange {
    left: TimePointIndex,
    right: TimePointIndex,
}

impl StrictRange {
    /// Builds a range from already-ordered bounds.
    ///
    /// Internal callers derive bounds from `floor`/`ceil` of a logical range, so
    /// ordering is guaranteed; use [`StrictRange::try_new`] for external input.
    #[must_use]
    pub fn new(left: TimePointIndex, right: TimePointIndex) -> Self {
        debug_assert!(left <= right, "strict range left must be <= right");
        Self { left, right }
    }

    pub fn try_new(left: TimePointIndex, right: TimePointIndex) -> ChartResult<Self> {
        if left > right {
            return Err(ChartError::InvalidArgument(format!(
                "range left ({left}) must be <= right ({right})"
            )));
        }
        Ok(Self { left, right })
    }

    #[must_use]
    pub fn left(self) -> TimePointIndex {
        self.left
    }

    #[must_use]
    pub fn right(self) -> TimePointIndex {
        self.right
    }

    #[must_use]
    pub fn count(self) -> i64 {
        self.right - self.left + 1
    }

    #[must_use]
    pub fn contains(self, index: TimePointIndex) -> bool {
        self.left <= index && index <= self.right
    }
}

/// Floating logical range; fractional bounds describe partially visible bars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogicalRange {
    pub from: f64,
    pub to: f64,
}

impl LogicalRange {
    #[must_use]
    pub fn new(from: f64, to: f64) -> Self {
        Self { from, to }
    }

    #[must_use]
    pub fn left(self) -> f64 {
        self.from
    }

    #[must_use]
    pub fn right(self) -> f64 {
        self.to
    }

    #[must_use]
    pub fn length(self) -> f64 {
        self.to - self.from
    }

    #[must_use]
    pub fn is_finite(self) -> bool {
        self.from.is_finite() && self.to.is_finite()
    }

    #[must_use]
    pub fn to_strict(self) -> StrictRange {
        StrictRange::new(self.from.floor() as TimePointIndex, self.to.ceil() as TimePointIndex)
    }
}
