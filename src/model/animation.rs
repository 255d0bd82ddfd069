use crate::error::{ChartError, ChartResult};

/// Linear right-offset transition, evaluated as a pure function of time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Animation {
    from: f64,
    to: f64,
    start_time: f64,
    duration: f64,
}

impl Animation {
    /// Starts a transition from `from` to `to` at `now` (milliseconds).
    pub fn start(from: f64, to: f64, now: f64, duration: f64) -> ChartResult<Self> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(ChartError::InvalidArgument(format!(
                "animation duration must be finite and >= 0, got {duration}"
            )));
        }
        if !from.is_finite() || !to.is_finite() || !now.is_finite() {
            return Err(ChartError::InvalidArgument(
                "animation endpoints and start time must be finite".to_owned(),
            ));
        }
        Ok(Self {
            from,
            to,
            start_time: now,
            duration,
        })
    }

    #[must_use]
    pub fn target(self) -> f64 {
        self.to
    }

    #[must_use]
    pub fn start_time(self) -> f64 {
        self.start_time
    }

    #[must_use]
    pub fn is_finished(self, now: f64) -> bool {
        if self.duration <= 0.0 {
            return true;
        }
        (now - self.start_time) / self.duration >= 1.0
    }

    #[must_use]
    pub fn position_at(self, now: f64) -> f64 {
        if self.is_finished(now) {
            return self.to;
        }
        let progress = ((now - self.start_time) / self.duration).clamp(0.0, 1.0);
        self.from + (self.to - self.from) * progress
    }
}
