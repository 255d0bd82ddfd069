use std::collections::BTreeMap;

use crate::core::{
    Generation, InternalTime, Memo, OriginalTime, TickMarkWeight, TimePointIndex, TimeScalePoint,
};

/// Candidate label position on the time axis.
#[derive(Debug, Clone, PartialEq)]
pub struct TickMark {
    pub index: TimePointIndex,
    pub time: InternalTime,
    pub weight: TickMarkWeight,
    pub original_time: OriginalTime,
}

/// Tick-mark candidates grouped by weight, maintained incrementally as time
/// points change.
#[derive(Debug, Default)]
pub struct TickMarks {
    marks_by_weight: BTreeMap<TickMarkWeight, Vec<TickMark>>,
    uniform_distribution: bool,
    generation: Generation,
    cache: Memo<(Generation, i64), Vec<TickMark>>,
}

impl TickMarks {
    #[must_use]
    pub fn new(uniform_distribution: bool) -> Self {
        Self {
            uniform_distribution,
            ..Self::default()
        }
    }

    pub fn set_uniform_distribution(&mut self, uniform_distribution: bool) {
        if self.uniform_distribution != uniform_distribution {
            self.uniform_distribution = uniform_distribution;
            self.generation.bump();
        }
    }

    /// Drops marks at or after `first_changed_point_index` and re-adds them
    /// from `points`.
    pub fn set_time_scale_points(&mut self, points: &[TimeScalePoint], first_changed_point_index: usize) {
        self.remove_marks_since(first_changed_point_index as TimePointIndex);
        self.generation.bump();
        for (index, point) in points.iter().enumerate().skip(first_changed_point_index) {
            self.marks_by_weight
                .entry(point.time_weight)
                .or_default()
                .push(TickMark {
                    index: index as TimePointIndex,
                    time: point.time,
                    weight: point.time_weight,
                    original_time: point.original_time.clone(),
                });
        }
    }

    /// Highest-weight marks that keep at least `ceil(max_width / spacing)`
    /// indices between neighbours.
    pub fn build(&mut self, spacing: f64, max_width: f64) -> &[TickMark] {
        let max_indexes_per_mark = if spacing > 0.0 {
            (max_width / spacing).ceil() as i64
        } else {
            i64::MAX
        };
        let key = (self.generation, max_indexes_per_mark);
        let marks_by_weight = &self.marks_by_weight;
        let uniform = self.uniform_distribution;
        self.cache.get_or_compute(key, || {
            build_marks(marks_by_weight, max_indexes_per_mark, uniform)
        })
    }

    fn remove_marks_since(&mut self, since_index: TimePointIndex) {
        if since_index == 0 {
            self.marks_by_weight.clear();
            return;
        }
        self.marks_by_weight.retain(|_, marks| {
            let keep = marks.partition_point(|mark| mark.index < since_index);
            marks.truncate(keep);
            !marks.is_empty()
        });
    }
}

fn build_marks(
    marks_by_weight: &BTreeMap<TickMarkWeight, Vec<TickMark>>,
    max_indexes_per_mark: i64,
    uniform_distribution: bool,
) -> Vec<TickMark> {
    let mut marks: Vec<TickMark> = Vec::new();
    for current_weight in marks_by_weight.values().rev() {
        let prev_marks = std::mem::take(&mut marks);
        let mut prev_pointer = 0;
        let mut right_index = i64::MAX;
        let mut left_index = i64::MIN;

        for mark in current_weight {
            let current_index = mark.index;
            while prev_pointer < prev_marks.len() {
                let accepted = &prev_marks[prev_pointer];
                if accepted.index < current_index {
                    prev_pointer += 1;
                    marks.push(accepted.clone());
                    left_index = accepted.index;
                    right_index = i64::MAX;
                } else {
                    right_index = accepted.index;
                    break;
                }
            }

            if right_index.saturating_sub(current_index) >= max_indexes_per_mark
                && current_index.saturating_sub(left_index) >= max_indexes_per_mark
            {
                marks.push(mark.clone());
                left_index = current_index;
            } else if uniform_distribution {
                return prev_marks;
            }
        }
        marks.extend(prev_marks[prev_pointer..].iter().cloned());
    }
    marks
}
