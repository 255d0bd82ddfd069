use std::cell::RefCell;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ChartError, ChartResult};

use super::{InternalTime, OriginalTime, TimePointIndex};

const CHUNK_SIZE: TimePointIndex = 30;

/// Column of [`PlotRow::value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(usize)]
pub enum PlotRowValueIndex {
    Open = 0,
    High = 1,
    Low = 2,
    Close = 3,
}

/// One stored bar of a series. Single-value series repeat the value in all
/// four slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotRow {
    pub index: TimePointIndex,
    pub time: InternalTime,
    pub value: [f64; 4],
    pub color: Option<String>,
    pub original_time: OriginalTime,
    pub custom_values: Option<Vec<f64>>,
}

impl PlotRow {
    #[must_use]
    pub fn value_of(&self, column: PlotRowValueIndex) -> f64 {
        self.value[column as usize]
    }

    #[must_use]
    pub fn close(&self) -> f64 {
        self.value_of(PlotRowValueIndex::Close)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinMax {
    pub min: f64,
    pub max: f64,
}

impl MinMax {
    #[must_use]
    pub fn merge(self, other: MinMax) -> MinMax {
        MinMax {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    #[must_use]
    pub fn merge_opt(left: Option<MinMax>, right: Option<MinMax>) -> Option<MinMax> {
        match (left, right) {
            (Some(l), Some(r)) => Some(l.merge(r)),
            (value, None) | (None, value) => value,
        }
    }
}

/// Which neighbour `search` falls back to when the index has no row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchDirection {
    None,
    NearestLeft,
    NearestRight,
}

/// Per-series rows ordered by logical index, with memoized chunk min/max.
#[derive(Debug, Default)]
pub struct PlotList {
    rows: Vec<PlotRow>,
    min_max_cache: RefCell<HashMap<(PlotRowValueIndex, TimePointIndex), Option<MinMax>>>,
}

impl Clone for PlotList {
    fn clone(&self) -> Self {
        Self {
            rows: self.rows.clone(),
            min_max_cache: RefCell::new(HashMap::new()),
        }
    }
}

impl PlotList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all rows. Rows must be strictly ascending by index.
    pub fn set_data(&mut self, rows: Vec<PlotRow>) -> ChartResult<()> {
        if let Some(window) = rows.windows(2).find(|w| w[0].index >= w[1].index) {
            return Err(ChartError::InvalidData(format!(
                "plot rows must be strictly ascending by index: {} then {}",
                window[0].index, window[1].index
            )));
        }
        self.rows = rows;
        self.min_max_cache.get_mut().clear();
        Ok(())
    }

    /// Replaces the last row or appends a newer one (realtime tick).
    pub fn update_last(&mut self, row: PlotRow) -> ChartResult<()> {
        match self.rows.last_mut() {
            Some(last) if last.index == row.index => {
                let index = row.index;
                *last = row;
                self.evict_chunk_of(index);
                Ok(())
            }
            Some(last) if last.index > row.index => Err(ChartError::InvalidData(format!(
                "cannot update row {} older than last row {}",
                row.index, last.index
            ))),
            _ => {
                let index = row.index;
                self.rows.push(row);
                self.evict_chunk_of(index);
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn rows(&self) -> &[PlotRow] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> Option<&PlotRow> {
        self.rows.first()
    }

    #[must_use]
    pub fn last(&self) -> Option<&PlotRow> {
        self.rows.last()
    }

    #[must_use]
    pub fn first_index(&self) -> Option<TimePointIndex> {
        self.rows.first().map(|row| row.index)
    }

    #[must_use]
    pub fn last_index(&self) -> Option<TimePointIndex> {
        self.rows.last().map(|row| row.index)
    }

    #[must_use]
    pub fn value_at(&self, index: TimePointIndex) -> Option<&PlotRow> {
        self.search(index, MismatchDirection::None)
    }

    #[must_use]
    pub fn contains(&self, index: TimePointIndex) -> bool {
        self.value_at(index).is_some()
    }

    #[must_use]
    pub fn search(&self, index: TimePointIndex, direction: MismatchDirection) -> Option<&PlotRow> {
        let position = self.lower_bound(index);
        if let Some(row) = self.rows.get(position)
            && row.index == index
        {
            return Some(row);
        }
        match direction {
            MismatchDirection::None => None,
            MismatchDirection::NearestLeft => position.checked_sub(1).map(|p| &self.rows[p]),
            MismatchDirection::NearestRight => self.rows.get(position),
        }
    }

    /// Rows whose index lies in `[from, to]`.
    #[must_use]
    pub fn rows_in_range(&self, from: TimePointIndex, to: TimePointIndex) -> &[PlotRow] {
        if from > to {
            return &[];
        }
        &self.rows[self.lower_bound(from)..self.upper_bound(to)]
    }

    /// Min/max of the given columns over rows with index in `[start, end]`.
    ///
    /// Whole 30-index chunks inside the range are memoized; only the partial
    /// chunks at both edges are scanned on every call.
    #[must_use]
    pub fn min_max_on_range_cached(
        &self,
        start: TimePointIndex,
        end: TimePointIndex,
        columns: &[PlotRowValueIndex],
    ) -> Option<MinMax> {
        let (first, last) = (self.first_index()?, self.last_index()?);
        let s = start.max(first);
        let e = end.min(last);
        if s > e {
            return None;
        }
        columns
            .iter()
            .map(|column| self.min_max_column_cached(s, e, *column))
            .fold(None, MinMax::merge_opt)
    }

    fn min_max_column_cached(
        &self,
        s: TimePointIndex,
        e: TimePointIndex,
        column: PlotRowValueIndex,
    ) -> Option<MinMax> {
        let first_chunk = (s + CHUNK_SIZE - 1).div_euclid(CHUNK_SIZE);
        let end_chunk = (e + 1).div_euclid(CHUNK_SIZE);
        if first_chunk >= end_chunk {
            return plot_min_max(self.rows_in_range(s, e), column);
        }

        let mut result = plot_min_max(self.rows_in_range(s, first_chunk * CHUNK_SIZE - 1), column);
        let mut cache = self.min_max_cache.borrow_mut();
        for chunk in first_chunk..end_chunk {
            let chunk_min_max = *cache.entry((column, chunk)).or_insert_with(|| {
                plot_min_max(
                    self.rows_in_range(chunk * CHUNK_SIZE, (chunk + 1) * CHUNK_SIZE - 1),
                    column,
                )
            });
            result = MinMax::merge_opt(result, chunk_min_max);
        }
        MinMax::merge_opt(
            result,
            plot_min_max(self.rows_in_range(end_chunk * CHUNK_SIZE, e), column),
        )
    }

    fn evict_chunk_of(&mut self, index: TimePointIndex) {
        let chunk = index.div_euclid(CHUNK_SIZE);
        self.min_max_cache
            .get_mut()
            .retain(|(_, cached_chunk), _| *cached_chunk != chunk);
    }

    fn lower_bound(&self, index: TimePointIndex) -> usize {
        self.rows.partition_point(|row| row.index < index)
    }

    fn upper_bound(&self, index: TimePointIndex) -> usize {
        self.rows.partition_point(|row| row.index <= index)
    }

    #[cfg(test)]
    fn cached_chunk_count(&self) -> usize {
        self.min_max_cache.borrow().len()
    }
}

fn plot_min_max(rows: &[PlotRow], column: PlotRowValueIndex) -> Option<MinMax> {
    rows.iter()
        .map(|row| row.value_of(column))
        .filter(|value| value.is_finite())
        .fold(None, |acc: Option<MinMax>, value| {
            Some(match acc {
                Some(acc) => MinMax {
                    min: acc.min.min(value),
                    max: acc.max.max(value),
                },
                None => MinMax {
                    min: value,
                    max: value,
                },
            })
        })
}
