//! Shared time axis across all series and per-series plot rows, updated
//! incrementally on every data mutation.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::core::{
    InternalTime, OriginalTime, PlotRow, TimeInput, TimePointIndex, TimeRepresentation,
    TimeScalePoint, convert_time, convert_times, fill_weights_for_points,
};
use crate::error::{ChartError, ChartResult};

use super::series::{SeriesId, SeriesKind};

/// One data item as supplied by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeriesDataItem {
    Ohlc {
        time: TimeInput,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
    },
    Single {
        time: TimeInput,
        value: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
    },
    /// Occupies a slot on the time axis without a value.
    Whitespace { time: TimeInput },
}

impl SeriesDataItem {
    #[must_use]
    pub fn whitespace(time: impl Into<TimeInput>) -> Self {
        Self::Whitespace { time: time.into() }
    }

    #[must_use]
    pub fn single(time: impl Into<TimeInput>, value: f64) -> Self {
        Self::Single {
            time: time.into(),
            value,
            color: None,
        }
    }

    #[must_use]
    pub fn ohlc(time: impl Into<TimeInput>, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self::Ohlc {
            time: time.into(),
            open,
            high,
            low,
            close,
            color: None,
        }
    }

    #[must_use]
    pub fn with_color(mut self, value: impl Into<String>) -> Self {
        match &mut self {
            Self::Ohlc { color, .. } | Self::Single { color, .. } => *color = Some(value.into()),
            Self::Whitespace { .. } => {}
        }
        self
    }

    #[must_use]
    pub fn time(&self) -> &TimeInput {
        match self {
            Self::Ohlc { time, .. } | Self::Single { time, .. } | Self::Whitespace { time } => time,
        }
    }

    #[must_use]
    pub fn is_whitespace(&self) -> bool {
        matches!(self, Self::Whitespace { .. })
    }

    /// `None` for whitespace. Single-value kinds read the close of OHLC items.
    fn to_plot_row(&self, kind: SeriesKind, time: InternalTime) -> ChartResult<Option<PlotRow>> {
        let (value, color) = match self {
            Self::Whitespace { .. } => return Ok(None),
            Self::Ohlc {
                open,
                high,
                low,
                close,
                color,
                ..
            } => ([*open, *high, *low, *close], color),
            Self::Single { value, color, .. } => {
                if kind.behavior().requires_ohlc {
                    return Err(ChartError::InvalidData(format!(
                        "{kind:?} series item at {time} requires open/high/low/close"
                    )));
                }
                ([*value; 4], color)
            }
        };
        if let Some(bad) = value.iter().find(|v| !v.is_finite()) {
            return Err(ChartError::InvalidData(format!(
                "series item at {time} has non-finite value {bad}"
            )));
        }
        let value = if kind.behavior().requires_ohlc {
            value
        } else {
            [value[3]; 4]
        };
        Ok(Some(PlotRow {
            index: 0,
            time,
            value,
            color: color.clone(),
            original_time: self.time().clone(),
            custom_values: None,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesUpdateInfo {
    pub last_bar_updated_or_new_bars_added_to_the_right: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesChanges<'a> {
    pub rows: &'a [PlotRow],
    pub info: Option<SeriesUpdateInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeScaleChanges<'a> {
    pub base_index: Option<TimePointIndex>,
    /// Present only when the time axis changed.
    pub points: Option<&'a [TimeScalePoint]>,
    pub first_changed_point_index: Option<usize>,
}

/// What a data mutation changed: rows of every series whose rows moved, and
/// the time axis delta.
#[derive(Debug, Clone, PartialEq)]
pub struct DataUpdateResponse<'a> {
    pub series: IndexMap<SeriesId, SeriesChanges<'a>>,
    pub time_scale: TimeScaleChanges<'a>,
}

#[derive(Debug, Clone)]
struct TimePointData {
    index: TimePointIndex,
    time: InternalTime,
    mapping: SmallVec<[(SeriesId, OriginalTime); 2]>,
}

impl TimePointData {
    fn new(time: InternalTime) -> Self {
        Self {
            index: 0,
            time,
            mapping: SmallVec::new(),
        }
    }

    fn set(&mut self, series: SeriesId, original_time: OriginalTime) {
        match self.mapping.iter_mut().find(|(id, _)| *id == series) {
            Some(entry) => entry.1 = original_time,
            None => self.mapping.push((series, original_time)),
        }
    }

    fn remove(&mut self, series: SeriesId) -> bool {
        let before = self.mapping.len();
        self.mapping.retain(|(id, _)| *id != series);
        before != self.mapping.len()
    }

    fn original_time(&self) -> OriginalTime {
        self.mapping
            .first()
            .map_or(TimeInput::Timestamp(self.time.timestamp), |(_, time)| {
                time.clone()
            })
    }
}

#[derive(Debug, Clone)]
struct SeriesRows {
    rows: Vec<PlotRow>,
    last_time: InternalTime,
    representation: TimeRepresentation,
}

#[derive(Debug, Default)]
pub struct DataLayer {
    point_data_by_time: BTreeMap<i64, TimePointData>,
    series_rows: IndexMap<SeriesId, SeriesRows>,
    sorted_time_points: Vec<TimeScalePoint>,
}

impl DataLayer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn points(&self) -> &[TimeScalePoint] {
        &self.sorted_time_points
    }

    #[must_use]
    pub fn series_rows(&self, series: SeriesId) -> &[PlotRow] {
        self.series_rows
            .get(&series)
            .map_or(&[], |entry| entry.rows.as_slice())
    }

    /// Time of the newest item of `series`, whitespace included.
    #[must_use]
    pub fn last_time(&self, series: SeriesId) -> Option<InternalTime> {
        self.series_rows.get(&series).map(|entry| entry.last_time)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series_rows.is_empty()
    }

    /// Replaces all data of `series`. Items must be strictly ascending by
    /// time and share one time representation; nothing is changed on error.
    pub fn set_series_data(
        &mut self,
        series: SeriesId,
        kind: SeriesKind,
        items: &[SeriesDataItem],
    ) -> ChartResult<DataUpdateResponse<'_>> {
        let times = convert_times(items.iter().map(SeriesDataItem::time))?;
        if let Some(position) = times.windows(2).position(|pair| pair[0] >= pair[1]) {
            return Err(ChartError::InvalidData(format!(
                "data must be asc ordered by time, index={}, time={}, prev time={}",
                position + 1,
                times[position + 1],
                times[position]
            )));
        }
        let entries = items
            .iter()
            .zip(&times)
            .map(|(item, time)| {
                Ok((*time, item.time().clone(), item.to_plot_row(kind, *time)?))
            })
            .collect::<ChartResult<Vec<_>>>()?;
        let representation = items.first().map(|item| item.time().representation());
        debug!(%series, ?kind, count = entries.len(), "set series data");
        Ok(self.replace_series_data(series, entries, representation))
    }

    /// Drops every row and time point that belonged only to `series`.
    pub fn remove_series(&mut self, series: SeriesId) -> DataUpdateResponse<'_> {
        debug!(%series, "remove series data");
        self.replace_series_data(series, Vec::new(), None)
    }

    /// Realtime tick: replaces the item at an existing time or adds a newer one.
    pub fn update_series_data(
        &mut self,
        series: SeriesId,
        kind: SeriesKind,
        item: &SeriesDataItem,
    ) -> ChartResult<DataUpdateResponse<'_>> {
        let time = convert_time(item.time())?;
        let representation = item.time().representation();
        if let Some(existing) = self.series_rows.get(&series) {
            if existing.representation != representation {
                return Err(ChartError::InvalidData(format!(
                    "update uses {representation:?}, series data uses {:?}",
                    existing.representation
                )));
            }
            if time < existing.last_time {
                return Err(ChartError::InvalidData(format!(
                    "cannot update oldest data, last time={}, new time={time}",
                    existing.last_time
                )));
            }
        }
        let mut row = item.to_plot_row(kind, time)?;

        let affects_time_scale = !self.point_data_by_time.contains_key(&time.timestamp);
        let point = self
            .point_data_by_time
            .entry(time.timestamp)
            .or_insert_with(|| TimePointData::new(time));
        point.set(series, item.time().clone());

        let mut changed = SmallVec::<[SeriesId; 4]>::new();
        let first_changed = if affects_time_scale {
            let insert_index = self
                .sorted_time_points
                .partition_point(|point| point.time < time);
            self.sorted_time_points
                .insert(insert_index, TimeScalePoint::new(time, item.time().clone()));
            for (offset, point) in self
                .point_data_by_time
                .range_mut(time.timestamp..)
                .map(|(_, point)| point)
                .enumerate()
            {
                point.index = (insert_index + offset) as TimePointIndex;
            }
            fill_weights_for_points(&mut self.sorted_time_points, insert_index);
            for (id, entry) in &mut self.series_rows {
                let start = entry.rows.partition_point(|row| row.time <= time);
                if *id != series && start < entry.rows.len() {
                    for row in &mut entry.rows[start..] {
                        row.index += 1;
                    }
                    changed.push(*id);
                }
            }
            Some(insert_index)
        } else {
            None
        };

        let index = self
            .point_data_by_time
            .get(&time.timestamp)
            .map_or(0, |point| point.index);
        if let Some(row) = &mut row {
            row.index = index;
        }
        let info = SeriesUpdateInfo {
            last_bar_updated_or_new_bars_added_to_the_right: row.is_some(),
        };
        self.update_last_series_row(series, row, time, representation);
        trace!(%series, index, ?first_changed, "update series data");
        Ok(self.update_response(series, first_changed, Some(info), &changed))
    }

    pub fn destroy(&mut self) {
        self.point_data_by_time.clear();
        self.series_rows.clear();
        self.sorted_time_points.clear();
    }

    fn replace_series_data(
        &mut self,
        series: SeriesId,
        entries: Vec<(InternalTime, OriginalTime, Option<PlotRow>)>,
        representation: Option<TimeRepresentation>,
    ) -> DataUpdateResponse<'_> {
        let mut need_cleanup_points = !self.point_data_by_time.is_empty();
        let mut time_scale_affected = false;

        if self.series_rows.contains_key(&series) {
            if self.series_rows.len() == 1 {
                // sole series: rebuild the axis from scratch
                need_cleanup_points = false;
                time_scale_affected = true;
                self.point_data_by_time.clear();
            } else {
                for point in self.point_data_by_time.values_mut() {
                    time_scale_affected |= point.remove(series);
                }
            }
        }

        let last_time = entries.last().map(|(time, _, _)| *time);
        let mut rows = Vec::with_capacity(entries.len());
        for (time, original_time, row) in entries {
            let point = self
                .point_data_by_time
                .entry(time.timestamp)
                .or_insert_with(|| {
                    time_scale_affected = true;
                    TimePointData::new(time)
                });
            point.set(series, original_time);
            rows.extend(row);
        }
        if need_cleanup_points {
            self.point_data_by_time
                .retain(|_, point| !point.mapping.is_empty());
        }

        match (last_time, representation) {
            (Some(last_time), Some(representation)) => {
                self.series_rows.insert(
                    series,
                    SeriesRows {
                        rows,
                        last_time,
                        representation,
                    },
                );
            }
            _ => {
                self.series_rows.shift_remove(&series);
            }
        }

        let first_changed = if time_scale_affected {
            self.replace_time_scale_points()
        } else {
            None
        };

        let mut changed = SmallVec::<[SeriesId; 4]>::new();
        for (id, entry) in &mut self.series_rows {
            let moved = reindex_rows(&mut entry.rows, &self.point_data_by_time);
            if moved && *id != series {
                changed.push(*id);
            }
        }
        let info = SeriesUpdateInfo {
            last_bar_updated_or_new_bars_added_to_the_right: false,
        };
        self.update_response(series, first_changed, Some(info), &changed)
    }

    /// Rebuilds the sorted points from the point map and returns the first
    /// position whose time differs from the previous axis.
    fn replace_time_scale_points(&mut self) -> Option<usize> {
        let mut new_points = self
            .point_data_by_time
            .values()
            .map(|point| TimeScalePoint::new(point.time, point.original_time()))
            .collect::<Vec<_>>();
        for (index, point) in self.point_data_by_time.values_mut().enumerate() {
            point.index = index as TimePointIndex;
        }

        let common = self.sorted_time_points.len().min(new_points.len());
        let mut first_changed = None;
        for index in 0..common {
            let old = &self.sorted_time_points[index];
            if old.time != new_points[index].time {
                first_changed = Some(index);
                break;
            }
            new_points[index].time_weight = old.time_weight;
        }
        if first_changed.is_none() && self.sorted_time_points.len() != new_points.len() {
            first_changed = Some(common);
        }
        let first_changed = first_changed?;
        fill_weights_for_points(&mut new_points, first_changed);
        self.sorted_time_points = new_points;
        Some(first_changed)
    }

    fn update_last_series_row(
        &mut self,
        series: SeriesId,
        row: Option<PlotRow>,
        time: InternalTime,
        representation: TimeRepresentation,
    ) {
        let entry = self.series_rows.entry(series).or_insert_with(|| SeriesRows {
            rows: Vec::new(),
            last_time: time,
            representation,
        });
        let newer = entry.rows.last().is_none_or(|last| time > last.time);
        match (newer, row) {
            (true, Some(row)) => entry.rows.push(row),
            (true, None) => {}
            (false, Some(row)) => {
                if let Some(last) = entry.rows.last_mut() {
                    *last = row;
                }
            }
            (false, None) => {
                entry.rows.pop();
            }
        }
        entry.last_time = time;
    }

    /// Index of the newest row of any series; `None` while no series has rows.
    fn base_index(&self) -> Option<TimePointIndex> {
        self.series_rows
            .values()
            .filter_map(|entry| entry.rows.last().map(|row| row.index))
            .max()
    }

    fn update_response(
        &self,
        updated: SeriesId,
        first_changed: Option<usize>,
        info: Option<SeriesUpdateInfo>,
        changed: &[SeriesId],
    ) -> DataUpdateResponse<'_> {
        let mut series = IndexMap::new();
        series.insert(
            updated,
            SeriesChanges {
                rows: self.series_rows(updated),
                info,
            },
        );
        for id in changed {
            series.entry(*id).or_insert_with(|| SeriesChanges {
                rows: self.series_rows(*id),
                info: None,
            });
        }
        DataUpdateResponse {
            series,
            time_scale: TimeScaleChanges {
                base_index: self.base_index(),
                points: first_changed.map(|_| self.sorted_time_points.as_slice()),
                first_changed_point_index: first_changed,
            },
        }
    }
}

fn reindex_rows(rows: &mut [PlotRow], points: &BTreeMap<i64, TimePointData>) -> bool {
    let mut moved = false;
    for row in rows {
        if let Some(point) = points.get(&row.time.timestamp)
            && point.index != row.index
        {
            row.index = point.index;
            moved = true;
        }
    }
    moved
}
