use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::core::{
    Delegate, Generation, InternalTime, LogicalRange, Memo, OriginalTime, StrictRange,
    TickMarkFormatter, TickMarkWeight, TimePointIndex, TimeScalePoint,
};
use crate::error::{ChartError, ChartResult};

use super::Animation;
use super::tick_marks::TickMarks;

const MIN_VISIBLE_BARS_COUNT: f64 = 2.0;
const DEFAULT_TICK_MARK_MAX_CHARACTER_LENGTH: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeScaleOptions {
    pub right_offset: f64,
    pub right_offset_pixels: Option<f64>,
    pub bar_spacing: f64,
    pub min_bar_spacing: f64,
    /// Upper clamp for bar spacing; `0` means half the viewport width.
    pub max_bar_spacing: f64,
    pub fix_left_edge: bool,
    pub fix_right_edge: bool,
    pub lock_visible_time_range_on_resize: bool,
    pub right_bar_stays_on_scroll: bool,
    pub shift_visible_range_on_new_bar: bool,
    pub allow_shift_visible_range_on_whitespace_replacement: bool,
    pub uniform_distribution: bool,
    pub seconds_visible: bool,
    pub tick_mark_max_character_length: Option<u32>,
    pub handle_scroll: bool,
    pub handle_scale: bool,
}

impl Default for TimeScaleOptions {
    fn default() -> Self {
        Self {
            right_offset: 0.0,
            right_offset_pixels: None,
            bar_spacing: 6.0,
            min_bar_spacing: 0.5,
            max_bar_spacing: 0.0,
            fix_left_edge: false,
            fix_right_edge: false,
            lock_visible_time_range_on_resize: false,
            right_bar_stays_on_scroll: false,
            shift_visible_range_on_new_bar: true,
            allow_shift_visible_range_on_whitespace_replacement: false,
            uniform_distribution: false,
            seconds_visible: true,
            tick_mark_max_character_length: None,
            handle_scroll: true,
            handle_scale: true,
        }
    }
}

impl TimeScaleOptions {
    pub fn validate(&self) -> ChartResult<()> {
        if !self.bar_spacing.is_finite() || self.bar_spacing <= 0.0 {
            return Err(ChartError::InvalidOptions(format!(
                "bar spacing must be finite and > 0, got {}",
                self.bar_spacing
            )));
        }
        if !self.min_bar_spacing.is_finite() || self.min_bar_spacing <= 0.0 {
            return Err(ChartError::InvalidOptions(format!(
                "min bar spacing must be finite and > 0, got {}",
                self.min_bar_spacing
            )));
        }
        if !self.max_bar_spacing.is_finite() || self.max_bar_spacing < 0.0 {
            return Err(ChartError::InvalidOptions(format!(
                "max bar spacing must be finite and >= 0, got {}",
                self.max_bar_spacing
            )));
        }
        if !self.right_offset.is_finite() {
            return Err(ChartError::InvalidOptions(
                "right offset must be finite".to_owned(),
            ));
        }
        if let Some(pixels) = self.right_offset_pixels
            && !pixels.is_finite()
        {
            return Err(ChartError::InvalidOptions(
                "right offset pixels must be finite".to_owned(),
            ));
        }
        Ok(())
    }

    fn all_gestures_disabled(&self) -> bool {
        !self.handle_scroll && !self.handle_scale
    }
}

/// Formatted label on the time axis.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeMark {
    pub index: TimePointIndex,
    pub coord: f64,
    pub label: String,
    pub weight: TickMarkWeight,
    /// Set when the label sits next to an edge the user cannot scroll past and
    /// may need to be pulled inside the axis.
    pub need_align_coordinate: bool,
}

/// Time range expressed through the points' original times.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeRange {
    pub from: OriginalTime,
    pub to: OriginalTime,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TransitionState {
    bar_spacing: f64,
    right_offset: f64,
}

/// Horizontal axis: logical index to pixel mapping over the shared time points.
#[derive(Debug)]
pub struct TimeScale {
    options: TimeScaleOptions,
    formatter: TickMarkFormatter,
    width: f64,
    base_index_or_null: Option<TimePointIndex>,
    right_offset: f64,
    points: Vec<TimeScalePoint>,
    bar_spacing: f64,
    scroll_start_point: Option<f64>,
    scale_start_point: Option<f64>,
    common_transition_start_state: Option<TransitionState>,
    geometry: Generation,
    visible_range: Memo<Generation, Option<LogicalRange>>,
    last_reported_range: Option<LogicalRange>,
    tick_marks: TickMarks,
    formatted_by_weight: HashMap<TickMarkWeight, HashMap<InternalTime, String>>,
    labels: Vec<TimeMark>,
    logical_range_changed: Delegate<Option<LogicalRange>>,
}

impl Default for TimeScale {
    fn default() -> Self {
        Self::new(TimeScaleOptions::default())
    }
}

impl TimeScale {
    #[must_use]
    pub fn new(options: TimeScaleOptions) -> Self {
        Self {
            formatter: TickMarkFormatter {
                seconds_visible: options.seconds_visible,
            },
            width: 0.0,
            base_index_or_null: None,
            right_offset: options.right_offset,
            points: Vec::new(),
            bar_spacing: options.bar_spacing,
            scroll_start_point: None,
            scale_start_point: None,
            common_transition_start_state: None,
            geometry: Generation::default(),
            visible_range: Memo::new(),
            last_reported_range: None,
            tick_marks: TickMarks::new(options.uniform_distribution),
            formatted_by_weight: HashMap::new(),
            labels: Vec::new(),
            logical_range_changed: Delegate::new(),
            options,
        }
    }

    #[must_use]
    pub fn options(&self) -> TimeScaleOptions {
        self.options
    }

    pub fn apply_options(&mut self, options: TimeScaleOptions) -> ChartResult<()> {
        options.validate()?;
        debug!(?options, "apply time scale options");
        let previous = self.options;
        self.options = options;
        if previous.seconds_visible != options.seconds_visible {
            self.formatter.seconds_visible = options.seconds_visible;
            self.formatted_by_weight.clear();
        }
        self.tick_marks
            .set_uniform_distribution(options.uniform_distribution);

        if self.options.fix_left_edge {
            self.do_fix_left_edge()?;
        }
        if self.options.fix_right_edge {
            self.do_fix_right_edge();
        }
        if previous.bar_spacing != options.bar_spacing {
            self.set_bar_spacing(options.bar_spacing)?;
        }
        if let Some(pixels) = options.right_offset_pixels {
            self.set_right_offset(pixels / self.bar_spacing)?;
        } else if previous.right_offset != options.right_offset {
            self.set_right_offset(options.right_offset)?;
        }
        self.correct_bar_spacing();
        self.correct_offset();
        self.invalidate_visible_range();
        Ok(())
    }

    pub fn set_tick_mark_formatter(&mut self, formatter: TickMarkFormatter) {
        if self.formatter != formatter {
            self.formatter = formatter;
            self.formatted_by_weight.clear();
        }
    }

    /// Fired with the new visible logical range whenever the lazily computed
    /// range differs from the last one observed.
    pub fn logical_range_changed(&mut self) -> &mut Delegate<Option<LogicalRange>> {
        &mut self.logical_range_changed
    }

    /// Zero width is a no-op (collapsed container); non-finite or negative
    /// widths are rejected.
    pub fn set_width(&mut self, new_width: f64) -> ChartResult<()> {
        if !new_width.is_finite() || new_width < 0.0 {
            return Err(ChartError::InvalidArgument(format!(
                "time scale width must be finite and >= 0, got {new_width}"
            )));
        }
        if new_width == 0.0 || self.width == new_width {
            return Ok(());
        }

        let previous_visible_range = self.visible_logical_range();
        let old_width = self.width;
        self.width = new_width;
        self.invalidate_visible_range();

        if self.options.lock_visible_time_range_on_resize && old_width > 0.0 {
            self.bar_spacing = self.bar_spacing * new_width / old_width;
        }

        if self.options.fix_left_edge
            && let Some(range) = previous_visible_range
            && range.left() <= 0.0
        {
            let delta = old_width - new_width;
            self.right_offset -= (delta / self.bar_spacing).round() + 1.0;
        }

        self.correct_bar_spacing();
        self.correct_offset();
        trace!(old_width, new_width, "time scale resized");
        Ok(())
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.width
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0.0 || self.points.is_empty() || self.base_index_or_null.is_none()
    }

    #[must_use]
    pub fn points(&self) -> &[TimeScalePoint] {
        &self.points
    }

    /// Replaces points from `first_changed_point_index` onward with the
    /// corresponding suffix of `new_points`.
    pub fn update(&mut self, new_points: &[TimeScalePoint], first_changed_point_index: usize) {
        let first_changed = first_changed_point_index.min(self.points.len()).min(new_points.len());
        self.points.truncate(first_changed);
        self.points.extend_from_slice(&new_points[first_changed..]);
        self.tick_marks
            .set_time_scale_points(&self.points, first_changed);
        self.labels.clear();
        self.invalidate_visible_range();
        self.correct_offset();
        trace!(
            points = self.points.len(),
            first_changed,
            "time scale points updated"
        );
    }

    pub fn set_base_index(&mut self, base_index: Option<TimePointIndex>) -> ChartResult<()> {
        self.base_index_or_null = base_index;
        self.invalidate_visible_range();
        self.correct_offset();
        self.do_fix_left_edge()
    }

    #[must_use]
    pub fn base_index(&self) -> TimePointIndex {
        self.base_index_or_null.unwrap_or(0)
    }

    #[must_use]
    pub fn base_index_or_null(&self) -> Option<TimePointIndex> {
        self.base_index_or_null
    }

    #[must_use]
    pub fn right_offset(&self) -> f64 {
        self.right_offset
    }

    pub fn set_right_offset(&mut self, offset: f64) -> ChartResult<()> {
        if !offset.is_finite() {
            return Err(ChartError::InvalidArgument(format!(
                "time scale right offset must be finite, got {offset}"
            )));
        }
        self.right_offset = offset;
        self.invalidate_visible_range();
        self.correct_offset();
        Ok(())
    }

    #[must_use]
    pub fn bar_spacing(&self) -> f64 {
        self.bar_spacing
    }

    pub fn set_bar_spacing(&mut self, new_bar_spacing: f64) -> ChartResult<()> {
        if !new_bar_spacing.is_finite() || new_bar_spacing <= 0.0 {
            return Err(ChartError::InvalidArgument(format!(
                "time scale bar spacing must be finite and > 0, got {new_bar_spacing}"
            )));
        }
        let old_bar_spacing = self.bar_spacing;
        self.bar_spacing = new_bar_spacing;
        self.correct_bar_spacing();
        if old_bar_spacing != self.bar_spacing {
            self.invalidate_visible_range();
            self.labels.clear();
        }

        if self.options.right_offset_pixels.is_some() && old_bar_spacing > 0.0 {
            self.right_offset = self.right_offset * old_bar_spacing / self.bar_spacing;
        }

        self.correct_offset();
        Ok(())
    }

    #[must_use]
    pub fn min_bar_spacing(&self) -> f64 {
        if self.options.fix_left_edge && self.options.fix_right_edge && !self.points.is_empty() {
            return self.width / self.points.len() as f64;
        }
        self.options.min_bar_spacing
    }

    #[must_use]
    pub fn max_bar_spacing(&self) -> f64 {
        if self.options.max_bar_spacing > 0.0 {
            self.options.max_bar_spacing
        } else {
            self.width * 0.5
        }
    }

    /// Lower clamp for the right offset; `None` until there is data.
    #[must_use]
    pub fn min_right_offset(&self) -> Option<f64> {
        let first = self.first_index()?;
        let base = self.base_index_or_null?;
        let bars_estimation = if self.options.fix_left_edge {
            self.width / self.bar_spacing
        } else {
            MIN_VISIBLE_BARS_COUNT.min(self.points.len() as f64)
        };
        Some(first as f64 - base as f64 - 1.0 + bars_estimation)
    }

    #[must_use]
    pub fn max_right_offset(&self) -> f64 {
        if self.options.fix_right_edge {
            0.0
        } else {
            self.width / self.bar_spacing - MIN_VISIBLE_BARS_COUNT.min(self.points.len() as f64)
        }
    }

    pub fn restore_default(&mut self) -> ChartResult<()> {
        self.invalidate_visible_range();
        self.set_bar_spacing(self.options.bar_spacing)?;
        self.set_right_offset(self.default_right_offset())
    }

    /// Right offset the scale returns to when scrolled to real time.
    #[must_use]
    pub fn default_right_offset(&self) -> f64 {
        match self.options.right_offset_pixels {
            Some(pixels) => pixels / self.bar_spacing,
            None => self.options.right_offset,
        }
    }

    /// Fits `[left, right]` (inclusive logical bounds) into the viewport.
    pub fn set_visible_range(
        &mut self,
        left: f64,
        right: f64,
        apply_default_offset: bool,
    ) -> ChartResult<()> {
        if !left.is_finite() || !right.is_finite() {
            return Err(ChartError::InvalidArgument(
                "visible range bounds must be finite".to_owned(),
            ));
        }
        if self.width <= 0.0 {
            return Ok(());
        }
        let length = right - left + 1.0;
        if length <= 0.0 {
            return Err(ChartError::InvalidArgument(format!(
                "visible range must be non-empty, got [{left}, {right}]"
            )));
        }
        let pixel_offset = if apply_default_offset {
            self.options.right_offset_pixels.unwrap_or(0.0)
        } else {
            0.0
        };
        self.set_bar_spacing((self.width - pixel_offset).max(f64::MIN_POSITIVE) / length)?;
        self.right_offset = right - self.base_index() as f64;
        if apply_default_offset && pixel_offset > 0.0 {
            self.right_offset = pixel_offset / self.bar_spacing;
        }
        self.correct_offset();
        self.invalidate_visible_range();
        Ok(())
    }

    pub fn set_logical_range(&mut self, range: LogicalRange) -> ChartResult<()> {
        self.set_visible_range(range.from, range.to, false)
    }

    pub fn fit_content(&mut self) -> ChartResult<()> {
        let (Some(first), Some(last)) = (self.first_index(), self.last_index()) else {
            return Ok(());
        };
        let right_offset_bars = if self.options.right_offset_pixels.is_none() {
            self.options.right_offset
        } else {
            0.0
        };
        self.set_visible_range(first as f64, last as f64 + right_offset_bars, true)
    }

    #[must_use]
    pub fn index_to_coordinate(&self, index: TimePointIndex) -> f64 {
        self.logical_to_coordinate(index as f64)
    }

    /// Fractional-index variant of [`Self::index_to_coordinate`]; 0 when empty.
    #[must_use]
    pub fn logical_to_coordinate(&self, logical: f64) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let delta_from_right = self.base_index() as f64 + self.right_offset - logical;
        self.width - (delta_from_right + 0.5) * self.bar_spacing - 1.0
    }

    #[must_use]
    pub fn coordinate_to_index(&self, x: f64) -> TimePointIndex {
        self.coordinate_to_float_index(x).ceil() as TimePointIndex
    }

    #[must_use]
    pub fn coordinate_to_float_index(&self, x: f64) -> f64 {
        let delta_from_right = (self.width - 1.0 - x) / self.bar_spacing;
        let index = self.base_index() as f64 + self.right_offset - delta_from_right;
        (index * 1_000_000.0).round() / 1_000_000.0
    }

    /// Zooms anchored at `zoom_point`: the logical index under it stays put
    /// unless `right_bar_stays_on_scroll` is set.
    pub fn zoom(&mut self, zoom_point: f64, scale: f64) -> ChartResult<()> {
        if self.is_empty() || !scale.is_finite() || scale == 0.0 {
            return Ok(());
        }
        let clamped_zoom_point = zoom_point.clamp(1.0, self.width);
        let float_index_at_zoom_point = self.coordinate_to_float_index(clamped_zoom_point);
        let bar_spacing = self.bar_spacing;
        self.set_bar_spacing(bar_spacing + scale * (bar_spacing / 10.0))?;
        if !self.options.right_bar_stays_on_scroll {
            let corrected = self.right_offset
                + (float_index_at_zoom_point - self.coordinate_to_float_index(clamped_zoom_point));
            self.set_right_offset(corrected)?;
        }
        Ok(())
    }

    pub fn start_scale(&mut self, x: f64) {
        if self.scroll_start_point.is_some() {
            self.end_scroll();
        }
        if self.scale_start_point.is_some() || self.common_transition_start_state.is_some() {
            return;
        }
        if self.is_empty() {
            return;
        }
        self.scale_start_point = Some(x);
        self.save_common_transition_start_state();
    }

    pub fn scale_to(&mut self, x: f64) -> ChartResult<()> {
        let (Some(start_state), Some(scale_start)) =
            (self.common_transition_start_state, self.scale_start_point)
        else {
            return Ok(());
        };
        let start_length_from_right = (self.width - x).clamp(0.0, self.width);
        let current_length_from_right = (self.width - scale_start).clamp(0.0, self.width);
        if start_length_from_right == 0.0 || current_length_from_right == 0.0 {
            return Ok(());
        }
        self.set_bar_spacing(
            start_state.bar_spacing * start_length_from_right / current_length_from_right,
        )
    }

    pub fn end_scale(&mut self) {
        if self.scale_start_point.take().is_some() {
            self.common_transition_start_state = None;
        }
    }

    pub fn start_scroll(&mut self, x: f64) {
        if self.scroll_start_point.is_some() || self.common_transition_start_state.is_some() {
            return;
        }
        if self.is_empty() {
            return;
        }
        self.scroll_start_point = Some(x);
        self.save_common_transition_start_state();
    }

    pub fn scroll_to(&mut self, x: f64) {
        let (Some(scroll_start_point), Some(start_state)) =
            (self.scroll_start_point, self.common_transition_start_state)
        else {
            return;
        };
        let shift_in_logical = (scroll_start_point - x) / self.bar_spacing;
        self.right_offset = start_state.right_offset + shift_in_logical;
        self.invalidate_visible_range();
        self.correct_offset();
    }

    pub fn end_scroll(&mut self) {
        if self.scroll_start_point.take().is_some() {
            self.common_transition_start_state = None;
        }
    }

    #[must_use]
    pub fn scroll_position(&self) -> f64 {
        self.right_offset
    }

    /// Builds a right-offset transition towards `offset` starting at `now`.
    pub fn scroll_to_offset_animated(
        &self,
        offset: f64,
        duration_ms: f64,
        now: f64,
    ) -> ChartResult<Animation> {
        if !offset.is_finite() {
            return Err(ChartError::InvalidArgument(
                "offset is required and must be a finite number".to_owned(),
            ));
        }
        if !duration_ms.is_finite() || duration_ms <= 0.0 {
            return Err(ChartError::InvalidArgument(format!(
                "animation duration must be a finite positive number, got {duration_ms}"
            )));
        }
        Animation::start(self.right_offset, offset, now, duration_ms)
    }

    /// Lazily recomputed; fires [`Self::logical_range_changed`] on change.
    pub fn visible_logical_range(&mut self) -> Option<LogicalRange> {
        let generation = self.geometry;
        if let Some(range) = self.visible_range.peek(&generation) {
            return *range;
        }
        let range = self.compute_visible_range();
        self.visible_range.get_or_compute(generation, || range);
        if range != self.last_reported_range {
            self.last_reported_range = range;
            self.logical_range_changed.fire(&range);
        }
        range
    }

    pub fn visible_strict_range(&mut self) -> Option<StrictRange> {
        self.visible_logical_range().map(LogicalRange::to_strict)
    }

    /// Bumped on every change that can move the visible range.
    #[must_use]
    pub fn geometry_generation(&self) -> Generation {
        self.geometry
    }

    /// Visible range expressed in the original times of the edge points.
    pub fn visible_time_range(&mut self) -> Option<TimeRange> {
        let visible = self.visible_strict_range()?;
        self.time_range_for_logical_range(LogicalRange::new(
            visible.left() as f64,
            visible.right() as f64,
        ))
    }

    #[must_use]
    pub fn time_range_for_logical_range(&self, range: LogicalRange) -> Option<TimeRange> {
        let first = self.first_index()?;
        let last = self.last_index()?;
        let from = (range.from.round() as TimePointIndex).max(first);
        let to = (range.to.round() as TimePointIndex).min(last);
        Some(TimeRange {
            from: self.index_to_time_scale_point(from)?.original_time.clone(),
            to: self.index_to_time_scale_point(to)?.original_time.clone(),
        })
    }

    #[must_use]
    pub fn logical_range_for_time_range(
        &self,
        from: InternalTime,
        to: InternalTime,
    ) -> Option<LogicalRange> {
        Some(LogicalRange::new(
            self.time_to_index(from, true)? as f64,
            self.time_to_index(to, true)? as f64,
        ))
    }

    #[must_use]
    pub fn first_index(&self) -> Option<TimePointIndex> {
        (!self.points.is_empty()).then_some(0)
    }

    #[must_use]
    pub fn last_index(&self) -> Option<TimePointIndex> {
        (!self.points.is_empty()).then(|| self.points.len() as TimePointIndex - 1)
    }

    #[must_use]
    pub fn index_to_time(&self, index: TimePointIndex) -> Option<InternalTime> {
        self.index_to_time_scale_point(index).map(|point| point.time)
    }

    #[must_use]
    pub fn index_to_time_scale_point(&self, index: TimePointIndex) -> Option<&TimeScalePoint> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.points.get(index))
    }

    /// Binary search over points. With `find_nearest`, a time between points
    /// resolves to the next point and a time past the end to the last one.
    #[must_use]
    pub fn time_to_index(&self, time: InternalTime, find_nearest: bool) -> Option<TimePointIndex> {
        let last = self.points.last()?;
        if time > last.time {
            return find_nearest.then(|| self.points.len() as TimePointIndex - 1);
        }
        let index = self.points.partition_point(|point| point.time < time);
        if time < self.points[index].time {
            return find_nearest.then_some(index as TimePointIndex);
        }
        Some(index as TimePointIndex)
    }

    /// Visible tick marks, labelled and positioned. `font_size` drives the
    /// per-label pixel budget.
    pub fn marks(&mut self, font_size: f64) -> Option<&[TimeMark]> {
        if self.is_empty() {
            return None;
        }
        let visible_bars = self.visible_strict_range()?;
        let spacing = self.bar_spacing;
        let pixels_per_8_characters = (font_size + 4.0) * 5.0;
        let pixels_per_character = pixels_per_8_characters / DEFAULT_TICK_MARK_MAX_CHARACTER_LENGTH;
        let max_label_width = pixels_per_character
            * self
                .options
                .tick_mark_max_character_length
                .map_or(DEFAULT_TICK_MARK_MAX_CHARACTER_LENGTH, f64::from);
        let index_per_label = (max_label_width / spacing).round() as TimePointIndex;

        let first_bar = visible_bars.left().max(visible_bars.left() - index_per_label);
        let last_bar = visible_bars.right().max(visible_bars.right() - index_per_label);
        let first_index = self.first_index().unwrap_or(0);
        let last_index = self.last_index().unwrap_or(0);
        let earliest_index_of_second_label = first_index + index_per_label;
        let index_of_second_last_label = last_index - index_per_label;
        let gestures_disabled = self.options.all_gestures_disabled();
        let left_edge_fixed = self.options.fix_left_edge || gestures_disabled;
        let right_edge_fixed = self.options.fix_right_edge || gestures_disabled;
        let roomy = spacing > max_label_width / 2.0 && !gestures_disabled;

        let candidates = self
            .tick_marks
            .build(spacing, max_label_width)
            .iter()
            .filter(|mark| first_bar <= mark.index && mark.index <= last_bar)
            .cloned()
            .collect::<Vec<_>>();

        let mut labels = std::mem::take(&mut self.labels);
        labels.clear();
        for mark in candidates {
            let label = self.format_label(mark.time, mark.weight);
            let need_align_coordinate = !roomy
                && ((left_edge_fixed && mark.index <= earliest_index_of_second_label)
                    || (right_edge_fixed && mark.index >= index_of_second_last_label));
            labels.push(TimeMark {
                index: mark.index,
                coord: self.index_to_coordinate(mark.index),
                label,
                weight: mark.weight,
                need_align_coordinate,
            });
        }
        self.labels = labels;
        Some(&self.labels)
    }

    fn format_label(&mut self, time: InternalTime, weight: TickMarkWeight) -> String {
        let formatter = self.formatter;
        self.formatted_by_weight
            .entry(weight)
            .or_default()
            .entry(time)
            .or_insert_with(|| formatter.format(time, weight))
            .clone()
    }

    fn invalidate_visible_range(&mut self) {
        self.geometry.bump();
    }

    fn compute_visible_range(&self) -> Option<LogicalRange> {
        if self.is_empty() {
            return None;
        }
        let new_bars_length = self.width / self.bar_spacing;
        let right_border = self.right_offset + self.base_index() as f64;
        let left_border = right_border - new_bars_length + 1.0;
        Some(LogicalRange::new(left_border, right_border))
    }

    fn correct_bar_spacing(&mut self) {
        let min = self.min_bar_spacing();
        if self.bar_spacing < min {
            self.bar_spacing = min;
            self.invalidate_visible_range();
        }
        if self.width > 0.0 {
            let max = self.max_bar_spacing();
            if self.bar_spacing > max {
                self.bar_spacing = max;
                self.invalidate_visible_range();
            }
        }
    }

    fn correct_offset(&mut self) {
        if let Some(min_right_offset) = self.min_right_offset()
            && self.right_offset < min_right_offset
        {
            self.right_offset = min_right_offset;
            self.invalidate_visible_range();
        }
        let max_right_offset = self.max_right_offset();
        if self.right_offset > max_right_offset {
            self.right_offset = max_right_offset;
            self.invalidate_visible_range();
        }
    }

    fn do_fix_left_edge(&mut self) -> ChartResult<()> {
        if !self.options.fix_left_edge {
            return Ok(());
        }
        let Some(first) = self.first_index() else {
            return Ok(());
        };
        let Some(visible) = self.visible_strict_range() else {
            return Ok(());
        };
        let delta = visible.left() - first;
        if delta < 0 {
            let left_edge_offset = self.right_offset - delta as f64 - 1.0;
            self.set_right_offset(left_edge_offset)?;
        }
        self.correct_bar_spacing();
        Ok(())
    }

    fn do_fix_right_edge(&mut self) {
        self.correct_offset();
        self.correct_bar_spacing();
    }

    fn save_common_transition_start_state(&mut self) {
        self.common_transition_start_state = Some(TransitionState {
            bar_spacing: self.bar_spacing,
            right_offset: self.right_offset,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use approx::assert_abs_diff_eq;

    use super::{TimeScale, TimeScaleOptions};
    use crate::core::{
        InternalTime, LogicalRange, TimeInput, TimeScalePoint, fill_weights_for_points,
    };

    fn points(count: i64) -> Vec<TimeScalePoint> {
        let mut points = (0..count)
            .map(|i| {
                let t = 1_600_000_000 + i * 60;
                TimeScalePoint::new(InternalTime::new(t), TimeInput::Timestamp(t))
            })
            .collect::<Vec<_>>();
        fill_weights_for_points(&mut points, 0);
        points
    }

    fn scale_with(width: f64, count: i64, options: TimeScaleOptions) -> TimeScale {
        let mut time_scale = TimeScale::new(options);
        time_scale.set_width(width).expect("width");
        time_scale.update(&points(count), 0);
        time_scale.set_base_index(Some(count - 1)).expect("base");
        time_scale
    }

    #[test]
    fn index_coordinate_round_trip_uses_half_bar_and_border() {
        let mut time_scale = scale_with(1000.0, 200, TimeScaleOptions::default());
        time_scale.set_right_offset(0.0).expect("offset");
        time_scale.set_bar_spacing(6.0).expect("spacing");

        let x = time_scale.index_to_coordinate(199);
        assert_abs_diff_eq!(x, 1000.0 - 0.5 * 6.0 - 1.0, epsilon = 1e-9);
        // the inverse lands half a bar left; ceil recovers the index
        assert_abs_diff_eq!(time_scale.coordinate_to_float_index(x), 198.5, epsilon = 1e-9);
        assert_eq!(time_scale.coordinate_to_index(x), 199);
    }

    #[test]
    fn zoom_preserves_anchor_when_right_bar_does_not_stay() {
        let mut time_scale = scale_with(800.0, 100, TimeScaleOptions::default());
        time_scale.set_bar_spacing(5.0).expect("spacing");
        let anchor = 400.0;
        let before = time_scale.coordinate_to_float_index(anchor);
        time_scale.zoom(anchor, 0.5).expect("zoom");
        assert_abs_diff_eq!(before, time_scale.coordinate_to_float_index(anchor), epsilon = 1e-6);
        assert_abs_diff_eq!(time_scale.bar_spacing(), 5.25, epsilon = 1e-12);
    }

    #[test]
    fn empty_scale_maps_everything_to_zero() {
        let time_scale = TimeScale::default();
        assert!(time_scale.is_empty());
        assert_eq!(time_scale.index_to_coordinate(42), 0.0);
    }

    #[test]
    fn set_logical_range_round_trips_fractional_bounds() {
        let mut time_scale = scale_with(600.0, 500, TimeScaleOptions::default());
        time_scale
            .set_logical_range(LogicalRange::new(100.5, 199.5))
            .expect("range");
        let visible = time_scale.visible_logical_range().expect("visible");
        assert_abs_diff_eq!(visible.from, 100.5, epsilon = 1e-9);
        assert_abs_diff_eq!(visible.to, 199.5, epsilon = 1e-9);
    }

    #[test]
    fn visible_range_is_memoized_until_geometry_changes() {
        let mut time_scale = scale_with(500.0, 50, TimeScaleOptions::default());
        let fired = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&fired);
        time_scale
            .logical_range_changed()
            .subscribe(move |_| *counter.borrow_mut() += 1);

        let first = time_scale.visible_logical_range();
        let again = time_scale.visible_logical_range();
        assert_eq!(first, again);
        assert_eq!(*fired.borrow(), 1);

        time_scale.set_right_offset(3.0).expect("offset");
        let shifted = time_scale.visible_logical_range().expect("shifted");
        assert_abs_diff_eq!(shifted.to, 52.0, epsilon = 1e-9);
        assert_eq!(*fired.borrow(), 2);
    }

    #[test]
    fn scroll_gesture_shifts_right_offset_by_pixels_over_spacing() {
        let mut time_scale = scale_with(500.0, 300, TimeScaleOptions::default());
        time_scale.set_bar_spacing(10.0).expect("spacing");
        time_scale.start_scroll(200.0);
        time_scale.scroll_to(250.0);
        assert_abs_diff_eq!(time_scale.right_offset(), -5.0, epsilon = 1e-12);
        time_scale.end_scroll();
        time_scale.scroll_to(0.0);
        assert_abs_diff_eq!(time_scale.right_offset(), -5.0, epsilon = 1e-12);
    }

    #[test]
    fn scale_gesture_anchors_left_edge() {
        let mut time_scale = scale_with(500.0, 300, TimeScaleOptions::default());
        time_scale.set_bar_spacing(10.0).expect("spacing");
        time_scale.start_scale(400.0);
        time_scale.scale_to(300.0).expect("scale");
        // (500 - 300) / (500 - 400) = 2
        assert_abs_diff_eq!(time_scale.bar_spacing(), 20.0, epsilon = 1e-12);
        time_scale.end_scale();
    }

    #[test]
    fn both_fixed_edges_force_min_bar_spacing_to_fill_width() {
        let options = TimeScaleOptions {
            fix_left_edge: true,
            fix_right_edge: true,
            ..TimeScaleOptions::default()
        };
        let mut time_scale = scale_with(400.0, 100, options);
        time_scale.set_bar_spacing(1.0).expect("spacing");
        assert_abs_diff_eq!(time_scale.bar_spacing(), 4.0, epsilon = 1e-12);
        assert_eq!(time_scale.max_right_offset(), 0.0);
    }

    #[test]
    fn lock_visible_range_on_resize_rescales_spacing() {
        let options = TimeScaleOptions {
            lock_visible_time_range_on_resize: true,
            ..TimeScaleOptions::default()
        };
        let mut time_scale = scale_with(600.0, 1000, options);
        time_scale.set_bar_spacing(6.0).expect("spacing");
        time_scale.set_width(1200.0).expect("resize");
        assert_abs_diff_eq!(time_scale.bar_spacing(), 12.0, epsilon = 1e-12);
    }

    #[test]
    fn time_to_index_finds_exact_and_nearest() {
        let time_scale = scale_with(500.0, 10, TimeScaleOptions::default());
        let third = InternalTime::new(1_600_000_000 + 3 * 60);
        assert_eq!(time_scale.time_to_index(third, false), Some(3));
        let between = InternalTime::new(third.timestamp + 10);
        assert_eq!(time_scale.time_to_index(between, false), None);
        assert_eq!(time_scale.time_to_index(between, true), Some(4));
        let after = InternalTime::new(2_000_000_000);
        assert_eq!(time_scale.time_to_index(after, true), Some(9));
        assert_eq!(time_scale.index_to_time(3), Some(third));
    }

    #[test]
    fn marks_are_within_visible_range_and_sorted() {
        let mut time_scale = scale_with(800.0, 600, TimeScaleOptions::default());
        let visible = time_scale.visible_strict_range().expect("visible");
        let marks = time_scale.marks(12.0).expect("marks").to_vec();
        assert!(!marks.is_empty());
        assert!(marks.windows(2).all(|w| w[0].index < w[1].index));
        assert!(
            marks
                .iter()
                .all(|m| visible.left() <= m.index && m.index <= visible.right())
        );
    }

    #[test]
    fn animated_scroll_rejects_invalid_duration() {
        let time_scale = scale_with(500.0, 10, TimeScaleOptions::default());
        assert!(time_scale.scroll_to_offset_animated(5.0, -1.0, 0.0).is_err());
        assert!(time_scale.scroll_to_offset_animated(f64::NAN, 100.0, 0.0).is_err());
        let animation = time_scale
            .scroll_to_offset_animated(5.0, 100.0, 0.0)
            .expect("animation");
        assert_eq!(animation.target(), 5.0);
    }
}
