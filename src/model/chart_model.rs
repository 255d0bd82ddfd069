use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::core::{
    Delegate, LogicalRange, OriginalTime, PlotRow, PlotRowValueIndex, TimePointIndex,
    TimeScalePoint,
};
use crate::error::{ChartError, ChartResult};

use super::crosshair::{Crosshair, CrosshairOptions};
use super::data_layer::DataUpdateResponse;
use super::invalidate_mask::{
    InvalidateMask, InvalidationLevel, PaneInvalidation, TimeScaleInvalidation,
};
use super::pane::Pane;
use super::price_scale::{PriceScale, PriceScaleOptions};
use super::series::{Series, SeriesId, SeriesKind, SeriesOptions};
use super::time_scale::{TimeScale, TimeScaleOptions};
use super::Animation;

/// Default length of `scroll_to_real_time` in milliseconds.
pub const REAL_TIME_ANIMATION_DURATION_MS: f64 = 400.0;

/// Receives every mask the model produces.
pub type InvalidateHandler = Box<dyn FnMut(&InvalidateMask)>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartModelOptions {
    pub time_scale: TimeScaleOptions,
    pub left_price_scale: PriceScaleOptions,
    pub right_price_scale: PriceScaleOptions,
    /// Template for overlay scales created on first use.
    pub overlay_price_scales: PriceScaleOptions,
    pub crosshair: CrosshairOptions,
}

impl Default for ChartModelOptions {
    fn default() -> Self {
        Self {
            time_scale: TimeScaleOptions::default(),
            left_price_scale: PriceScaleOptions {
                visible: false,
                ..PriceScaleOptions::default()
            },
            right_price_scale: PriceScaleOptions::default(),
            overlay_price_scales: PriceScaleOptions::default(),
            crosshair: CrosshairOptions::default(),
        }
    }
}

impl ChartModelOptions {
    pub fn validate(&self) -> ChartResult<()> {
        self.time_scale.validate()?;
        self.left_price_scale.validate()?;
        self.right_price_scale.validate()?;
        self.overlay_price_scales.validate()
    }
}

/// Payload of the crosshair delegate; empty when the crosshair left the chart.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CrosshairMove {
    pub logical: Option<TimePointIndex>,
    pub time: Option<OriginalTime>,
    pub point: Option<(f64, f64)>,
    pub pane_index: Option<usize>,
    pub series_data: Vec<(SeriesId, PlotRow)>,
}

pub struct ChartModel {
    options: ChartModelOptions,
    width: f64,
    font_size: f64,
    time_scale: TimeScale,
    panes: Vec<Pane>,
    series: IndexMap<SeriesId, Series>,
    next_series_id: u64,
    crosshair: Crosshair,
    invalidate_handler: Option<InvalidateHandler>,
    pending_invalidation: Option<InvalidateMask>,
    crosshair_moved: Delegate<CrosshairMove>,
}

impl fmt::Debug for ChartModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChartModel")
            .field("width", &self.width)
            .field("time_scale", &self.time_scale)
            .field("panes", &self.panes)
            .field("series", &self.series.keys().collect::<Vec<_>>())
            .field("pending_invalidation", &self.pending_invalidation)
            .finish_non_exhaustive()
    }
}

impl ChartModel {
    /// A model with one empty pane and a pending full invalidation.
    pub fn new(options: ChartModelOptions) -> ChartResult<Self> {
        options.validate()?;
        let pane = Pane::new(
            options.left_price_scale,
            options.right_price_scale,
            options.overlay_price_scales,
        );
        Ok(Self {
            options,
            width: 0.0,
            font_size: 12.0,
            time_scale: TimeScale::new(options.time_scale),
            panes: vec![pane],
            series: IndexMap::new(),
            next_series_id: 1,
            crosshair: Crosshair::new(options.crosshair),
            invalidate_handler: None,
            pending_invalidation: Some(InvalidateMask::full()),
            crosshair_moved: Delegate::new(),
        })
    }

    /// Routes masks to `handler`. Anything accumulated so far is flushed to it.
    pub fn set_invalidate_handler(&mut self, mut handler: InvalidateHandler) {
        if let Some(pending) = self.pending_invalidation.take() {
            handler(&pending);
        }
        self.invalidate_handler = Some(handler);
    }

    #[must_use]
    pub fn options(&self) -> ChartModelOptions {
        self.options
    }

    /// Options are validated as a whole before any part is applied.
    pub fn apply_options(&mut self, options: ChartModelOptions) -> ChartResult<()> {
        options.validate()?;
        debug!("apply chart model options");
        self.time_scale.apply_options(options.time_scale)?;
        for pane in &mut self.panes {
            pane.set_overlay_options(options.overlay_price_scales);
            pane.ensure_price_scale(super::pane::LEFT_PRICE_SCALE_ID)
                .apply_options(options.left_price_scale)?;
            pane.ensure_price_scale(super::pane::RIGHT_PRICE_SCALE_ID)
                .apply_options(options.right_price_scale)?;
            let overlay_ids = pane
                .overlay_price_scale_ids()
                .map(str::to_owned)
                .collect::<Vec<_>>();
            for id in overlay_ids {
                pane.ensure_price_scale(&id)
                    .apply_options(options.overlay_price_scales)?;
            }
        }
        self.crosshair.apply_options(options.crosshair);
        self.options = options;
        self.recalculate_all_panes();
        self.full_update();
        Ok(())
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn set_width(&mut self, width: f64) -> ChartResult<()> {
        self.time_scale.set_width(width)?;
        self.width = width;
        self.recalculate_all_panes();
        self.full_update();
        Ok(())
    }

    #[must_use]
    pub fn font_size(&self) -> f64 {
        self.font_size
    }

    pub fn set_font_size(&mut self, font_size: f64) -> ChartResult<()> {
        if !font_size.is_finite() || font_size <= 0.0 {
            return Err(ChartError::InvalidArgument(format!(
                "font size must be finite and > 0, got {font_size}"
            )));
        }
        self.font_size = font_size;
        for pane in &mut self.panes {
            for scale in pane.price_scales_mut() {
                scale.set_font_size(font_size);
            }
        }
        self.full_update();
        Ok(())
    }

    pub fn set_pane_height(&mut self, pane_index: usize, height: f64) -> ChartResult<()> {
        if !height.is_finite() || height < 0.0 {
            return Err(ChartError::InvalidArgument(format!(
                "pane height must be finite and >= 0, got {height}"
            )));
        }
        let visible = self.time_scale.visible_strict_range();
        let pane = self
            .panes
            .get_mut(pane_index)
            .ok_or_else(|| unknown_pane(pane_index))?;
        pane.set_height(height);
        pane.recalculate(visible, &self.series);
        self.full_update();
        Ok(())
    }

    #[must_use]
    pub fn time_scale(&self) -> &TimeScale {
        &self.time_scale
    }

    pub fn time_scale_mut(&mut self) -> &mut TimeScale {
        &mut self.time_scale
    }

    #[must_use]
    pub fn panes(&self) -> &[Pane] {
        &self.panes
    }

    #[must_use]
    pub fn pane(&self, pane_index: usize) -> Option<&Pane> {
        self.panes.get(pane_index)
    }

    #[must_use]
    pub fn crosshair(&self) -> &Crosshair {
        &self.crosshair
    }

    pub fn crosshair_moved(&mut self) -> &mut Delegate<CrosshairMove> {
        &mut self.crosshair_moved
    }

    /// Inserts a pane at `index` (appends when `None`) and returns its index.
    pub fn create_pane(&mut self, index: Option<usize>) -> usize {
        let mut pane = Pane::new(
            self.options.left_price_scale,
            self.options.right_price_scale,
            self.options.overlay_price_scales,
        );
        for scale in pane.price_scales_mut() {
            scale.set_font_size(self.font_size);
        }
        let index = index.unwrap_or(self.panes.len()).min(self.panes.len());
        self.panes.insert(index, pane);
        debug!(index, count = self.panes.len(), "create pane");
        self.full_update();
        index
    }

    /// Removes a pane together with its series and returns their ids. The
    /// caller drops the same ids from the data layer.
    pub(crate) fn remove_pane(&mut self, pane_index: usize) -> ChartResult<Vec<SeriesId>> {
        if pane_index >= self.panes.len() {
            return Err(unknown_pane(pane_index));
        }
        if self.panes.len() == 1 {
            return Err(ChartError::InvalidArgument(
                "cannot remove the only pane".to_owned(),
            ));
        }
        let pane = self.panes.remove(pane_index);
        let removed = pane.data_sources().collect::<Vec<_>>();
        for id in &removed {
            self.series.shift_remove(id);
        }
        match self.crosshair.position() {
            Some(position) if position.pane_index == pane_index => self.crosshair.clear_position(),
            Some(position) if position.pane_index > pane_index => {
                self.crosshair
                    .set_position(position.index, position.price, position.pane_index - 1);
            }
            _ => {}
        }
        debug!(pane_index, series = removed.len(), "remove pane");
        self.full_update();
        Ok(removed)
    }

    #[must_use]
    pub fn series(&self, id: SeriesId) -> Option<&Series> {
        self.series.get(&id)
    }

    pub fn series_ids(&self) -> impl Iterator<Item = SeriesId> + '_ {
        self.series.keys().copied()
    }

    #[must_use]
    pub fn pane_index_of(&self, id: SeriesId) -> Option<usize> {
        self.panes.iter().position(|pane| pane.contains_source(id))
    }

    /// Registers a series on `pane_index`, creating panes up to that index.
    pub fn add_series(
        &mut self,
        kind: SeriesKind,
        options: SeriesOptions,
        pane_index: usize,
    ) -> ChartResult<SeriesId> {
        let id = SeriesId::new(self.next_series_id);
        let series = Series::new(id, kind, options)?;
        while self.panes.len() <= pane_index {
            self.create_pane(None);
        }
        self.next_series_id += 1;
        self.panes[pane_index].add_data_source(id, series.price_scale_id());
        debug!(%id, ?kind, pane_index, scale = series.price_scale_id(), "add series");
        self.series.insert(id, series);
        self.recalculate_pane(pane_index);
        self.full_update();
        Ok(id)
    }

    pub fn remove_series(&mut self, id: SeriesId) -> ChartResult<Series> {
        let series = self.series.shift_remove(&id).ok_or_else(|| unknown_series(id))?;
        if let Some(pane_index) = self.panes.iter().position(|pane| pane.contains_source(id)) {
            self.panes[pane_index].remove_data_source(id);
            self.recalculate_pane(pane_index);
        }
        debug!(%id, "remove series");
        self.full_update();
        Ok(series)
    }

    /// Re-parents a series onto another scale of the same pane.
    pub fn move_series_to_scale(&mut self, id: SeriesId, target_scale_id: &str) -> ChartResult<()> {
        let pane_index = self.pane_index_of(id).ok_or_else(|| unknown_series(id))?;
        let series = self.series.get_mut(&id).ok_or_else(|| unknown_series(id))?;
        if series.price_scale_id() == target_scale_id {
            return Ok(());
        }
        series.set_price_scale_id(target_scale_id);
        let pane = &mut self.panes[pane_index];
        pane.remove_data_source(id);
        pane.add_data_source(id, target_scale_id);
        debug!(%id, target_scale_id, "move series to scale");
        self.recalculate_pane(pane_index);
        self.full_update();
        Ok(())
    }

    pub fn apply_series_options(&mut self, id: SeriesId, options: SeriesOptions) -> ChartResult<()> {
        options.validate()?;
        let target_scale = options.price_scale_id.clone();
        self.move_series_to_scale(id, &target_scale)?;
        let series = self.series.get_mut(&id).ok_or_else(|| unknown_series(id))?;
        series.apply_options(options)?;
        if let Some(pane_index) = self.pane_index_of(id) {
            if let Some(scale) = self.panes[pane_index].price_scale_by_id_mut(&target_scale) {
                scale.invalidate_source_range();
            }
            self.recalculate_pane(pane_index);
        }
        self.full_update();
        Ok(())
    }

    /// Pushes a data-layer delta into the time scale and the affected series.
    pub fn apply_data_update(&mut self, update: &DataUpdateResponse<'_>) -> ChartResult<()> {
        self.update_time_scale(
            update.time_scale.base_index,
            update.time_scale.points,
            update.time_scale.first_changed_point_index,
        )?;
        for (id, changes) in &update.series {
            let Some(series) = self.series.get_mut(id) else {
                continue;
            };
            let incremental = changes
                .info
                .is_some_and(|info| info.last_bar_updated_or_new_bars_added_to_the_right);
            match changes.rows.last() {
                Some(last) if incremental => series.update_last_row(last.clone())?,
                _ => series.set_rows(changes.rows.to_vec())?,
            }
            let scale_id = series.price_scale_id().to_owned();
            if let Some(pane_index) = self.pane_index_of(*id)
                && let Some(scale) = self.panes[pane_index].price_scale_by_id_mut(&scale_id)
            {
                scale.invalidate_source_range();
            }
        }
        self.recalculate_all_panes();
        self.light_update();
        Ok(())
    }

    /// Adopts new time points and base index. When bars arrive on the right
    /// while the newest bar is off screen (or shifting is disabled) the right
    /// offset is compensated so the visible window stays put.
    pub fn update_time_scale(
        &mut self,
        new_base_index: Option<TimePointIndex>,
        new_points: Option<&[TimeScalePoint]>,
        first_changed_point_index: Option<usize>,
    ) -> ChartResult<()> {
        let old_first_time = self.time_scale.index_to_time(0);
        if let (Some(points), Some(first_changed)) = (new_points, first_changed_point_index) {
            self.time_scale.update(points, first_changed);
        }
        let new_first_time = self.time_scale.index_to_time(0);
        let current_base_index = self.time_scale.base_index();
        let visible_bars = self.time_scale.visible_strict_range();

        if let (Some(visible_bars), Some(old_first), Some(new_first)) =
            (visible_bars, old_first_time, new_first_time)
        {
            let options = self.time_scale.options();
            let last_bar_visible = visible_bars.contains(current_base_index);
            let left_bar_shifted_left = old_first > new_first;
            let points_added = new_base_index.is_some_and(|base| base > current_base_index);
            let points_added_to_right = points_added && !left_bar_shifted_left;
            let replaced_whitespace = first_changed_point_index.is_none();
            let need_shift = last_bar_visible
                && (!replaced_whitespace
                    || options.allow_shift_visible_range_on_whitespace_replacement)
                && options.shift_visible_range_on_new_bar;
            if points_added_to_right
                && !need_shift
                && let Some(new_base) = new_base_index
            {
                let compensation = (new_base - current_base_index) as f64;
                trace!(compensation, "keep visible range on new bars");
                self.time_scale
                    .set_right_offset(self.time_scale.right_offset() - compensation)?;
            }
        }

        self.time_scale.set_base_index(new_base_index)?;
        self.recalculate_all_panes();
        self.light_update();
        Ok(())
    }

    pub fn recalculate_all_panes(&mut self) {
        let visible = self.time_scale.visible_strict_range();
        for pane in &mut self.panes {
            pane.recalculate(visible, &self.series);
        }
    }

    /// Recomputes price ranges invalidated since they were last read.
    pub fn ensure_price_scales_valid(&mut self) {
        for pane in &mut self.panes {
            pane.make_sure_valid(&self.series);
        }
    }

    /// Price scale of `pane_index`, brought up to date first.
    pub fn price_scale(&mut self, pane_index: usize, scale_id: &str) -> ChartResult<&PriceScale> {
        let pane = self
            .panes
            .get_mut(pane_index)
            .ok_or_else(|| unknown_pane(pane_index))?;
        pane.make_sure_valid(&self.series);
        pane.price_scale_by_id(scale_id)
            .ok_or_else(|| unknown_scale(pane_index, scale_id))
    }

    pub fn price_scale_mut(
        &mut self,
        pane_index: usize,
        scale_id: &str,
    ) -> ChartResult<&mut PriceScale> {
        let pane = self
            .panes
            .get_mut(pane_index)
            .ok_or_else(|| unknown_pane(pane_index))?;
        pane.make_sure_valid(&self.series);
        pane.price_scale_by_id_mut(scale_id)
            .ok_or_else(|| unknown_scale(pane_index, scale_id))
    }

    /// `None` while the series has no bar in view.
    pub fn series_price_to_coordinate(&mut self, id: SeriesId, price: f64) -> ChartResult<Option<f64>> {
        let Some((scale, first_value)) = self.series_scale(id)? else {
            return Ok(None);
        };
        Ok(Some(scale.price_to_coordinate(price, first_value)))
    }

    pub fn series_coordinate_to_price(&mut self, id: SeriesId, y: f64) -> ChartResult<Option<f64>> {
        let Some((scale, first_value)) = self.series_scale(id)? else {
            return Ok(None);
        };
        Ok(Some(scale.coordinate_to_price(y, first_value)))
    }

    /// Zooms around `x`, clamped into the time axis.
    pub fn zoom_time(&mut self, x: f64, scale: f64) -> ChartResult<()> {
        if self.time_scale.is_empty() || scale == 0.0 {
            return Ok(());
        }
        let x = x.min(self.time_scale.width()).max(1.0);
        self.time_scale.zoom(x, scale)?;
        self.recalculate_all_panes();
        self.light_update();
        Ok(())
    }

    pub fn start_scroll_time(&mut self, x: f64) {
        self.stop_time_scale_animation();
        self.time_scale.start_scroll(x);
    }

    pub fn scroll_time_to(&mut self, x: f64) {
        self.time_scale.scroll_to(x);
        self.recalculate_all_panes();
        self.light_update();
    }

    pub fn end_scroll_time(&mut self) {
        self.time_scale.end_scroll();
        self.light_update();
    }

    pub fn start_scale_time(&mut self, x: f64) {
        self.stop_time_scale_animation();
        self.time_scale.start_scale(x);
    }

    pub fn scale_time_to(&mut self, x: f64) -> ChartResult<()> {
        self.time_scale.scale_to(x)?;
        self.recalculate_all_panes();
        self.light_update();
        Ok(())
    }

    pub fn end_scale_time(&mut self) {
        self.time_scale.end_scale();
        self.light_update();
    }

    pub fn start_scale_price(&mut self, pane_index: usize, scale_id: &str, x: f64) -> ChartResult<()> {
        self.price_scale_mut(pane_index, scale_id)?.start_scale(x);
        Ok(())
    }

    pub fn scale_price_to(&mut self, pane_index: usize, scale_id: &str, x: f64) -> ChartResult<()> {
        self.price_scale_mut(pane_index, scale_id)?.scale_to(x);
        self.invalidate_pane(pane_index, InvalidationLevel::Light, false);
        Ok(())
    }

    pub fn end_scale_price(&mut self, pane_index: usize, scale_id: &str) -> ChartResult<()> {
        self.price_scale_mut(pane_index, scale_id)?.end_scale();
        self.invalidate_pane(pane_index, InvalidationLevel::Light, false);
        Ok(())
    }

    pub fn start_scroll_price(&mut self, pane_index: usize, scale_id: &str, x: f64) -> ChartResult<()> {
        let scale = self.price_scale_mut(pane_index, scale_id)?;
        if scale.is_auto_scale() {
            warn!(pane_index, scale_id, "scroll ignored on auto-scaled price scale");
        }
        scale.start_scroll(x);
        Ok(())
    }

    pub fn scroll_price_to(&mut self, pane_index: usize, scale_id: &str, x: f64) -> ChartResult<()> {
        self.price_scale_mut(pane_index, scale_id)?.scroll_to(x);
        self.invalidate_pane(pane_index, InvalidationLevel::Light, false);
        Ok(())
    }

    pub fn end_scroll_price(&mut self, pane_index: usize, scale_id: &str) -> ChartResult<()> {
        self.price_scale_mut(pane_index, scale_id)?.end_scroll();
        self.invalidate_pane(pane_index, InvalidationLevel::Light, false);
        Ok(())
    }

    /// Re-enables auto-scale on the scale and refits it.
    pub fn reset_price_scale(&mut self, pane_index: usize, scale_id: &str) -> ChartResult<()> {
        let visible = self.time_scale.visible_strict_range();
        let pane = self
            .panes
            .get_mut(pane_index)
            .ok_or_else(|| unknown_pane(pane_index))?;
        if pane.price_scale_by_id(scale_id).is_none() {
            return Err(unknown_scale(pane_index, scale_id));
        }
        pane.reset_price_scale(scale_id, visible, &self.series);
        self.invalidate_pane(pane_index, InvalidationLevel::Light, false);
        Ok(())
    }

    pub fn fit_content(&mut self) {
        self.queue_time_scale(TimeScaleInvalidation::FitContent);
    }

    pub fn set_target_logical_range(&mut self, range: LogicalRange) -> ChartResult<()> {
        if !range.is_finite() {
            return Err(ChartError::InvalidArgument(format!(
                "logical range must be finite, got {range:?}"
            )));
        }
        self.queue_time_scale(TimeScaleInvalidation::ApplyRange(range));
        Ok(())
    }

    pub fn set_bar_spacing(&mut self, spacing: f64) -> ChartResult<()> {
        if !spacing.is_finite() || spacing <= 0.0 {
            return Err(ChartError::InvalidArgument(format!(
                "bar spacing must be finite and > 0, got {spacing}"
            )));
        }
        self.queue_time_scale(TimeScaleInvalidation::ApplyBarSpacing(spacing));
        Ok(())
    }

    pub fn set_right_offset(&mut self, offset: f64) -> ChartResult<()> {
        if !offset.is_finite() {
            return Err(ChartError::InvalidArgument(format!(
                "right offset must be finite, got {offset}"
            )));
        }
        self.queue_time_scale(TimeScaleInvalidation::ApplyRightOffset(offset));
        Ok(())
    }

    pub fn reset_time_scale(&mut self) {
        self.queue_time_scale(TimeScaleInvalidation::Reset);
    }

    /// Animates the right offset to `offset` over `duration_ms` from `now`.
    pub fn scroll_to_offset_animated(
        &mut self,
        offset: f64,
        duration_ms: f64,
        now: f64,
    ) -> ChartResult<()> {
        let animation = self
            .time_scale
            .scroll_to_offset_animated(offset, duration_ms, now)?;
        self.set_time_scale_animation(animation);
        Ok(())
    }

    /// Animated return to the default right offset.
    pub fn scroll_to_real_time(&mut self, now: f64) -> ChartResult<()> {
        let offset = self.time_scale.default_right_offset();
        self.scroll_to_offset_animated(offset, REAL_TIME_ANIMATION_DURATION_MS, now)
    }

    pub fn set_time_scale_animation(&mut self, animation: Animation) {
        self.queue_time_scale(TimeScaleInvalidation::Animation(animation));
    }

    pub fn stop_time_scale_animation(&mut self) {
        self.queue_time_scale(TimeScaleInvalidation::StopAnimation);
    }

    /// Replays the mask's time-scale commands in order at `now`. Returns
    /// whether an animation is still running afterwards.
    pub fn apply_time_scale_invalidations(
        &mut self,
        mask: &InvalidateMask,
        now: f64,
    ) -> ChartResult<bool> {
        let mut animation_running = false;
        for invalidation in mask.time_scale_invalidations() {
            match *invalidation {
                TimeScaleInvalidation::FitContent => self.time_scale.fit_content()?,
                TimeScaleInvalidation::ApplyRange(range) => {
                    self.time_scale.set_logical_range(range)?;
                }
                TimeScaleInvalidation::ApplyBarSpacing(spacing) => {
                    self.time_scale.set_bar_spacing(spacing)?;
                }
                TimeScaleInvalidation::ApplyRightOffset(offset) => {
                    self.time_scale.set_right_offset(offset)?;
                }
                TimeScaleInvalidation::Reset => self.time_scale.restore_default()?,
                TimeScaleInvalidation::Animation(animation) => {
                    let position = animation.position_at(now);
                    trace!(position, now, "time scale animation step");
                    self.time_scale.set_right_offset(position)?;
                    animation_running = !animation.is_finished(now);
                }
                TimeScaleInvalidation::StopAnimation => animation_running = false,
            }
        }
        if !mask.time_scale_invalidations().is_empty() {
            self.recalculate_all_panes();
        }
        Ok(animation_running)
    }

    /// Brings every pane up to date for a draw: pane entries flagged
    /// `auto_scale` get a one-off fit, the rest are revalidated.
    pub fn apply_pane_invalidations(&mut self, mask: &InvalidateMask) {
        let visible = self.time_scale.visible_strict_range();
        for (pane_index, pane) in self.panes.iter_mut().enumerate() {
            let invalidation = mask.invalidation_for_pane(pane_index);
            if invalidation.auto_scale {
                pane.momentary_auto_scale(visible, &self.series);
            } else if invalidation.level > InvalidationLevel::None {
                pane.make_sure_valid(&self.series);
            }
        }
    }

    /// Moves the crosshair to the pointer at `(x, y)` inside `pane_index`.
    pub fn set_and_save_current_position(
        &mut self,
        x: f64,
        y: f64,
        pane_index: usize,
    ) -> ChartResult<()> {
        if pane_index >= self.panes.len() {
            return Err(unknown_pane(pane_index));
        }
        let index = self.time_scale.coordinate_to_index(x);
        self.panes[pane_index].make_sure_valid(&self.series);
        let pane = &self.panes[pane_index];
        let default_scale_id = pane.default_visible_price_scale();
        let Some(default_scale) = pane.price_scale_by_id(default_scale_id) else {
            return Err(unknown_scale(pane_index, default_scale_id));
        };
        let default_first_value = default_scale.first_value().unwrap_or(0.0);
        let price = default_scale.coordinate_to_price(y, default_first_value);

        let mut candidates = Vec::new();
        let mut series_data = Vec::new();
        for id in pane.data_sources() {
            let Some(series) = self.series.get(&id) else {
                continue;
            };
            let Some(row) = series.plot_list().value_at(index) else {
                continue;
            };
            series_data.push((id, row.clone()));
            let Some(scale) = pane.price_scale_by_id(series.price_scale_id()) else {
                continue;
            };
            let Some(first_value) = scale.first_value().filter(|_| !scale.is_empty()) else {
                continue;
            };
            let columns: &[PlotRowValueIndex] = if series.kind().behavior().requires_ohlc {
                &[
                    PlotRowValueIndex::Open,
                    PlotRowValueIndex::High,
                    PlotRowValueIndex::Low,
                    PlotRowValueIndex::Close,
                ]
            } else {
                &[PlotRowValueIndex::Close]
            };
            for column in columns {
                let coordinate = scale.price_to_coordinate(row.value_of(*column), first_value);
                candidates.push((
                    default_scale.coordinate_to_price(coordinate, default_first_value),
                    coordinate,
                ));
            }
        }
        let price = self.crosshair.align_price(price, y, candidates);

        self.crosshair.set_position(index, price, pane_index);
        self.crosshair.save_origin(x, y);
        let event = CrosshairMove {
            logical: Some(index),
            time: self
                .time_scale
                .index_to_time_scale_point(index)
                .map(|point| point.original_time.clone()),
            point: Some((x, y)),
            pane_index: Some(pane_index),
            series_data,
        };
        self.cursor_update();
        self.crosshair_moved.fire(&event);
        Ok(())
    }

    pub fn clear_current_position(&mut self) {
        self.crosshair.clear_position();
        self.cursor_update();
        self.crosshair_moved.fire(&CrosshairMove::default());
    }

    /// Forwards `mask` to the handler (or the pending slot) and marks every
    /// pane's grid dirty.
    pub fn invalidate(&mut self, mask: InvalidateMask) {
        for pane in &mut self.panes {
            pane.invalidate_grid();
        }
        if let Some(handler) = &mut self.invalidate_handler {
            handler(&mask);
        } else if let Some(pending) = &mut self.pending_invalidation {
            pending.merge(&mask);
        } else {
            self.pending_invalidation = Some(mask);
        }
    }

    #[must_use]
    pub fn pending_invalidation(&self) -> Option<&InvalidateMask> {
        self.pending_invalidation.as_ref()
    }

    pub fn take_pending_invalidation(&mut self) -> Option<InvalidateMask> {
        self.pending_invalidation.take()
    }

    pub fn full_update(&mut self) {
        self.invalidate(InvalidateMask::full());
    }

    pub fn light_update(&mut self) {
        self.invalidate(InvalidateMask::light());
    }

    pub fn cursor_update(&mut self) {
        self.invalidate(InvalidateMask::cursor());
    }

    pub fn invalidate_pane(&mut self, pane_index: usize, level: InvalidationLevel, auto_scale: bool) {
        let mut mask = InvalidateMask::new(level);
        mask.invalidate_pane(pane_index, PaneInvalidation::new(level, auto_scale));
        self.invalidate(mask);
    }

    /// Time-scale commands wait for the next draw step.
    fn queue_time_scale(&mut self, command: TimeScaleInvalidation) {
        self.invalidate(InvalidateMask::light().with_time_scale(command));
    }

    fn recalculate_pane(&mut self, pane_index: usize) {
        let visible = self.time_scale.visible_strict_range();
        if let Some(pane) = self.panes.get_mut(pane_index) {
            pane.recalculate(visible, &self.series);
        }
    }

    fn series_scale(&mut self, id: SeriesId) -> ChartResult<Option<(&PriceScale, f64)>> {
        let pane_index = self.pane_index_of(id).ok_or_else(|| unknown_series(id))?;
        let visible = self.time_scale.visible_strict_range();
        let pane = &mut self.panes[pane_index];
        pane.make_sure_valid(&self.series);
        let series = self.series.get(&id).ok_or_else(|| unknown_series(id))?;
        let Some(first_value) = visible.and_then(|bars| series.first_value(bars)) else {
            return Ok(None);
        };
        Ok(pane
            .price_scale_by_id(series.price_scale_id())
            .map(|scale| (scale, first_value)))
    }
}

fn unknown_pane(pane_index: usize) -> ChartError {
    ChartError::InvalidArgument(format!("unknown pane index {pane_index}"))
}

fn unknown_series(id: SeriesId) -> ChartError {
    ChartError::InvalidArgument(format!("unknown {id}"))
}

fn unknown_scale(pane_index: usize, scale_id: &str) -> ChartError {
    ChartError::InvalidArgument(format!(
        "pane {pane_index} has no price scale `{scale_id}`"
    ))
}
