use std::cell::RefCell;
use std::fmt::{self, Write as _};
use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::core::{
    Delegate, LogicalRange, MismatchDirection, OriginalTime, PlotRow, SubscriptionId, TimeInput,
    convert_time,
};
use crate::error::{ChartError, ChartResult};
use crate::model::{
    ChartModel, CrosshairMove, DataLayer, InvalidateMask, PriceScale, PriceScaleOptions,
    SeriesDataItem, SeriesId, SeriesKind, SeriesOptions, TimeRange,
};

use super::frame::{FrameScheduler, FrameToken};
use super::options::ChartOptions;

/// Duration of `scroll_to_position(.., animated = true)` in milliseconds.
pub const SCROLL_ANIMATION_DURATION_MS: f64 = 1_000.0;

/// Called once per frame with the merged mask and the up-to-date model.
pub type DrawHandler = Box<dyn FnMut(&InvalidateMask, &ChartModel)>;

/// Bars of a series around a logical range.
#[derive(Debug, Clone, PartialEq)]
pub struct BarsInfo {
    pub bars_before: f64,
    pub bars_after: f64,
    /// Original time of the first and last series bar inside the range.
    pub from: Option<OriginalTime>,
    pub to: Option<OriginalTime>,
}

struct FrameState {
    pending: Option<InvalidateMask>,
    token: Option<FrameToken>,
    scheduler: Box<dyn FrameScheduler>,
}

impl FrameState {
    fn push(&mut self, mask: &InvalidateMask) {
        match &mut self.pending {
            Some(pending) => pending.merge(mask),
            None => self.pending = Some(mask.clone()),
        }
        if self.token.is_none() {
            let token = self.scheduler.schedule();
            trace!(token = token.raw(), "frame scheduled");
            self.token = Some(token);
        }
    }
}

/// An owned chart instance: model, data layer and frame batching.
pub struct ChartApi {
    options: ChartOptions,
    model: ChartModel,
    data_layer: DataLayer,
    frame: Rc<RefCell<FrameState>>,
    draw_handler: Option<DrawHandler>,
    size_changed: Delegate<(f64, f64)>,
}

impl fmt::Debug for ChartApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChartApi")
            .field("options", &self.options)
            .field("model", &self.model)
            .field("frame_pending", &self.frame.borrow().token)
            .finish_non_exhaustive()
    }
}

/// Builds a chart sized and configured by `options`; frames are requested
/// from `scheduler`.
pub fn create_chart(
    options: ChartOptions,
    scheduler: impl FrameScheduler + 'static,
) -> ChartResult<ChartApi> {
    options.validate()?;
    let mut model = ChartModel::new(options.model_options())?;
    model.set_font_size(options.layout.font_size)?;
    let frame = Rc::new(RefCell::new(FrameState {
        pending: None,
        token: None,
        scheduler: Box::new(scheduler),
    }));
    let sink = Rc::clone(&frame);
    model.set_invalidate_handler(Box::new(move |mask: &InvalidateMask| {
        sink.borrow_mut().push(mask);
    }));

    let mut chart = ChartApi {
        options: options.clone(),
        model,
        data_layer: DataLayer::new(),
        frame,
        draw_handler: None,
        size_changed: Delegate::new(),
    };
    chart.apply_size(options.width, options.height)?;
    debug!(width = options.width, height = options.height, "chart created");
    Ok(chart)
}

impl ChartApi {
    #[must_use]
    pub fn options(&self) -> &ChartOptions {
        &self.options
    }

    pub fn apply_options(&mut self, options: ChartOptions) -> ChartResult<()> {
        options.validate()?;
        self.model.apply_options(options.model_options())?;
        self.model.set_font_size(options.layout.font_size)?;
        let resized = options.width != self.options.width || options.height != self.options.height;
        self.options = options;
        if resized {
            self.resize(self.options.width, self.options.height)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn model(&self) -> &ChartModel {
        &self.model
    }

    /// Direct model access for hosts forwarding decoded gestures.
    pub fn model_mut(&mut self) -> &mut ChartModel {
        &mut self.model
    }

    pub fn set_draw_handler(&mut self, handler: DrawHandler) {
        self.draw_handler = Some(handler);
    }

    /// `true` while a requested frame has not run yet.
    #[must_use]
    pub fn has_pending_frame(&self) -> bool {
        self.frame.borrow().token.is_some()
    }

    pub fn resize(&mut self, width: f64, height: f64) -> ChartResult<()> {
        if width == self.options.width && height == self.options.height {
            return Ok(());
        }
        self.apply_size(width, height)?;
        self.options.width = width;
        self.options.height = height;
        self.size_changed.fire(&(width, height));
        Ok(())
    }

    pub fn add_series(
        &mut self,
        kind: SeriesKind,
        options: SeriesOptions,
        pane_index: usize,
    ) -> ChartResult<SeriesId> {
        let panes_before = self.model.panes().len();
        let id = self.model.add_series(kind, options, pane_index)?;
        if self.model.panes().len() != panes_before {
            self.layout_panes(self.options.height)?;
        }
        Ok(id)
    }

    pub fn remove_series(&mut self, id: SeriesId) -> ChartResult<()> {
        self.model.remove_series(id)?;
        let response = self.data_layer.remove_series(id);
        self.model.apply_data_update(&response)
    }

    /// Removes a pane with all of its series and their data. Time points
    /// only those series used leave the time axis.
    pub fn remove_pane(&mut self, pane_index: usize) -> ChartResult<()> {
        let removed = self.model.remove_pane(pane_index)?;
        for id in removed {
            let response = self.data_layer.remove_series(id);
            self.model.apply_data_update(&response)?;
        }
        self.layout_panes(self.options.height)
    }

    /// Replaces all data of a series.
    pub fn set_data(&mut self, id: SeriesId, items: &[SeriesDataItem]) -> ChartResult<()> {
        let kind = self.series_kind(id)?;
        let response = self.data_layer.set_series_data(id, kind, items)?;
        self.model.apply_data_update(&response)
    }

    /// Realtime tick: replaces the last bar or appends a newer one.
    pub fn update(&mut self, id: SeriesId, item: &SeriesDataItem) -> ChartResult<()> {
        let kind = self.series_kind(id)?;
        let response = self.data_layer.update_series_data(id, kind, item)?;
        self.model.apply_data_update(&response)
    }

    pub fn series_data(&self, id: SeriesId) -> ChartResult<&[PlotRow]> {
        let series = self.model.series(id).ok_or_else(|| unknown_series(id))?;
        Ok(series.plot_list().rows())
    }

    pub fn apply_series_options(&mut self, id: SeriesId, options: SeriesOptions) -> ChartResult<()> {
        self.model.apply_series_options(id, options)
    }

    pub fn price_to_coordinate(&mut self, id: SeriesId, price: f64) -> ChartResult<Option<f64>> {
        self.model.series_price_to_coordinate(id, price)
    }

    pub fn coordinate_to_price(&mut self, id: SeriesId, y: f64) -> ChartResult<Option<f64>> {
        self.model.series_coordinate_to_price(id, y)
    }

    pub fn price_scale(&mut self, pane_index: usize, scale_id: &str) -> ChartResult<&PriceScale> {
        self.model.price_scale(pane_index, scale_id)
    }

    pub fn apply_price_scale_options(
        &mut self,
        pane_index: usize,
        scale_id: &str,
        options: PriceScaleOptions,
    ) -> ChartResult<()> {
        self.model
            .price_scale_mut(pane_index, scale_id)?
            .apply_options(options)?;
        self.model.recalculate_all_panes();
        self.model.full_update();
        Ok(())
    }

    pub fn visible_logical_range(&mut self) -> Option<LogicalRange> {
        self.model.time_scale_mut().visible_logical_range()
    }

    /// Applied on the next frame.
    pub fn set_visible_logical_range(&mut self, range: LogicalRange) -> ChartResult<()> {
        self.model.set_target_logical_range(range)
    }

    pub fn visible_range(&mut self) -> Option<TimeRange> {
        self.model.time_scale_mut().visible_time_range()
    }

    /// Shows the bars between two times; ignored while there is no data.
    pub fn set_visible_range(&mut self, from: &TimeInput, to: &TimeInput) -> ChartResult<()> {
        let from = convert_time(from)?;
        let to = convert_time(to)?;
        match self.model.time_scale().logical_range_for_time_range(from, to) {
            Some(range) => self.model.set_target_logical_range(range),
            None => Ok(()),
        }
    }

    #[must_use]
    pub fn scroll_position(&self) -> f64 {
        self.model.time_scale().scroll_position()
    }

    pub fn scroll_to_position(&mut self, position: f64, animated: bool, now: f64) -> ChartResult<()> {
        if animated {
            self.model
                .scroll_to_offset_animated(position, SCROLL_ANIMATION_DURATION_MS, now)
        } else {
            self.model.set_right_offset(position)
        }
    }

    pub fn scroll_to_real_time(&mut self, now: f64) -> ChartResult<()> {
        self.model.scroll_to_real_time(now)
    }

    pub fn fit_content(&mut self) {
        self.model.fit_content();
    }

    pub fn reset_time_scale(&mut self) {
        self.model.reset_time_scale();
    }

    /// `None` for times not on the time axis.
    pub fn time_to_coordinate(&self, time: &TimeInput) -> ChartResult<Option<f64>> {
        let time = convert_time(time)?;
        let time_scale = self.model.time_scale();
        Ok(time_scale
            .time_to_index(time, false)
            .map(|index| time_scale.index_to_coordinate(index)))
    }

    #[must_use]
    pub fn coordinate_to_time(&self, x: f64) -> Option<OriginalTime> {
        let time_scale = self.model.time_scale();
        let index = time_scale.coordinate_to_index(x);
        time_scale
            .index_to_time_scale_point(index)
            .map(|point| point.original_time.clone())
    }

    #[must_use]
    pub fn logical_to_coordinate(&self, logical: f64) -> f64 {
        self.model.time_scale().logical_to_coordinate(logical)
    }

    #[must_use]
    pub fn coordinate_to_logical(&self, x: f64) -> f64 {
        self.model.time_scale().coordinate_to_float_index(x)
    }

    /// Bars of `id` before and after `range`; `None` when the series is empty.
    pub fn bars_in_logical_range(
        &self,
        id: SeriesId,
        range: LogicalRange,
    ) -> ChartResult<Option<BarsInfo>> {
        let series = self.model.series(id).ok_or_else(|| unknown_series(id))?;
        let bars = series.plot_list();
        let (Some(first_index), Some(last_index)) = (bars.first_index(), bars.last_index()) else {
            return Ok(None);
        };
        let strict = range.to_strict();
        let first_in_range = bars.search(strict.left(), MismatchDirection::NearestRight);
        let last_in_range = bars.search(strict.right(), MismatchDirection::NearestLeft);

        // Range inside a data gap: the nearest bars cross over.
        if let (Some(first), Some(last)) = (first_in_range, last_in_range)
            && first.index > last.index
        {
            return Ok(Some(BarsInfo {
                bars_before: range.from - first_index as f64 - 1.0,
                bars_after: last_index as f64 - range.to - 1.0,
                from: None,
                to: None,
            }));
        }

        let bars_before = match first_in_range {
            Some(first) if first.index != first_index => (first.index - first_index) as f64,
            _ => range.from - first_index as f64,
        };
        let bars_after = match last_in_range {
            Some(last) if last.index != last_index => (last_index - last.index) as f64,
            _ => last_index as f64 - range.to,
        };
        let (from, to) = match (first_in_range, last_in_range) {
            (Some(first), Some(last)) => (
                Some(first.original_time.clone()),
                Some(last.original_time.clone()),
            ),
            _ => (None, None),
        };
        Ok(Some(BarsInfo {
            bars_before,
            bars_after,
            from,
            to,
        }))
    }

    pub fn set_crosshair_position(&mut self, x: f64, y: f64, pane_index: usize) -> ChartResult<()> {
        self.model.set_and_save_current_position(x, y, pane_index)
    }

    pub fn clear_crosshair_position(&mut self) {
        self.model.clear_current_position();
    }

    /// Crosshair time formatted with the localization date format.
    pub fn crosshair_time_label(&self) -> ChartResult<Option<String>> {
        let Some(position) = self.model.crosshair().position() else {
            return Ok(None);
        };
        let Some(datetime) = self
            .model
            .time_scale()
            .index_to_time(position.index)
            .and_then(|time| time.to_datetime())
        else {
            return Ok(None);
        };
        let mut label = String::new();
        write!(label, "{}", datetime.format(&self.options.localization.date_format)).map_err(
            |_| {
                ChartError::InvalidOptions(format!(
                    "invalid date format `{}`",
                    self.options.localization.date_format
                ))
            },
        )?;
        Ok(Some(label))
    }

    pub fn subscribe_visible_logical_range_change(
        &mut self,
        listener: impl FnMut(&Option<LogicalRange>) + 'static,
    ) -> SubscriptionId {
        self.model
            .time_scale_mut()
            .logical_range_changed()
            .subscribe(listener)
    }

    pub fn unsubscribe_visible_logical_range_change(&mut self, id: SubscriptionId) -> bool {
        self.model.time_scale_mut().logical_range_changed().unsubscribe(id)
    }

    pub fn subscribe_size_change(
        &mut self,
        listener: impl FnMut(&(f64, f64)) + 'static,
    ) -> SubscriptionId {
        self.size_changed.subscribe(listener)
    }

    pub fn unsubscribe_size_change(&mut self, id: SubscriptionId) -> bool {
        self.size_changed.unsubscribe(id)
    }

    pub fn subscribe_crosshair_move(
        &mut self,
        listener: impl FnMut(&CrosshairMove) + 'static,
    ) -> SubscriptionId {
        self.model.crosshair_moved().subscribe(listener)
    }

    pub fn unsubscribe_crosshair_move(&mut self, id: SubscriptionId) -> bool {
        self.model.crosshair_moved().unsubscribe(id)
    }

    /// Runs one draw pass over everything invalidated since the last frame.
    /// An unfinished time-scale animation requests the next frame.
    pub fn on_frame(&mut self, now: f64) -> ChartResult<()> {
        let mask = {
            let mut frame = self.frame.borrow_mut();
            frame.token = None;
            frame.pending.take()
        };
        let Some(mask) = mask else {
            trace!(now, "frame without invalidation");
            return Ok(());
        };
        trace!(now, level = ?mask.full_invalidation(), "draw pass");

        let animation = mask.time_scale_animation();
        let animation_running = self.model.apply_time_scale_invalidations(&mask, now)?;
        self.model.apply_pane_invalidations(&mask);
        self.model.time_scale_mut().visible_logical_range();

        match &mut self.draw_handler {
            Some(handler) => handler(&mask, &self.model),
            None => warn!(now, "frame fired without a draw handler"),
        }

        if animation_running && let Some(animation) = animation {
            self.model.set_time_scale_animation(animation);
        }
        Ok(())
    }

    /// Cancels any requested frame and releases all data.
    pub fn remove(mut self) {
        let mut frame = self.frame.borrow_mut();
        if let Some(token) = frame.token.take() {
            frame.scheduler.cancel(token);
        }
        frame.pending = None;
        drop(frame);
        self.data_layer.destroy();
        self.size_changed.clear();
        debug!("chart removed");
    }

    fn series_kind(&self, id: SeriesId) -> ChartResult<SeriesKind> {
        self.model
            .series(id)
            .map(|series| series.kind())
            .ok_or_else(|| unknown_series(id))
    }

    fn apply_size(&mut self, width: f64, height: f64) -> ChartResult<()> {
        if !width.is_finite() || !height.is_finite() || width < 0.0 || height < 0.0 {
            return Err(ChartError::InvalidViewport { width, height });
        }
        self.model.set_width(width)?;
        self.layout_panes(height)
    }

    /// Splits `height` between panes by stretch factor.
    fn layout_panes(&mut self, height: f64) -> ChartResult<()> {
        let total_stretch: f64 = self.model.panes().iter().map(|pane| pane.stretch_factor()).sum();
        let heights = self
            .model
            .panes()
            .iter()
            .map(|pane| {
                if total_stretch > 0.0 {
                    (height * pane.stretch_factor() / total_stretch).floor()
                } else {
                    0.0
                }
            })
            .collect::<Vec<_>>();
        for (pane_index, pane_height) in heights.into_iter().enumerate() {
            self.model.set_pane_height(pane_index, pane_height)?;
        }
        Ok(())
    }
}

fn unknown_series(id: SeriesId) -> ChartError {
    ChartError::InvalidArgument(format!("unknown {id}"))
}
