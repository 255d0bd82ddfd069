use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::core::price_transform::{
    convert_price_range_from_log, convert_price_range_to_log, from_indexed_to_100, from_log,
    from_percent, log_formula_for_price_range, to_indexed_to_100, to_indexed_to_100_range, to_log,
    to_percent, to_percent_range,
};
use crate::core::{Delegate, Generation, LogFormula, Memo, PriceRange, StrictRange};
use crate::error::{ChartError, ChartResult};

use super::price_formatter::{PriceFormat, PriceFormatter};
use super::price_tick_marks::{PriceMark, PriceTickMarkBuilder};

const DEFAULT_FONT_SIZE: f64 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PriceScaleMode {
    #[default]
    Normal,
    Logarithmic,
    Percentage,
    IndexedTo100,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceScaleState {
    pub auto_scale: bool,
    pub is_inverted: bool,
    pub mode: PriceScaleMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PriceScaleStateChange {
    pub auto_scale: Option<bool>,
    pub is_inverted: Option<bool>,
    pub mode: Option<PriceScaleMode>,
}

/// Fractions of the scale height kept free above and below the data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceScaleMargins {
    pub top: f64,
    pub bottom: f64,
}

impl Default for PriceScaleMargins {
    fn default() -> Self {
        Self {
            top: 0.2,
            bottom: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceScaleOptions {
    pub visible: bool,
    pub auto_scale: bool,
    pub mode: PriceScaleMode,
    pub invert_scale: bool,
    pub scale_margins: PriceScaleMargins,
    pub ensure_edge_tick_marks_visible: bool,
    pub entire_text_only: bool,
}

impl Default for PriceScaleOptions {
    fn default() -> Self {
        Self {
            visible: true,
            auto_scale: true,
            mode: PriceScaleMode::Normal,
            invert_scale: false,
            scale_margins: PriceScaleMargins::default(),
            ensure_edge_tick_marks_visible: false,
            entire_text_only: false,
        }
    }
}

impl PriceScaleOptions {
    pub fn validate(&self) -> ChartResult<()> {
        let PriceScaleMargins { top, bottom } = self.scale_margins;
        if !(0.0..=1.0).contains(&top) {
            return Err(ChartError::InvalidOptions(format!(
                "price scale top margin must be in [0,1], got {top}"
            )));
        }
        if !(0.0..=1.0).contains(&bottom) {
            return Err(ChartError::InvalidOptions(format!(
                "price scale bottom margin must be in [0,1], got {bottom}"
            )));
        }
        if top + bottom > 1.0 {
            return Err(ChartError::InvalidOptions(format!(
                "sum of price scale margins must be <= 1, got {}",
                top + bottom
            )));
        }
        Ok(())
    }
}

/// Extra pixels a source asks to keep free above/below its range.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AutoScaleMargins {
    pub above: f64,
    pub below: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AutoScaleInfo {
    pub price_range: Option<PriceRange>,
    pub margins: Option<AutoScaleMargins>,
}

/// Anything that can contribute a price range to an auto-scaled price scale.
pub trait AutoScaleSource {
    fn visible(&self) -> bool;
    /// Base value for percentage modes: the first bar inside `visible_bars`.
    fn first_value(&self, visible_bars: StrictRange) -> Option<f64>;
    fn autoscale_info(&self, visible_bars: StrictRange) -> Option<AutoScaleInfo>;
}

#[derive(Debug)]
pub struct PriceScale {
    id: String,
    options: PriceScaleOptions,
    height: f64,
    font_size: f64,
    price_range: Option<PriceRange>,
    price_range_snapshot: Option<PriceRange>,
    invalidated_for_range: Option<StrictRange>,
    range_valid: bool,
    is_custom_price_range: bool,
    margin_above: f64,
    margin_below: f64,
    scale_start_point: Option<f64>,
    scroll_start_point: Option<f64>,
    log_formula: LogFormula,
    price_format: PriceFormat,
    formatter: PriceFormatter,
    mark_builder: PriceTickMarkBuilder,
    first_value: Option<f64>,
    marks_generation: Generation,
    marks_cache: Memo<(Generation, Option<OrderedFloat<f64>>), Vec<PriceMark>>,
    mode_changed: Delegate<(PriceScaleState, PriceScaleState)>,
}

impl PriceScale {
    #[must_use]
    pub fn new(id: impl Into<String>, options: PriceScaleOptions) -> Self {
        let mut scale = Self {
            id: id.into(),
            options,
            height: 0.0,
            font_size: DEFAULT_FONT_SIZE,
            price_range: None,
            price_range_snapshot: None,
            invalidated_for_range: None,
            range_valid: true,
            is_custom_price_range: false,
            margin_above: 0.0,
            margin_below: 0.0,
            scale_start_point: None,
            scroll_start_point: None,
            log_formula: LogFormula::default(),
            price_format: PriceFormat::default(),
            formatter: PriceFormatter::default(),
            mark_builder: PriceTickMarkBuilder::default(),
            first_value: None,
            marks_generation: Generation::default(),
            marks_cache: Memo::new(),
            mode_changed: Delegate::new(),
        };
        scale.update_formatter();
        scale
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn options(&self) -> PriceScaleOptions {
        self.options
    }

    /// Margins are validated before anything is applied.
    pub fn apply_options(&mut self, options: PriceScaleOptions) -> ChartResult<()> {
        options.validate()?;
        debug!(id = %self.id, ?options, "apply price scale options");
        let previous = self.mode();
        self.options.visible = options.visible;
        self.options.scale_margins = options.scale_margins;
        self.options.ensure_edge_tick_marks_visible = options.ensure_edge_tick_marks_visible;
        self.options.entire_text_only = options.entire_text_only;
        let change = PriceScaleStateChange {
            auto_scale: (previous.auto_scale != options.auto_scale).then_some(options.auto_scale),
            is_inverted: (previous.is_inverted != options.invert_scale)
                .then_some(options.invert_scale),
            mode: (previous.mode != options.mode).then_some(options.mode),
        };
        if change != PriceScaleStateChange::default() {
            self.set_mode(change);
        }
        self.invalidate_marks();
        Ok(())
    }

    /// Fired synchronously with `(old, new)` whenever `set_mode` runs.
    pub fn mode_changed(&mut self) -> &mut Delegate<(PriceScaleState, PriceScaleState)> {
        &mut self.mode_changed
    }

    #[must_use]
    pub fn mode(&self) -> PriceScaleState {
        PriceScaleState {
            auto_scale: self.options.auto_scale,
            is_inverted: self.options.invert_scale,
            mode: self.options.mode,
        }
    }

    /// Switching in or out of log mode converts the stored range so the
    /// visible window survives the toggle.
    pub fn set_mode(&mut self, change: PriceScaleStateChange) {
        let old_mode = self.mode();
        if let Some(auto_scale) = change.auto_scale {
            self.options.auto_scale = auto_scale;
        }
        if let Some(mode) = change.mode {
            self.options.mode = mode;
            if matches!(
                mode,
                PriceScaleMode::Percentage | PriceScaleMode::IndexedTo100
            ) {
                self.options.auto_scale = true;
            }
            self.range_valid = false;
        }

        if old_mode.mode == PriceScaleMode::Logarithmic && self.options.mode != old_mode.mode {
            match convert_price_range_from_log(self.price_range, self.log_formula)
                .filter(|range| range.min().is_finite() && range.max().is_finite())
            {
                Some(raw) => self.set_price_range(Some(raw)),
                None => self.options.auto_scale = true,
            }
        }
        if self.options.mode == PriceScaleMode::Logarithmic && self.options.mode != old_mode.mode {
            if let Some(log_range) = convert_price_range_to_log(self.price_range, self.log_formula) {
                self.set_price_range(Some(log_range));
            }
        }

        if old_mode.mode != self.options.mode {
            self.update_formatter();
        }
        if let Some(inverted) = change.is_inverted {
            self.options.invert_scale = inverted;
        }
        self.invalidate_marks();

        let new_mode = self.mode();
        debug!(id = %self.id, ?old_mode, ?new_mode, "price scale mode changed");
        self.mode_changed.fire(&(old_mode, new_mode));
    }

    #[must_use]
    pub fn is_auto_scale(&self) -> bool {
        self.options.auto_scale
    }

    #[must_use]
    pub fn is_custom_price_range(&self) -> bool {
        self.is_custom_price_range
    }

    #[must_use]
    pub fn is_log(&self) -> bool {
        self.options.mode == PriceScaleMode::Logarithmic
    }

    #[must_use]
    pub fn is_percentage(&self) -> bool {
        self.options.mode == PriceScaleMode::Percentage
    }

    #[must_use]
    pub fn is_indexed_to_100(&self) -> bool {
        self.options.mode == PriceScaleMode::IndexedTo100
    }

    #[must_use]
    pub fn is_inverted(&self) -> bool {
        self.options.invert_scale
    }

    #[must_use]
    pub fn log_formula(&self) -> LogFormula {
        self.log_formula
    }

    pub fn set_height(&mut self, value: f64) {
        if self.height == value {
            return;
        }
        self.height = value;
        self.invalidate_source_range();
        self.invalidate_marks();
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn set_font_size(&mut self, font_size: f64) {
        if self.font_size != font_size {
            self.font_size = font_size;
            self.invalidate_marks();
        }
    }

    #[must_use]
    pub fn font_size(&self) -> f64 {
        self.font_size
    }

    #[must_use]
    pub fn internal_height(&self) -> f64 {
        self.height - self.top_margin_px() - self.bottom_margin_px()
    }

    /// Pixel margins reported by sources, `(above, below)`.
    #[must_use]
    pub fn source_margins(&self) -> (f64, f64) {
        (self.margin_above, self.margin_below)
    }

    #[must_use]
    pub fn price_range(&self) -> Option<PriceRange> {
        self.price_range
    }

    pub fn set_price_range(&mut self, range: Option<PriceRange>) {
        let unchanged = match (self.price_range, range) {
            (Some(current), Some(next)) => current.equals(next),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }
        self.price_range = range;
        self.invalidate_marks();
    }

    /// Pins a manual range; it survives recalculation while auto-scale is off.
    pub fn set_custom_price_range(&mut self, range: Option<PriceRange>) {
        self.set_price_range(range);
        self.is_custom_price_range = range.is_some();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.height == 0.0 || self.price_range.is_none_or(PriceRange::is_empty)
    }

    /// Sets the format of the series that drives labels and the tick base.
    pub fn set_price_format(&mut self, format: PriceFormat) {
        if self.price_format != format {
            self.price_format = format;
            self.update_formatter();
            self.invalidate_marks();
        }
    }

    #[must_use]
    pub fn price_format(&self) -> PriceFormat {
        self.price_format
    }

    /// First value seen by the last recalculation; the percent-mode base.
    #[must_use]
    pub fn first_value(&self) -> Option<f64> {
        self.first_value
    }

    /// Marks the range for recalculation against `visible_bars`.
    pub fn recalculate_price_range(&mut self, visible_bars: StrictRange) {
        if self.invalidated_for_range != Some(visible_bars) {
            trace!(id = %self.id, ?visible_bars, "price scale visible bars changed");
        }
        self.invalidated_for_range = Some(visible_bars);
        self.range_valid = false;
    }

    /// Marks the range stale for the current visible bars, e.g. after a data
    /// or source change.
    pub fn invalidate_source_range(&mut self) {
        if self.invalidated_for_range.is_some() {
            self.range_valid = false;
        }
    }

    #[must_use]
    pub fn needs_recalculation(&self) -> bool {
        !self.range_valid
    }

    /// Recomputes the range from `sources` if it was invalidated since the
    /// last call.
    pub fn make_sure_valid(&mut self, sources: &[&dyn AutoScaleSource]) {
        if self.range_valid {
            return;
        }
        self.range_valid = true;
        self.recalculate_price_range_impl(sources);
    }

    pub fn price_to_coordinate(&self, price: f64, base_value: f64) -> f64 {
        let logical = if self.is_percentage() {
            to_percent(price, base_value)
        } else if self.is_indexed_to_100() {
            to_indexed_to_100(price, base_value)
        } else {
            price
        };
        self.logical_to_coordinate(logical, base_value)
    }

    pub fn coordinate_to_price(&self, coordinate: f64, base_value: f64) -> f64 {
        let logical = self.coordinate_to_logical(coordinate, base_value);
        self.logical_to_price(logical, base_value)
    }

    #[must_use]
    pub fn logical_to_price(&self, logical: f64, base_value: f64) -> f64 {
        if self.is_percentage() {
            from_percent(logical, base_value)
        } else if self.is_indexed_to_100() {
            from_indexed_to_100(logical, base_value)
        } else {
            logical
        }
    }

    /// `0` while the scale is empty.
    #[must_use]
    pub fn logical_to_coordinate(&self, logical: f64, _base_value: f64) -> f64 {
        let Some(range) = self.price_range.filter(|_| !self.is_empty()) else {
            return 0.0;
        };
        let logical = if self.is_log() && logical != 0.0 {
            to_log(logical, self.log_formula)
        } else {
            logical
        };
        let inv_coordinate = self.bottom_margin_px()
            + (self.internal_height() - 1.0) * (logical - range.min()) / range.length();
        self.inverted_coordinate(inv_coordinate)
    }

    #[must_use]
    pub fn coordinate_to_logical(&self, coordinate: f64, _base_value: f64) -> f64 {
        let Some(range) = self.price_range.filter(|_| !self.is_empty()) else {
            return 0.0;
        };
        let inv_coordinate = self.inverted_coordinate(coordinate);
        let logical = range.min()
            + range.length()
                * ((inv_coordinate - self.bottom_margin_px()) / (self.internal_height() - 1.0));
        if self.is_log() {
            from_log(logical, self.log_formula)
        } else {
            logical
        }
    }

    pub fn start_scale(&mut self, x: f64) {
        if self.is_percentage() || self.is_indexed_to_100() {
            return;
        }
        if self.scale_start_point.is_some() || self.price_range_snapshot.is_some() {
            return;
        }
        if self.is_empty() {
            return;
        }
        self.scale_start_point = Some(self.height - x);
        self.price_range_snapshot = self.price_range;
    }

    pub fn scale_to(&mut self, x: f64) {
        if self.is_percentage() || self.is_indexed_to_100() {
            return;
        }
        let Some(scale_start) = self.scale_start_point else {
            return;
        };
        self.options.auto_scale = false;
        let x = (self.height - x).max(0.0);
        let stretch = (self.height - 1.0) * 0.2;
        let coeff = ((scale_start + stretch) / (x + stretch)).max(0.1);
        if let Some(mut range) = self.price_range_snapshot {
            range.scale_around_center(coeff);
            self.set_price_range(Some(range));
        }
    }

    pub fn end_scale(&mut self) {
        if self.is_percentage() || self.is_indexed_to_100() {
            return;
        }
        self.scale_start_point = None;
        self.price_range_snapshot = None;
    }

    pub fn start_scroll(&mut self, x: f64) {
        if self.options.auto_scale {
            return;
        }
        if self.scroll_start_point.is_some() || self.price_range_snapshot.is_some() {
            return;
        }
        if self.is_empty() {
            return;
        }
        self.scroll_start_point = Some(x);
        self.price_range_snapshot = self.price_range;
    }

    pub fn scroll_to(&mut self, x: f64) {
        if self.options.auto_scale {
            return;
        }
        let (Some(scroll_start), Some(mut snapshot)) =
            (self.scroll_start_point, self.price_range_snapshot)
        else {
            return;
        };
        let mut pixel_delta = x - scroll_start;
        if self.is_inverted() {
            pixel_delta *= -1.0;
        }
        let price_units_per_pixel = snapshot.length() / (self.internal_height() - 1.0);
        snapshot.shift(pixel_delta * price_units_per_pixel);
        self.set_price_range(Some(snapshot));
    }

    pub fn end_scroll(&mut self) {
        if self.options.auto_scale {
            return;
        }
        self.scroll_start_point = None;
        self.price_range_snapshot = None;
    }

    #[must_use]
    pub fn has_visible_edge_marks(&self) -> bool {
        self.options.ensure_edge_tick_marks_visible && self.options.auto_scale
    }

    /// Coordinates of the range's top and bottom edges.
    #[must_use]
    pub fn edge_coordinates(&self) -> Option<(f64, f64)> {
        if self.is_empty() {
            return None;
        }
        let top = self.inverted_coordinate(self.bottom_margin_px() + self.internal_height() - 1.0);
        let bottom = self.inverted_coordinate(self.bottom_margin_px());
        Some((top.min(bottom), top.max(bottom)))
    }

    #[must_use]
    pub fn format_price(&self, price: f64, first_value: f64) -> String {
        let logical = if self.is_percentage() {
            to_percent(price, first_value)
        } else if self.is_indexed_to_100() {
            to_indexed_to_100(price, first_value)
        } else {
            price
        };
        self.formatter.format(logical)
    }

    /// Formats a logical (mode-space) value; log mode values are raw prices.
    #[must_use]
    pub fn format_logical(&self, logical: f64) -> String {
        self.formatter.format(logical)
    }

    /// Axis marks, rebuilt only when the range, height, mode, options or
    /// formatter changed since the last call.
    pub fn marks(&mut self) -> &[PriceMark] {
        let first_value = self.first_value;
        if (self.is_percentage() || self.is_indexed_to_100()) && first_value.is_none() {
            return &[];
        }
        let key = (self.marks_generation, first_value.map(OrderedFloat));
        if self.marks_cache.peek(&key).is_none() {
            let marks = self
                .mark_builder
                .rebuild_tick_marks(self, first_value.unwrap_or(0.0));
            trace!(id = %self.id, count = marks.len(), "price marks rebuilt");
            self.marks_cache.get_or_compute(key, || marks);
        }
        self.marks_cache.peek(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    fn recalculate_price_range_impl(&mut self, sources: &[&dyn AutoScaleSource]) {
        if self.is_custom_price_range && !self.options.auto_scale {
            return;
        }
        let Some(visible_bars) = self.invalidated_for_range else {
            return;
        };

        let mut price_range: Option<PriceRange> = None;
        let mut margin_above: f64 = 0.0;
        let mut margin_below: f64 = 0.0;
        let mut first_value = None;

        for source in sources {
            if !source.visible() {
                continue;
            }
            let Some(source_first_value) = source.first_value(visible_bars) else {
                continue;
            };
            first_value.get_or_insert(source_first_value);
            let Some(info) = source.autoscale_info(visible_bars) else {
                continue;
            };
            if let Some(source_range) = info.price_range {
                let source_range = match self.options.mode {
                    PriceScaleMode::Logarithmic => {
                        convert_price_range_to_log(Some(source_range), self.log_formula)
                            .unwrap_or(source_range)
                    }
                    PriceScaleMode::Percentage => {
                        to_percent_range(source_range, source_first_value)
                    }
                    PriceScaleMode::IndexedTo100 => {
                        to_indexed_to_100_range(source_range, source_first_value)
                    }
                    PriceScaleMode::Normal => source_range,
                };
                price_range = PriceRange::merge_opt(price_range, Some(source_range));
                if let Some(margins) = info.margins {
                    margin_above = margin_above.max(margins.above);
                    // folds against the running top margin, matching long-standing
                    // observable behaviour
                    margin_below = margin_above.max(margins.below);
                }
            }
        }
        self.first_value = first_value;

        if self.has_visible_edge_marks() {
            let padding = self.font_size / 2.0;
            margin_above = margin_above.max(padding);
            margin_below = margin_below.max(padding);
        }
        if margin_above != self.margin_above || margin_below != self.margin_below {
            self.margin_above = margin_above;
            self.margin_below = margin_below;
            self.invalidate_marks();
        }

        if let Some(mut range) = price_range {
            if range.min() == range.max() {
                let min_move = if self.is_percentage() || self.is_indexed_to_100() {
                    1.0
                } else {
                    self.price_format.min_move
                };
                let extend = 5.0 * min_move;
                if self.is_log() {
                    range = convert_price_range_from_log(Some(range), self.log_formula)
                        .unwrap_or(range);
                }
                range = PriceRange::new(range.min() - extend, range.max() + extend);
                if self.is_log() {
                    range = convert_price_range_to_log(Some(range), self.log_formula)
                        .unwrap_or(range);
                }
            }
            if self.is_log()
                && let Some(raw) = convert_price_range_from_log(Some(range), self.log_formula)
            {
                let new_formula = log_formula_for_price_range(Some(raw));
                if !new_formula.same_as(self.log_formula) {
                    let snapshot_raw =
                        convert_price_range_from_log(self.price_range_snapshot, self.log_formula);
                    self.log_formula = new_formula;
                    range = convert_price_range_to_log(Some(raw), new_formula).unwrap_or(range);
                    self.price_range_snapshot =
                        convert_price_range_to_log(snapshot_raw, new_formula);
                    self.invalidate_marks();
                }
            }
            self.set_price_range(Some(range));
        } else if self.price_range.is_none() {
            self.set_price_range(Some(PriceRange::new(-0.5, 0.5)));
            self.log_formula = log_formula_for_price_range(None);
        }
        trace!(id = %self.id, range = ?self.price_range, "price range recalculated");
    }

    fn update_formatter(&mut self) {
        let (formatter, base) = match self.options.mode {
            PriceScaleMode::Percentage => (PriceFormatter::percentage(), 100.0),
            PriceScaleMode::IndexedTo100 => {
                (PriceFormatter::from_format(PriceFormat::default()), 100.0)
            }
            PriceScaleMode::Normal | PriceScaleMode::Logarithmic => (
                PriceFormatter::from_format(self.price_format),
                self.price_format.base(),
            ),
        };
        self.formatter = formatter;
        if self.mark_builder.base() != base {
            self.mark_builder = PriceTickMarkBuilder::new(base);
        }
    }

    fn invalidate_marks(&mut self) {
        self.marks_generation.bump();
    }

    fn inverted_coordinate(&self, coordinate: f64) -> f64 {
        if self.is_inverted() {
            coordinate
        } else {
            self.height - 1.0 - coordinate
        }
    }

    fn top_margin_px(&self) -> f64 {
        if self.is_inverted() {
            self.options.scale_margins.bottom * self.height + self.margin_below
        } else {
            self.options.scale_margins.top * self.height + self.margin_above
        }
    }

    fn bottom_margin_px(&self) -> f64 {
        if self.is_inverted() {
            self.options.scale_margins.top * self.height + self.margin_above
        } else {
            self.options.scale_margins.bottom * self.height + self.margin_below
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use approx::assert_abs_diff_eq;

    use super::{
        AutoScaleInfo, AutoScaleMargins, AutoScaleSource, PriceScale, PriceScaleMargins,
        PriceScaleMode, PriceScaleOptions, PriceScaleStateChange,
    };
    use crate::core::{PriceRange, StrictRange};

    struct FixedSource {
        range: PriceRange,
        margins: Option<AutoScaleMargins>,
    }

    impl AutoScaleSource for FixedSource {
        fn visible(&self) -> bool {
            true
        }

        fn first_value(&self, _visible_bars: StrictRange) -> Option<f64> {
            Some(self.range.min())
        }

        fn autoscale_info(&self, _visible_bars: StrictRange) -> Option<AutoScaleInfo> {
            Some(AutoScaleInfo {
                price_range: Some(self.range),
                margins: self.margins,
            })
        }
    }

    /// Contributes margins but no price range.
    struct MarginsOnlySource;

    impl AutoScaleSource for MarginsOnlySource {
        fn visible(&self) -> bool {
            true
        }

        fn first_value(&self, _visible_bars: StrictRange) -> Option<f64> {
            Some(1.0)
        }

        fn autoscale_info(&self, _visible_bars: StrictRange) -> Option<AutoScaleInfo> {
            Some(AutoScaleInfo {
                price_range: None,
                margins: Some(AutoScaleMargins {
                    above: 40.0,
                    below: 40.0,
                }),
            })
        }
    }

    fn no_margins() -> PriceScaleOptions {
        PriceScaleOptions {
            scale_margins: PriceScaleMargins {
                top: 0.0,
                bottom: 0.0,
            },
            ..PriceScaleOptions::default()
        }
    }

    #[test]
    fn linear_price_coordinate_round_trip_is_stable() {
        let mut price_scale = PriceScale::new("right", PriceScaleOptions::default());
        price_scale.set_height(500.0);
        price_scale.set_price_range(Some(PriceRange::new(100.0, 200.0)));
        let y = price_scale.price_to_coordinate(150.0, 150.0);
        assert_abs_diff_eq!(price_scale.coordinate_to_price(y, 150.0), 150.0, epsilon = 1e-9);
    }

    #[test]
    fn percentage_price_transform_round_trip() {
        let options = PriceScaleOptions {
            mode: PriceScaleMode::Percentage,
            ..Default::default()
        };
        let mut price_scale = PriceScale::new("right", options);
        price_scale.set_height(400.0);
        price_scale.set_price_range(Some(PriceRange::new(-10.0, 10.0)));
        let y = price_scale.price_to_coordinate(105.0, 100.0);
        assert_abs_diff_eq!(price_scale.coordinate_to_price(y, 100.0), 105.0, epsilon = 1e-6);
    }

    #[test]
    fn empty_scale_maps_to_zero() {
        let price_scale = PriceScale::new("right", PriceScaleOptions::default());
        assert!(price_scale.is_empty());
        assert_eq!(price_scale.price_to_coordinate(10.0, 1.0), 0.0);
    }

    #[test]
    fn recalculation_without_sources_falls_back_to_unit_range() {
        let mut price_scale = PriceScale::new("right", PriceScaleOptions::default());
        price_scale.recalculate_price_range(StrictRange::new(0, 10));
        price_scale.make_sure_valid(&[]);
        let range = price_scale.price_range().expect("default range");
        assert_abs_diff_eq!(range.min(), -0.5);
        assert_abs_diff_eq!(range.max(), 0.5);
    }

    #[test]
    fn autoscale_merges_all_sources() {
        let mut price_scale = PriceScale::new("right", no_margins());
        price_scale.set_height(300.0);
        let a = FixedSource {
            range: PriceRange::new(10.0, 20.0),
            margins: None,
        };
        let b = FixedSource {
            range: PriceRange::new(5.0, 15.0),
            margins: None,
        };
        price_scale.recalculate_price_range(StrictRange::new(0, 10));
        price_scale.make_sure_valid(&[&a, &b]);
        assert_eq!(price_scale.price_range(), Some(PriceRange::new(5.0, 20.0)));
    }

    #[test]
    fn recalculation_is_lazy_until_invalidated() {
        let mut price_scale = PriceScale::new("right", no_margins());
        let source = FixedSource {
            range: PriceRange::new(1.0, 2.0),
            margins: None,
        };
        price_scale.recalculate_price_range(StrictRange::new(0, 1));
        assert!(price_scale.needs_recalculation());
        price_scale.make_sure_valid(&[&source]);
        assert!(!price_scale.needs_recalculation());

        let other = FixedSource {
            range: PriceRange::new(100.0, 200.0),
            margins: None,
        };
        price_scale.make_sure_valid(&[&other]);
        assert_eq!(price_scale.price_range(), Some(PriceRange::new(1.0, 2.0)));

        price_scale.invalidate_source_range();
        price_scale.make_sure_valid(&[&other]);
        assert_eq!(price_scale.price_range(), Some(PriceRange::new(100.0, 200.0)));
    }

    #[test]
    fn degenerate_range_is_widened_by_five_min_moves() {
        let mut price_scale = PriceScale::new("right", no_margins());
        let flat = FixedSource {
            range: PriceRange::new(50.0, 50.0),
            margins: None,
        };
        price_scale.recalculate_price_range(StrictRange::new(0, 1));
        price_scale.make_sure_valid(&[&flat]);
        let range = price_scale.price_range().expect("range");
        assert_abs_diff_eq!(range.min(), 49.95, epsilon = 1e-9);
        assert_abs_diff_eq!(range.max(), 50.05, epsilon = 1e-9);
    }

    #[test]
    fn bottom_source_margin_folds_against_top_margin() {
        let mut price_scale = PriceScale::new("right", no_margins());
        let with_top_margin = FixedSource {
            range: PriceRange::new(0.0, 10.0),
            margins: Some(AutoScaleMargins {
                above: 12.0,
                below: 0.0,
            }),
        };
        price_scale.recalculate_price_range(StrictRange::new(0, 1));
        price_scale.make_sure_valid(&[&with_top_margin]);
        assert_eq!(price_scale.source_margins(), (12.0, 12.0));
    }

    #[test]
    fn margins_of_rangeless_sources_are_ignored() {
        let mut price_scale = PriceScale::new("right", no_margins());
        let source = FixedSource {
            range: PriceRange::new(0.0, 10.0),
            margins: Some(AutoScaleMargins {
                above: 4.0,
                below: 2.0,
            }),
        };
        price_scale.recalculate_price_range(StrictRange::new(0, 1));
        price_scale.make_sure_valid(&[&source, &MarginsOnlySource]);
        assert_eq!(price_scale.source_margins(), (4.0, 4.0));
        assert_eq!(price_scale.price_range(), Some(PriceRange::new(0.0, 10.0)));
    }

    #[test]
    fn log_toggle_preserves_visible_window() {
        let mut price_scale = PriceScale::new("right", no_margins());
        price_scale.set_height(400.0);
        price_scale.set_price_range(Some(PriceRange::new(10.0, 1000.0)));
        let before = price_scale.coordinate_to_price(100.0, 1.0);

        price_scale.set_mode(PriceScaleStateChange {
            mode: Some(PriceScaleMode::Logarithmic),
            ..Default::default()
        });
        assert!(price_scale.is_log());
        price_scale.set_mode(PriceScaleStateChange {
            mode: Some(PriceScaleMode::Normal),
            ..Default::default()
        });
        let range = price_scale.price_range().expect("range");
        assert_abs_diff_eq!(range.min(), 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(range.max(), 1000.0, epsilon = 1e-9);
        assert_abs_diff_eq!(price_scale.coordinate_to_price(100.0, 1.0), before, epsilon = 1e-9);
    }

    #[test]
    fn percentage_mode_forces_auto_scale_and_notifies() {
        let mut price_scale = PriceScale::new(
            "right",
            PriceScaleOptions {
                auto_scale: false,
                ..PriceScaleOptions::default()
            },
        );
        let notified = Rc::new(Cell::new(false));
        let flag = Rc::clone(&notified);
        price_scale.mode_changed().subscribe(move |(old, new)| {
            flag.set(!old.auto_scale && new.auto_scale);
        });
        price_scale.set_mode(PriceScaleStateChange {
            mode: Some(PriceScaleMode::Percentage),
            ..Default::default()
        });
        assert!(price_scale.is_auto_scale());
        assert!(notified.get());
        assert_eq!(price_scale.format_price(110.0, 100.0), "10.00%");
    }

    #[test]
    fn invalid_margins_are_rejected() {
        let mut price_scale = PriceScale::new("right", PriceScaleOptions::default());
        let options = PriceScaleOptions {
            scale_margins: PriceScaleMargins {
                top: 0.7,
                bottom: 0.4,
            },
            ..PriceScaleOptions::default()
        };
        assert!(price_scale.apply_options(options).is_err());
        assert_eq!(price_scale.options().scale_margins, PriceScaleMargins::default());
    }

    #[test]
    fn scroll_requires_manual_scale_and_shifts_range() {
        let mut price_scale = PriceScale::new(
            "right",
            PriceScaleOptions {
                auto_scale: false,
                ..no_margins()
            },
        );
        price_scale.set_height(101.0);
        price_scale.set_price_range(Some(PriceRange::new(0.0, 100.0)));
        price_scale.start_scroll(50.0);
        price_scale.scroll_to(60.0);
        let range = price_scale.price_range().expect("range");
        assert_abs_diff_eq!(range.min(), 10.0, epsilon = 1e-9);
        price_scale.end_scroll();
    }

    #[test]
    fn marks_are_memoized_and_rebuilt_on_height_change() {
        let mut price_scale = PriceScale::new("right", no_margins());
        price_scale.set_height(300.0);
        price_scale.set_price_range(Some(PriceRange::new(0.0, 100.0)));
        let first = price_scale.marks().to_vec();
        assert!(!first.is_empty());
        assert!(first.windows(2).all(|w| w[0].coord < w[1].coord));
        assert_eq!(price_scale.marks(), first.as_slice());

        price_scale.set_height(600.0);
        let taller = price_scale.marks().to_vec();
        assert!(taller.len() >= first.len());
    }
}
