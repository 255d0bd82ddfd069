use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{MismatchDirection, PlotList, PlotRow, PlotRowValueIndex, PriceRange, StrictRange};
use crate::error::ChartResult;

use super::price_formatter::PriceFormat;
use super::price_scale::{AutoScaleInfo, AutoScaleSource};

/// Registry key of a series inside one chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeriesId(u64);

impl SeriesId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "series#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeriesKind {
    Bar,
    Candlestick,
    Area,
    Baseline,
    Line,
    Histogram,
    Custom,
}

/// Per-kind behaviour consulted instead of subclassing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesKindBehavior {
    pub autoscale_columns: &'static [PlotRowValueIndex],
    /// Data items must carry open/high/low/close.
    pub requires_ohlc: bool,
    pub draws_base_line: bool,
    /// The series base value is folded into its autoscale range.
    pub includes_base_in_autoscale: bool,
}

const OHLC_COLUMNS: &[PlotRowValueIndex] = &[PlotRowValueIndex::High, PlotRowValueIndex::Low];
const CLOSE_COLUMN: &[PlotRowValueIndex] = &[PlotRowValueIndex::Close];

const OHLC_BEHAVIOR: SeriesKindBehavior = SeriesKindBehavior {
    autoscale_columns: OHLC_COLUMNS,
    requires_ohlc: true,
    draws_base_line: false,
    includes_base_in_autoscale: false,
};

const LINE_BEHAVIOR: SeriesKindBehavior = SeriesKindBehavior {
    autoscale_columns: CLOSE_COLUMN,
    requires_ohlc: false,
    draws_base_line: false,
    includes_base_in_autoscale: false,
};

const BASELINE_BEHAVIOR: SeriesKindBehavior = SeriesKindBehavior {
    autoscale_columns: CLOSE_COLUMN,
    requires_ohlc: false,
    draws_base_line: true,
    includes_base_in_autoscale: false,
};

const HISTOGRAM_BEHAVIOR: SeriesKindBehavior = SeriesKindBehavior {
    autoscale_columns: CLOSE_COLUMN,
    requires_ohlc: false,
    draws_base_line: true,
    includes_base_in_autoscale: true,
};

impl SeriesKind {
    #[must_use]
    pub fn behavior(self) -> &'static SeriesKindBehavior {
        match self {
            Self::Bar | Self::Candlestick => &OHLC_BEHAVIOR,
            Self::Area | Self::Line | Self::Custom => &LINE_BEHAVIOR,
            Self::Baseline => &BASELINE_BEHAVIOR,
            Self::Histogram => &HISTOGRAM_BEHAVIOR,
        }
    }
}

/// Overrides or extends the range computed from the visible bars.
#[derive(Clone)]
pub struct AutoscaleInfoProvider(Rc<dyn Fn(Option<AutoScaleInfo>) -> Option<AutoScaleInfo>>);

impl AutoscaleInfoProvider {
    pub fn new(provider: impl Fn(Option<AutoScaleInfo>) -> Option<AutoScaleInfo> + 'static) -> Self {
        Self(Rc::new(provider))
    }

    fn call(&self, base: Option<AutoScaleInfo>) -> Option<AutoScaleInfo> {
        (self.0)(base)
    }
}

impl fmt::Debug for AutoscaleInfoProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AutoscaleInfoProvider(..)")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesOptions {
    pub price_scale_id: String,
    pub visible: bool,
    pub base_line_visible: bool,
    /// Reference value of histogram/baseline series.
    pub base: f64,
    pub price_format: PriceFormat,
    #[serde(skip)]
    pub autoscale_info_provider: Option<AutoscaleInfoProvider>,
}

impl Default for SeriesOptions {
    fn default() -> Self {
        Self {
            price_scale_id: super::pane::RIGHT_PRICE_SCALE_ID.to_owned(),
            visible: true,
            base_line_visible: true,
            base: 0.0,
            price_format: PriceFormat::default(),
            autoscale_info_provider: None,
        }
    }
}

impl SeriesOptions {
    pub fn validate(&self) -> ChartResult<()> {
        self.price_format.validate()
    }

    #[must_use]
    pub fn with_price_scale_id(mut self, id: impl Into<String>) -> Self {
        self.price_scale_id = id.into();
        self
    }

    #[must_use]
    pub fn with_price_format(mut self, price_format: PriceFormat) -> Self {
        self.price_format = price_format;
        self
    }

    #[must_use]
    pub fn with_autoscale_info_provider(mut self, provider: AutoscaleInfoProvider) -> Self {
        self.autoscale_info_provider = Some(provider);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Series {
    id: SeriesId,
    kind: SeriesKind,
    options: SeriesOptions,
    plot_list: PlotList,
}

impl Series {
    pub fn new(id: SeriesId, kind: SeriesKind, options: SeriesOptions) -> ChartResult<Self> {
        options.validate()?;
        Ok(Self {
            id,
            kind,
            options,
            plot_list: PlotList::new(),
        })
    }

    #[must_use]
    pub fn id(&self) -> SeriesId {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> SeriesKind {
        self.kind
    }

    #[must_use]
    pub fn options(&self) -> &SeriesOptions {
        &self.options
    }

    pub fn apply_options(&mut self, options: SeriesOptions) -> ChartResult<()> {
        options.validate()?;
        debug!(series = %self.id, "apply series options");
        self.options = options;
        Ok(())
    }

    #[must_use]
    pub fn price_scale_id(&self) -> &str {
        &self.options.price_scale_id
    }

    pub(crate) fn set_price_scale_id(&mut self, id: &str) {
        id.clone_into(&mut self.options.price_scale_id);
    }

    #[must_use]
    pub fn plot_list(&self) -> &PlotList {
        &self.plot_list
    }

    pub fn set_rows(&mut self, rows: Vec<PlotRow>) -> ChartResult<()> {
        self.plot_list.set_data(rows)
    }

    /// Realtime path: replaces the last row or appends a newer one.
    pub fn update_last_row(&mut self, row: PlotRow) -> ChartResult<()> {
        self.plot_list.update_last(row)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plot_list.is_empty()
    }

    /// Close of the first bar at or after the left edge of `visible_bars`.
    #[must_use]
    pub fn first_value(&self, visible_bars: StrictRange) -> Option<f64> {
        self.plot_list
            .search(visible_bars.left(), MismatchDirection::NearestRight)
            .map(PlotRow::close)
    }

    #[must_use]
    pub fn autoscale_info(&self, visible_bars: StrictRange) -> Option<AutoScaleInfo> {
        let behavior = self.kind.behavior();
        let mut range = self
            .plot_list
            .min_max_on_range_cached(
                visible_bars.left(),
                visible_bars.right(),
                behavior.autoscale_columns,
            )
            .map(|min_max| PriceRange::new(min_max.min, min_max.max));
        if behavior.includes_base_in_autoscale {
            let base = PriceRange::new(self.options.base, self.options.base);
            range = Some(range.map_or(base, |r| r.merge(base)));
        }
        let base_info = range.map(|price_range| AutoScaleInfo {
            price_range: Some(price_range),
            margins: None,
        });
        match &self.options.autoscale_info_provider {
            Some(provider) => provider.call(base_info),
            None => base_info,
        }
    }
}

impl AutoScaleSource for Series {
    fn visible(&self) -> bool {
        self.options.visible
    }

    fn first_value(&self, visible_bars: StrictRange) -> Option<f64> {
        Series::first_value(self, visible_bars)
    }

    fn autoscale_info(&self, visible_bars: StrictRange) -> Option<AutoScaleInfo> {
        Series::autoscale_info(self, visible_bars)
    }
}
