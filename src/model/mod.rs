//! Chart model: scales, panes, series and the invalidation pipeline.

pub mod animation;
pub mod chart_model;
pub mod crosshair;
pub mod data_layer;
pub mod invalidate_mask;
pub mod pane;
pub mod price_formatter;
pub mod price_scale;
pub mod price_tick_marks;
pub mod price_tick_span;
pub mod series;
pub mod tick_marks;
pub mod time_scale;

pub use animation::Animation;
pub use chart_model::{ChartModel, ChartModelOptions, CrosshairMove, InvalidateHandler};
pub use crosshair::{Crosshair, CrosshairMode, CrosshairOptions, CrosshairPosition};
pub use data_layer::{
    DataLayer, DataUpdateResponse, SeriesChanges, SeriesDataItem, SeriesUpdateInfo,
    TimeScaleChanges,
};
pub use invalidate_mask::{
    InvalidateMask, InvalidationLevel, PaneInvalidation, TimeScaleInvalidation,
    TimeScaleInvalidationType,
};
pub use pane::{LEFT_PRICE_SCALE_ID, Pane, RIGHT_PRICE_SCALE_ID};
pub use price_formatter::{PriceFormat, PriceFormatter};
pub use price_scale::{
    AutoScaleInfo, AutoScaleMargins, AutoScaleSource, PriceScale, PriceScaleMargins,
    PriceScaleMode, PriceScaleOptions, PriceScaleState, PriceScaleStateChange,
};
pub use price_tick_marks::{PriceMark, PriceTickMarkBuilder};
pub use price_tick_span::PriceTickSpanCalculator;
pub use series::{AutoscaleInfoProvider, Series, SeriesId, SeriesKind, SeriesOptions};
pub use tick_marks::{TickMark, TickMarks};
pub use time_scale::{TimeMark, TimeRange, TimeScale, TimeScaleOptions};
