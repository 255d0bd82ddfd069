//! chart-scales: coordinate, scale and incremental-update engine for
//! financial time-series charts.
//!
//! The crate owns no drawing surface. A host feeds data and decoded gestures
//! through [`ChartApi`], answers frame requests from its [`FrameScheduler`]
//! and renders from the [`model::ChartModel`] handed to its draw handler.

pub mod api;
pub mod core;
pub mod error;
pub mod model;
pub mod telemetry;

pub use api::{
    BarsInfo, ChartApi, ChartOptions, FrameScheduler, FrameToken, ManualFrameScheduler,
    create_chart,
};
pub use error::{ChartError, ChartResult};
pub use model::{SeriesDataItem, SeriesId, SeriesKind, SeriesOptions};
