//! Embeddable chart surface: options, the chart factory and frame batching.

mod chart;
mod frame;
mod options;

pub use chart::{BarsInfo, ChartApi, DrawHandler, SCROLL_ANIMATION_DURATION_MS, create_chart};
pub use frame::{FrameScheduler, FrameToken, ManualFrameScheduler};
pub use options::{ChartOptions, LayoutOptions, LocalizationOptions};
