pub mod delegate;
pub mod memo;
pub mod plot_list;
pub mod price_range;
pub mod price_transform;
pub mod range;
pub mod time;

pub use delegate::{Delegate, SubscriptionId};
pub use memo::{Generation, Memo};
pub use plot_list::{MinMax, MismatchDirection, PlotList, PlotRow, PlotRowValueIndex};
pub use price_range::PriceRange;
pub use price_transform::LogFormula;
pub use range::{LogicalRange, StrictRange, TimePointIndex};
pub use time::{
    BusinessDay, InternalTime, OriginalTime, TickMarkFormatter, TickMarkWeight, TimeInput,
    TimeRepresentation, TimeScalePoint, convert_time, convert_times, fill_weights_for_points,
};
