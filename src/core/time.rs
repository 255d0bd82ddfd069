//! External time representations, the internal ordered time key, and the
//! "time weight" of each time point used to pick sparse/bold axis labels.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ChartError, ChartResult};

/// Calendar day without a time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BusinessDay {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl BusinessDay {
    #[must_use]
    pub const fn new(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }
}

/// Time as supplied by the host for one data item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeInput {
    /// Unix seconds.
    Timestamp(i64),
    BusinessDay(BusinessDay),
    /// `yyyy-mm-dd`.
    BusinessDayString(String),
}

impl From<i64> for TimeInput {
    fn from(value: i64) -> Self {
        Self::Timestamp(value)
    }
}

impl From<BusinessDay> for TimeInput {
    fn from(value: BusinessDay) -> Self {
        Self::BusinessDay(value)
    }
}

impl From<&str> for TimeInput {
    fn from(value: &str) -> Self {
        Self::BusinessDayString(value.to_owned())
    }
}

/// The exact value the host passed in, echoed back from queries.
pub type OriginalTime = TimeInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRepresentation {
    Timestamp,
    BusinessDay,
    BusinessDayString,
}

impl TimeInput {
    #[must_use]
    pub fn representation(&self) -> TimeRepresentation {
        match self {
            Self::Timestamp(_) => TimeRepresentation::Timestamp,
            Self::BusinessDay(_) => TimeRepresentation::BusinessDay,
            Self::BusinessDayString(_) => TimeRepresentation::BusinessDayString,
        }
    }
}

/// Monotonic-comparable internal time key (UTC seconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InternalTime {
    pub timestamp: i64,
}

impl InternalTime {
    #[must_use]
    pub const fn new(timestamp: i64) -> Self {
        Self { timestamp }
    }

    #[must_use]
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.timestamp, 0)
    }
}

impl fmt::Display for InternalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.timestamp)
    }
}

fn business_day_to_internal(day: BusinessDay) -> ChartResult<InternalTime> {
    let date = NaiveDate::from_ymd_opt(day.year, day.month, day.day).ok_or_else(|| {
        ChartError::InvalidData(format!(
            "invalid business day {}-{}-{}",
            day.year, day.month, day.day
        ))
    })?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| ChartError::InvalidData("invalid business day midnight".to_owned()))?;
    Ok(InternalTime::new(midnight.and_utc().timestamp()))
}

fn parse_business_day_string(value: &str) -> ChartResult<BusinessDay> {
    let malformed = || ChartError::InvalidData(format!("invalid date string `{value}`, expected yyyy-mm-dd"));
    if value.len() != 10 {
        return Err(malformed());
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| malformed())?;
    Ok(BusinessDay::new(date.year(), date.month(), date.day()))
}

pub fn convert_time(time: &TimeInput) -> ChartResult<InternalTime> {
    match time {
        TimeInput::Timestamp(seconds) => Ok(InternalTime::new(*seconds)),
        TimeInput::BusinessDay(day) => business_day_to_internal(*day),
        TimeInput::BusinessDayString(value) => {
            business_day_to_internal(parse_business_day_string(value)?)
        }
    }
}

/// Converts a whole dataset, requiring every item to use the representation
/// of the first one.
pub fn convert_times<'a, I>(times: I) -> ChartResult<Vec<InternalTime>>
where
    I: IntoIterator<Item = &'a TimeInput>,
{
    let times = times.into_iter().collect::<Vec<_>>();
    let Some(first) = times.first() else {
        return Ok(Vec::new());
    };
    let expected = first.representation();
    if let Some(position) = times.iter().position(|t| t.representation() != expected) {
        return Err(ChartError::InvalidData(format!(
            "time at position {position} uses {:?}, dataset uses {expected:?}",
            times[position].representation()
        )));
    }

    #[cfg(feature = "parallel-ingest")]
    {
        use rayon::prelude::*;
        return times.par_iter().map(|time| convert_time(time)).collect();
    }

    #[cfg(not(feature = "parallel-ingest"))]
    {
        times.iter().map(|time| convert_time(time)).collect()
    }
}

/// Granularity of the period boundary a time point starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum TickMarkWeight {
    LessThanSecond = 0,
    Second = 10,
    Minute1 = 20,
    Minute5 = 21,
    Minute30 = 22,
    Hour1 = 30,
    Hour3 = 31,
    Hour6 = 32,
    Hour12 = 33,
    #[default]
    Day = 50,
    Month = 60,
    Year = 70,
}

const INTRADAY_WEIGHT_DIVISORS: [(TickMarkWeight, i64); 8] = [
    (TickMarkWeight::Hour12, 43_200),
    (TickMarkWeight::Hour6, 21_600),
    (TickMarkWeight::Hour3, 10_800),
    (TickMarkWeight::Hour1, 3_600),
    (TickMarkWeight::Minute30, 1_800),
    (TickMarkWeight::Minute5, 300),
    (TickMarkWeight::Minute1, 60),
    (TickMarkWeight::Second, 1),
];

#[must_use]
pub fn weight_by_time(current: i64, previous: i64) -> TickMarkWeight {
    let (Some(cur), Some(prev)) = (
        DateTime::<Utc>::from_timestamp(current, 0),
        DateTime::<Utc>::from_timestamp(previous, 0),
    ) else {
        return TickMarkWeight::LessThanSecond;
    };
    if cur.year() != prev.year() {
        return TickMarkWeight::Year;
    }
    if cur.month() != prev.month() {
        return TickMarkWeight::Month;
    }
    if cur.day() != prev.day() {
        return TickMarkWeight::Day;
    }
    for (weight, divisor) in INTRADAY_WEIGHT_DIVISORS {
        if current.div_euclid(divisor) != previous.div_euclid(divisor) {
            return weight;
        }
    }
    TickMarkWeight::LessThanSecond
}

/// One slot of the shared time axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeScalePoint {
    pub time: InternalTime,
    pub time_weight: TickMarkWeight,
    pub original_time: OriginalTime,
}

impl TimeScalePoint {
    #[must_use]
    pub fn new(time: InternalTime, original_time: OriginalTime) -> Self {
        Self {
            time,
            time_weight: TickMarkWeight::default(),
            original_time,
        }
    }
}

/// Recomputes `time_weight` for `points[start_index..]` against each point's
/// predecessor. The very first point is weighed against a synthetic predecessor
/// one average step back.
pub fn fill_weights_for_points(points: &mut [TimeScalePoint], start_index: usize) {
    if points.is_empty() || start_index >= points.len() {
        return;
    }
    let mut previous = start_index
        .checked_sub(1)
        .map(|index| points[index].time.timestamp);
    let mut total_time_diff = 0_i64;
    for point in &mut points[start_index..] {
        let current = point.time.timestamp;
        if let Some(prev) = previous {
            point.time_weight = weight_by_time(current, prev);
        }
        total_time_diff += current - previous.unwrap_or(current);
        previous = Some(current);
    }

    if start_index == 0 && points.len() > 1 {
        let steps = points.len() as i64 - 1;
        let average = (total_time_diff + steps - 1).div_euclid(steps);
        let first = points[0].time.timestamp;
        points[0].time_weight = weight_by_time(first, first - average);
    }
}

/// Formats axis labels for a time point according to its weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickMarkFormatter {
    pub seconds_visible: bool,
}

impl Default for TickMarkFormatter {
    fn default() -> Self {
        Self {
            seconds_visible: true,
        }
    }
}

impl TickMarkFormatter {
    #[must_use]
    pub fn format(self, time: InternalTime, weight: TickMarkWeight) -> String {
        let Some(date) = time.to_datetime() else {
            return time.to_string();
        };
        match weight {
            TickMarkWeight::Year => date.format("%Y").to_string(),
            TickMarkWeight::Month => date.format("%b").to_string(),
            TickMarkWeight::Day => date.format("%d").to_string(),
            TickMarkWeight::Second | TickMarkWeight::LessThanSecond if self.seconds_visible => {
                format!("{:02}:{:02}:{:02}", date.hour(), date.minute(), date.second())
            }
            _ => format!("{:02}:{:02}", date.hour(), date.minute()),
        }
    }
}
