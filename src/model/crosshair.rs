use serde::{Deserialize, Serialize};

use crate::core::TimePointIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CrosshairMode {
    #[default]
    Normal,
    /// Price snaps to the nearest series value at the hovered bar.
    Magnet,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrosshairOptions {
    pub mode: CrosshairMode,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrosshairPosition {
    pub index: TimePointIndex,
    pub price: f64,
    pub pane_index: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Crosshair {
    options: CrosshairOptions,
    position: Option<CrosshairPosition>,
    origin: Option<(f64, f64)>,
}

impl Crosshair {
    #[must_use]
    pub fn new(options: CrosshairOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn options(&self) -> CrosshairOptions {
        self.options
    }

    pub fn apply_options(&mut self, options: CrosshairOptions) {
        self.options = options;
    }

    pub fn set_position(&mut self, index: TimePointIndex, price: f64, pane_index: usize) {
        self.position = Some(CrosshairPosition {
            index,
            price,
            pane_index,
        });
    }

    /// Pointer coordinates the position was derived from.
    pub fn save_origin(&mut self, x: f64, y: f64) {
        self.origin = Some((x, y));
    }

    pub fn clear_position(&mut self) {
        self.position = None;
        self.origin = None;
    }

    #[must_use]
    pub fn position(&self) -> Option<CrosshairPosition> {
        self.position
    }

    #[must_use]
    pub fn origin_coordinates(&self) -> Option<(f64, f64)> {
        self.origin
    }

    #[must_use]
    pub fn visible(&self) -> bool {
        self.position.is_some() && self.options.mode != CrosshairMode::Hidden
    }

    /// In magnet mode returns the candidate `(price, coordinate)` whose
    /// coordinate is closest to `y`; otherwise `price` unchanged.
    #[must_use]
    pub fn align_price(
        &self,
        price: f64,
        y: f64,
        candidates: impl IntoIterator<Item = (f64, f64)>,
    ) -> f64 {
        if self.options.mode != CrosshairMode::Magnet {
            return price;
        }
        candidates
            .into_iter()
            .min_by(|(_, left), (_, right)| (left - y).abs().total_cmp(&(right - y).abs()))
            .map_or(price, |(snapped, _)| snapped)
    }
}
