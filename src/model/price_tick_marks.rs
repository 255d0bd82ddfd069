use tracing::warn;

use super::price_scale::PriceScale;
use super::price_tick_span::PriceTickSpanCalculator;

const TICK_DENSITY: f64 = 2.5;
const DEFAULT_BASE: f64 = 100.0;

/// Labelled horizontal grid/axis position.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceMark {
    pub coord: f64,
    pub logical: f64,
    pub label: String,
}

/// Pixel height reserved per price label for a given font size.
#[must_use]
pub fn tick_mark_height(font_size: f64) -> f64 {
    (font_size * TICK_DENSITY).ceil()
}

/// Walks a price scale's visible logical range in "nice" steps.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTickMarkBuilder {
    base: f64,
    calculators: [PriceTickSpanCalculator; 3],
}

impl Default for PriceTickMarkBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_BASE)
    }
}

impl PriceTickMarkBuilder {
    /// Falls back to a base of 100 when `base` cannot be split into 2s and 5s.
    #[must_use]
    pub fn new(base: f64) -> Self {
        Self::try_new(base).unwrap_or_else(|| {
            warn!(base, "unsupported tick mark base; falling back to 100");
            Self {
                base: DEFAULT_BASE,
                calculators: [
                    PriceTickSpanCalculator::decimal(2, [2.0, 2.5, 2.0]),
                    PriceTickSpanCalculator::decimal(2, [2.0, 2.0, 2.5]),
                    PriceTickSpanCalculator::decimal(2, [2.5, 2.0, 2.0]),
                ],
            }
        })
    }

    fn try_new(base: f64) -> Option<Self> {
        Some(Self {
            base,
            calculators: [
                PriceTickSpanCalculator::new(base, [2.0, 2.5, 2.0]).ok()?,
                PriceTickSpanCalculator::new(base, [2.0, 2.0, 2.5]).ok()?,
                PriceTickSpanCalculator::new(base, [2.5, 2.0, 2.0]).ok()?,
            ],
        })
    }

    #[must_use]
    pub fn base(&self) -> f64 {
        self.base
    }

    /// Smallest span over the three divider rotations.
    #[must_use]
    pub fn tick_span(&self, high: f64, low: f64, scale_height: f64, font_size: f64) -> f64 {
        let max_tick_span = (high - low) * tick_mark_height(font_size) / scale_height;
        self.calculators
            .iter()
            .map(|calculator| calculator.tick_span(high, low, max_tick_span))
            .fold(f64::INFINITY, f64::min)
    }

    pub fn rebuild_tick_marks(&self, scale: &PriceScale, first_value: f64) -> Vec<PriceMark> {
        let scale_height = scale.height();
        if scale_height <= 0.0 || scale.is_empty() {
            return Vec::new();
        }
        let font_size = scale.font_size();
        let mark_height = tick_mark_height(font_size);
        let bottom = scale.coordinate_to_logical(scale_height - 1.0, first_value);
        let top = scale.coordinate_to_logical(0.0, first_value);
        let extra_margin = if scale.options().entire_text_only {
            font_size / 2.0
        } else {
            0.0
        };
        let min_coord = extra_margin;
        let max_coord = scale_height - 1.0 - extra_margin;

        let high = bottom.max(top);
        let low = bottom.min(top);
        if high == low {
            return Vec::new();
        }

        let mut span = self.tick_span(high, low, scale_height, font_size);
        let mut marks = Vec::new();
        if !(span.is_finite() && span > 0.0) {
            return marks;
        }
        let mut modulo = high % span;
        if modulo < 0.0 {
            modulo += span;
        }

        let mut previous_coord: Option<f64> = None;
        let mut logical = high - modulo;
        while logical > low {
            let coord = scale.logical_to_coordinate(logical, first_value);
            let collides = previous_coord.is_some_and(|prev| (coord - prev).abs() < mark_height);
            if !collides && (min_coord..=max_coord).contains(&coord) {
                marks.push(PriceMark {
                    coord,
                    logical,
                    label: scale.format_logical(logical),
                });
                previous_coord = Some(coord);
                if scale.is_log() {
                    // equal logical steps are unequal price steps
                    span = self.tick_span(logical, low, scale_height, font_size);
                    if !(span.is_finite() && span > 0.0) {
                        break;
                    }
                }
            }
            let next = logical - span;
            if next == logical {
                // span is below the float step at this magnitude
                break;
            }
            logical = next;
        }

        if scale.has_visible_edge_marks() {
            add_edge_marks(scale, first_value, mark_height, &mut marks);
        }
        marks
    }
}

fn add_edge_marks(scale: &PriceScale, first_value: f64, mark_height: f64, marks: &mut Vec<PriceMark>) {
    let Some((top, bottom)) = scale.edge_coordinates() else {
        return;
    };
    for coord in [top, bottom] {
        marks.retain(|mark| (mark.coord - coord).abs() >= mark_height);
        let logical = scale.coordinate_to_logical(coord, first_value);
        marks.push(PriceMark {
            coord,
            logical,
            label: scale.format_logical(logical),
        });
    }
    marks.sort_by(|left, right| left.coord.total_cmp(&right.coord));
}
