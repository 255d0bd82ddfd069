use std::collections::BTreeMap;

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::core::{Generation, StrictRange};

use super::price_scale::{AutoScaleSource, PriceScale, PriceScaleOptions, PriceScaleStateChange};
use super::series::{Series, SeriesId};

pub const LEFT_PRICE_SCALE_ID: &str = "left";
pub const RIGHT_PRICE_SCALE_ID: &str = "right";

type ScaleSources = SmallVec<[SeriesId; 4]>;

/// A horizontal band of the chart: its price scales plus the series drawn
/// in it, in z-order.
#[derive(Debug)]
pub struct Pane {
    height: f64,
    stretch_factor: f64,
    left_price_scale: PriceScale,
    right_price_scale: PriceScale,
    overlay_price_scales: BTreeMap<String, PriceScale>,
    overlay_options: PriceScaleOptions,
    sources: IndexMap<SeriesId, String>,
    grid_generation: Generation,
}

impl Pane {
    #[must_use]
    pub fn new(
        left_options: PriceScaleOptions,
        right_options: PriceScaleOptions,
        overlay_options: PriceScaleOptions,
    ) -> Self {
        Self {
            height: 0.0,
            stretch_factor: 1.0,
            left_price_scale: PriceScale::new(LEFT_PRICE_SCALE_ID, left_options),
            right_price_scale: PriceScale::new(RIGHT_PRICE_SCALE_ID, right_options),
            overlay_price_scales: BTreeMap::new(),
            overlay_options,
            sources: IndexMap::new(),
            grid_generation: Generation::default(),
        }
    }

    #[must_use]
    pub fn stretch_factor(&self) -> f64 {
        self.stretch_factor
    }

    pub fn set_stretch_factor(&mut self, stretch_factor: f64) {
        self.stretch_factor = stretch_factor;
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn set_height(&mut self, height: f64) {
        self.height = height;
        self.left_price_scale.set_height(height);
        self.right_price_scale.set_height(height);
        for scale in self.overlay_price_scales.values_mut() {
            scale.set_height(height);
        }
    }

    /// Bumped whenever the model invalidates; grid views compare against it.
    #[must_use]
    pub fn grid_generation(&self) -> Generation {
        self.grid_generation
    }

    pub(crate) fn invalidate_grid(&mut self) {
        self.grid_generation.bump();
    }

    #[must_use]
    pub fn left_price_scale(&self) -> &PriceScale {
        &self.left_price_scale
    }

    #[must_use]
    pub fn right_price_scale(&self) -> &PriceScale {
        &self.right_price_scale
    }

    #[must_use]
    pub fn price_scale_by_id(&self, id: &str) -> Option<&PriceScale> {
        match id {
            LEFT_PRICE_SCALE_ID => Some(&self.left_price_scale),
            RIGHT_PRICE_SCALE_ID => Some(&self.right_price_scale),
            _ => self.overlay_price_scales.get(id),
        }
    }

    pub fn price_scale_by_id_mut(&mut self, id: &str) -> Option<&mut PriceScale> {
        match id {
            LEFT_PRICE_SCALE_ID => Some(&mut self.left_price_scale),
            RIGHT_PRICE_SCALE_ID => Some(&mut self.right_price_scale),
            _ => self.overlay_price_scales.get_mut(id),
        }
    }

    /// Returns the scale with `id`, creating an overlay scale on first use.
    pub fn ensure_price_scale(&mut self, id: &str) -> &mut PriceScale {
        match id {
            LEFT_PRICE_SCALE_ID => &mut self.left_price_scale,
            RIGHT_PRICE_SCALE_ID => &mut self.right_price_scale,
            _ => {
                let height = self.height;
                let options = self.overlay_options;
                self.overlay_price_scales
                    .entry(id.to_owned())
                    .or_insert_with(|| {
                        debug!(id, "create overlay price scale");
                        let mut scale = PriceScale::new(id, options);
                        scale.set_height(height);
                        scale
                    })
            }
        }
    }

    pub fn price_scales_mut(&mut self) -> impl Iterator<Item = &mut PriceScale> {
        [&mut self.left_price_scale, &mut self.right_price_scale]
            .into_iter()
            .chain(self.overlay_price_scales.values_mut())
    }

    pub fn overlay_price_scale_ids(&self) -> impl Iterator<Item = &str> {
        self.overlay_price_scales.keys().map(String::as_str)
    }

    pub fn set_overlay_options(&mut self, options: PriceScaleOptions) {
        self.overlay_options = options;
    }

    /// Attaches `series` to the scale `scale_id`, creating it if needed.
    pub fn add_data_source(&mut self, series: SeriesId, scale_id: &str) {
        self.ensure_price_scale(scale_id).invalidate_source_range();
        self.sources.insert(series, scale_id.to_owned());
        trace!(%series, scale_id, "pane data source added");
    }

    /// Detaches `series`; an overlay scale left without sources is dropped.
    pub fn remove_data_source(&mut self, series: SeriesId) -> Option<String> {
        let scale_id = self.sources.shift_remove(&series)?;
        if let Some(scale) = self.price_scale_by_id_mut(&scale_id) {
            scale.invalidate_source_range();
        }
        if !matches!(scale_id.as_str(), LEFT_PRICE_SCALE_ID | RIGHT_PRICE_SCALE_ID)
            && !self.sources.values().any(|id| *id == scale_id)
        {
            self.overlay_price_scales.remove(&scale_id);
            debug!(id = %scale_id, "remove empty overlay price scale");
        }
        Some(scale_id)
    }

    #[must_use]
    pub fn contains_source(&self, series: SeriesId) -> bool {
        self.sources.contains_key(&series)
    }

    #[must_use]
    pub fn scale_id_of(&self, series: SeriesId) -> Option<&str> {
        self.sources.get(&series).map(String::as_str)
    }

    pub fn data_sources(&self) -> impl Iterator<Item = SeriesId> + '_ {
        self.sources.keys().copied()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    #[must_use]
    pub fn sources_for_scale(&self, scale_id: &str) -> ScaleSources {
        self.sources
            .iter()
            .filter(|(_, id)| id.as_str() == scale_id)
            .map(|(series, _)| *series)
            .collect()
    }

    /// Right scale if it is visible and used, then left, then the scale of
    /// the first source; right otherwise.
    #[must_use]
    pub fn default_visible_price_scale(&self) -> &str {
        let used = |id: &str| self.sources.values().any(|scale_id| scale_id == id);
        if self.right_price_scale.options().visible && used(RIGHT_PRICE_SCALE_ID) {
            RIGHT_PRICE_SCALE_ID
        } else if self.left_price_scale.options().visible && used(LEFT_PRICE_SCALE_ID) {
            LEFT_PRICE_SCALE_ID
        } else {
            self.sources
                .values()
                .next()
                .map_or(RIGHT_PRICE_SCALE_ID, String::as_str)
        }
    }

    /// Marks every auto-scaled scale with sources for recalculation against
    /// `visible_bars`, then brings all scales up to date.
    pub fn recalculate(
        &mut self,
        visible_bars: Option<StrictRange>,
        series: &IndexMap<SeriesId, Series>,
    ) {
        let scale_ids = self.scale_ids();
        for scale_id in &scale_ids {
            self.recalculate_price_scale(scale_id, visible_bars, series);
        }
    }

    /// Recalculation of one scale; manual scales keep their range.
    pub fn recalculate_price_scale(
        &mut self,
        scale_id: &str,
        visible_bars: Option<StrictRange>,
        series: &IndexMap<SeriesId, Series>,
    ) {
        let has_sources = self.sources.values().any(|id| id == scale_id);
        if let Some(scale) = self.price_scale_by_id_mut(scale_id)
            && scale.is_auto_scale()
            && has_sources
            && let Some(visible_bars) = visible_bars
        {
            scale.recalculate_price_range(visible_bars);
        }
        self.make_sure_scale_valid(scale_id, series);
    }

    /// One-off fit of every scale with sources, whether auto-scaled or not.
    pub fn momentary_auto_scale(
        &mut self,
        visible_bars: Option<StrictRange>,
        series: &IndexMap<SeriesId, Series>,
    ) {
        let Some(visible_bars) = visible_bars else {
            return;
        };
        for scale_id in self.scale_ids() {
            let has_sources = self.sources.values().any(|id| *id == scale_id);
            if has_sources && let Some(scale) = self.price_scale_by_id_mut(&scale_id) {
                scale.recalculate_price_range(visible_bars);
            }
            self.make_sure_scale_valid(&scale_id, series);
        }
    }

    /// Recomputes any scale whose range was invalidated since the last read.
    pub fn make_sure_valid(&mut self, series: &IndexMap<SeriesId, Series>) {
        for scale_id in self.scale_ids() {
            self.make_sure_scale_valid(&scale_id, series);
        }
    }

    /// Turns auto-scale back on for `scale_id` and recalculates it.
    pub fn reset_price_scale(
        &mut self,
        scale_id: &str,
        visible_bars: Option<StrictRange>,
        series: &IndexMap<SeriesId, Series>,
    ) {
        let Some(scale) = self.price_scale_by_id_mut(scale_id) else {
            return;
        };
        scale.set_mode(PriceScaleStateChange {
            auto_scale: Some(true),
            ..PriceScaleStateChange::default()
        });
        scale.set_custom_price_range(None);
        self.recalculate_price_scale(scale_id, visible_bars, series);
    }

    fn make_sure_scale_valid(&mut self, scale_id: &str, series: &IndexMap<SeriesId, Series>) {
        let source_ids = self.sources_for_scale(scale_id);
        let sources = source_ids
            .iter()
            .filter_map(|id| series.get(id))
            .collect::<SmallVec<[&Series; 4]>>();
        let Some(scale) = self.price_scale_by_id_mut(scale_id) else {
            return;
        };
        if let Some(first) = sources.first() {
            scale.set_price_format(first.options().price_format);
        }
        if !scale.needs_recalculation() {
            return;
        }
        let sources = sources
            .iter()
            .map(|series| *series as &dyn AutoScaleSource)
            .collect::<SmallVec<[&dyn AutoScaleSource; 4]>>();
        scale.make_sure_valid(&sources);
    }

    fn scale_ids(&self) -> SmallVec<[String; 4]> {
        [LEFT_PRICE_SCALE_ID.to_owned(), RIGHT_PRICE_SCALE_ID.to_owned()]
            .into_iter()
            .chain(self.overlay_price_scales.keys().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::{LEFT_PRICE_SCALE_ID, Pane, RIGHT_PRICE_SCALE_ID};
    use crate::core::{InternalTime, PlotRow, PriceRange, StrictRange, TimeInput};
    use crate::model::price_scale::{PriceScaleMargins, PriceScaleOptions};
    use crate::model::series::{Series, SeriesId, SeriesKind, SeriesOptions};

    fn pane() -> Pane {
        let options = PriceScaleOptions {
            scale_margins: PriceScaleMargins {
                top: 0.0,
                bottom: 0.0,
            },
            ..PriceScaleOptions::default()
        };
        Pane::new(options, options, options)
    }

    fn line(id: u64, scale: &str, closes: &[f64]) -> Series {
        let mut series = Series::new(
            SeriesId::new(id),
            SeriesKind::Line,
            SeriesOptions::default().with_price_scale_id(scale),
        )
        .expect("series");
        let rows = closes
            .iter()
            .enumerate()
            .map(|(index, close)| PlotRow {
                index: index as i64,
                time: InternalTime::new(index as i64),
                value: [*close; 4],
                color: None,
                original_time: TimeInput::Timestamp(index as i64),
                custom_values: None,
            })
            .collect();
        series.set_rows(rows).expect("rows");
        series
    }

    #[test]
    fn pane_creates_left_right_price_scales() {
        let pane = pane();
        assert_eq!(pane.left_price_scale().id(), LEFT_PRICE_SCALE_ID);
        assert_eq!(pane.right_price_scale().id(), RIGHT_PRICE_SCALE_ID);
        assert!(pane.price_scale_by_id("volume").is_none());
    }

    #[test]
    fn overlay_scale_lives_as_long_as_its_sources() {
        let mut pane = pane();
        pane.set_height(200.0);
        pane.add_data_source(SeriesId::new(1), "volume");
        let overlay = pane.price_scale_by_id("volume").expect("overlay");
        assert_eq!(overlay.height(), 200.0);
        assert_eq!(pane.remove_data_source(SeriesId::new(1)).as_deref(), Some("volume"));
        assert!(pane.price_scale_by_id("volume").is_none());
    }

    #[test]
    fn recalculate_merges_sources_of_each_scale() {
        let mut pane = pane();
        pane.set_height(300.0);
        let mut registry = IndexMap::new();
        for series in [
            line(1, RIGHT_PRICE_SCALE_ID, &[10.0, 20.0]),
            line(2, RIGHT_PRICE_SCALE_ID, &[5.0, 15.0]),
            line(3, LEFT_PRICE_SCALE_ID, &[100.0, 200.0]),
        ] {
            pane.add_data_source(series.id(), series.price_scale_id());
            registry.insert(series.id(), series);
        }
        pane.recalculate(Some(StrictRange::new(0, 1)), &registry);
        assert_eq!(pane.right_price_scale().price_range(), Some(PriceRange::new(5.0, 20.0)));
        assert_eq!(pane.left_price_scale().price_range(), Some(PriceRange::new(100.0, 200.0)));
        assert_eq!(pane.sources_for_scale(RIGHT_PRICE_SCALE_ID).len(), 2);
    }

    #[test]
    fn default_visible_scale_prefers_used_right_scale() {
        let mut pane = pane();
        assert_eq!(pane.default_visible_price_scale(), RIGHT_PRICE_SCALE_ID);
        pane.add_data_source(SeriesId::new(7), LEFT_PRICE_SCALE_ID);
        assert_eq!(pane.default_visible_price_scale(), LEFT_PRICE_SCALE_ID);
        pane.add_data_source(SeriesId::new(8), RIGHT_PRICE_SCALE_ID);
        assert_eq!(pane.default_visible_price_scale(), RIGHT_PRICE_SCALE_ID);
    }
}
