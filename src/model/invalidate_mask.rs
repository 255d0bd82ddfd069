use std::collections::BTreeMap;

use crate::core::LogicalRange;

use super::Animation;

/// How much of the chart a frame has to redraw. Levels are ordered so that
/// combining two requests keeps the larger one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum InvalidationLevel {
    #[default]
    None = 0,
    /// Crosshair and pointer overlays only.
    Cursor = 1,
    /// Series and scales changed, layout did not.
    Light = 2,
    /// Sizes or pane structure changed.
    Full = 3,
}

/// Redraw request for one pane. `auto_scale` asks the draw step for a one-off
/// fit of the pane's price scales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaneInvalidation {
    pub level: InvalidationLevel,
    pub auto_scale: bool,
}

impl PaneInvalidation {
    #[must_use]
    pub fn new(level: InvalidationLevel, auto_scale: bool) -> Self {
        Self { level, auto_scale }
    }

    #[must_use]
    fn combine(self, other: Self) -> Self {
        Self {
            level: self.level.max(other.level),
            auto_scale: self.auto_scale || other.auto_scale,
        }
    }
}

/// Payload-free tag of a [`TimeScaleInvalidation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeScaleInvalidationType {
    FitContent,
    ApplyRange,
    ApplyBarSpacing,
    ApplyRightOffset,
    Reset,
    Animation,
    StopAnimation,
}

/// Time-scale command replayed by the draw step in queue order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeScaleInvalidation {
    FitContent,
    ApplyRange(LogicalRange),
    ApplyBarSpacing(f64),
    ApplyRightOffset(f64),
    Reset,
    Animation(Animation),
    StopAnimation,
}

impl TimeScaleInvalidation {
    #[must_use]
    pub fn kind(self) -> TimeScaleInvalidationType {
        match self {
            Self::FitContent => TimeScaleInvalidationType::FitContent,
            Self::ApplyRange(_) => TimeScaleInvalidationType::ApplyRange,
            Self::ApplyBarSpacing(_) => TimeScaleInvalidationType::ApplyBarSpacing,
            Self::ApplyRightOffset(_) => TimeScaleInvalidationType::ApplyRightOffset,
            Self::Reset => TimeScaleInvalidationType::Reset,
            Self::Animation(_) => TimeScaleInvalidationType::Animation,
            Self::StopAnimation => TimeScaleInvalidationType::StopAnimation,
        }
    }

    /// Commands that fully determine the visible range; anything queued
    /// before them is moot.
    fn discards_earlier(self) -> bool {
        matches!(self, Self::FitContent | Self::ApplyRange(_) | Self::Reset)
    }
}

/// Ordered time-scale commands with at most one live animation and at most
/// one stop marker.
#[derive(Debug, Clone, PartialEq, Default)]
struct TimeScaleQueue(Vec<TimeScaleInvalidation>);

impl TimeScaleQueue {
    fn push(&mut self, command: TimeScaleInvalidation) {
        self.0
            .retain(|queued| !matches!(queued, TimeScaleInvalidation::Animation(_)));
        match command {
            TimeScaleInvalidation::Animation(_) => self.0.push(command),
            TimeScaleInvalidation::StopAnimation => self.push_stop(),
            _ if command.discards_earlier() => self.0 = vec![command],
            _ => {
                self.push_stop();
                self.0.push(command);
            }
        }
    }

    fn push_stop(&mut self) {
        self.0
            .retain(|queued| !matches!(queued, TimeScaleInvalidation::StopAnimation));
        self.0.push(TimeScaleInvalidation::StopAnimation);
    }

    fn animation(&self) -> Option<Animation> {
        self.0.iter().find_map(|command| match command {
            TimeScaleInvalidation::Animation(animation) => Some(*animation),
            _ => None,
        })
    }
}

/// Everything the next frame has to redraw and apply. Masks merge: levels
/// take the maximum, pane entries combine, time-scale commands are pushed
/// through the same queue rules they were recorded with.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InvalidateMask {
    level: InvalidationLevel,
    panes: BTreeMap<usize, PaneInvalidation>,
    time_scale: TimeScaleQueue,
}

impl InvalidateMask {
    #[must_use]
    pub fn new(level: InvalidationLevel) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn full() -> Self {
        Self::new(InvalidationLevel::Full)
    }

    #[must_use]
    pub fn light() -> Self {
        Self::new(InvalidationLevel::Light)
    }

    #[must_use]
    pub fn cursor() -> Self {
        Self::new(InvalidationLevel::Cursor)
    }

    /// This mask with `command` queued.
    #[must_use]
    pub fn with_time_scale(mut self, command: TimeScaleInvalidation) -> Self {
        self.push_time_scale(command);
        self
    }

    #[must_use]
    pub fn full_invalidation(&self) -> InvalidationLevel {
        self.level
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.level == InvalidationLevel::None
            && self.panes.is_empty()
            && self.time_scale.0.is_empty()
    }

    pub fn invalidate_pane(&mut self, pane_index: usize, invalidation: PaneInvalidation) {
        let entry = self.panes.entry(pane_index).or_default();
        *entry = entry.combine(invalidation);
    }

    /// A pane's own entry raised to the mask level.
    #[must_use]
    pub fn invalidation_for_pane(&self, pane_index: usize) -> PaneInvalidation {
        let own = self.panes.get(&pane_index).copied().unwrap_or_default();
        PaneInvalidation::new(own.level.max(self.level), own.auto_scale)
    }

    /// Queues a time-scale command. Every command except an animation stops
    /// the live animation; fit, range and reset drop the whole queue.
    pub fn push_time_scale(&mut self, command: TimeScaleInvalidation) {
        self.time_scale.push(command);
    }

    #[must_use]
    pub fn time_scale_invalidations(&self) -> &[TimeScaleInvalidation] {
        &self.time_scale.0
    }

    #[must_use]
    pub fn time_scale_animation(&self) -> Option<Animation> {
        self.time_scale.animation()
    }

    pub fn merge(&mut self, other: &InvalidateMask) {
        for command in &other.time_scale.0 {
            self.time_scale.push(*command);
        }
        self.level = self.level.max(other.level);
        for (pane_index, invalidation) in &other.panes {
            self.invalidate_pane(*pane_index, *invalidation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Animation, InvalidateMask, InvalidationLevel, LogicalRange, PaneInvalidation,
        TimeScaleInvalidation, TimeScaleInvalidationType,
    };

    fn kinds(mask: &InvalidateMask) -> Vec<TimeScaleInvalidationType> {
        mask.time_scale_invalidations()
            .iter()
            .map(|command| command.kind())
            .collect()
    }

    #[test]
    fn pane_entries_are_raised_to_the_mask_level() {
        let mut mask = InvalidateMask::cursor();
        mask.invalidate_pane(2, PaneInvalidation::new(InvalidationLevel::Light, true));
        let mut resize = InvalidateMask::full();
        resize.invalidate_pane(0, PaneInvalidation::new(InvalidationLevel::Cursor, false));
        mask.merge(&resize);

        assert_eq!(
            mask.invalidation_for_pane(2),
            PaneInvalidation::new(InvalidationLevel::Full, true)
        );
        assert_eq!(
            mask.invalidation_for_pane(0),
            PaneInvalidation::new(InvalidationLevel::Full, false)
        );
        assert!(!mask.invalidation_for_pane(7).auto_scale);
        assert!(InvalidateMask::default().is_empty());
        assert!(!InvalidateMask::cursor().is_empty());
    }

    #[test]
    fn range_commands_drop_the_queue() {
        let range = LogicalRange::new(10.0, 20.0);
        let mask = InvalidateMask::light()
            .with_time_scale(TimeScaleInvalidation::ApplyBarSpacing(8.0))
            .with_time_scale(TimeScaleInvalidation::ApplyRange(range));
        assert_eq!(
            mask.time_scale_invalidations(),
            &[TimeScaleInvalidation::ApplyRange(range)]
        );
        let mask = mask
            .with_time_scale(TimeScaleInvalidation::ApplyRightOffset(2.0))
            .with_time_scale(TimeScaleInvalidation::Reset);
        assert_eq!(kinds(&mask), vec![TimeScaleInvalidationType::Reset]);
    }

    #[test]
    fn setters_share_one_trailing_stop() {
        let mask = InvalidateMask::light()
            .with_time_scale(TimeScaleInvalidation::ApplyBarSpacing(8.0))
            .with_time_scale(TimeScaleInvalidation::ApplyRightOffset(2.0));
        assert_eq!(
            kinds(&mask),
            vec![
                TimeScaleInvalidationType::ApplyBarSpacing,
                TimeScaleInvalidationType::StopAnimation,
                TimeScaleInvalidationType::ApplyRightOffset,
            ]
        );
    }

    #[test]
    fn animation_is_replaced_then_stopped() {
        let first = Animation::start(0.0, 5.0, 0.0, 100.0).expect("first");
        let second = Animation::start(5.0, 10.0, 10.0, 100.0).expect("second");
        let mut mask = InvalidateMask::light()
            .with_time_scale(TimeScaleInvalidation::Animation(first))
            .with_time_scale(TimeScaleInvalidation::Animation(second));
        assert_eq!(
            mask.time_scale_invalidations(),
            &[TimeScaleInvalidation::Animation(second)]
        );

        mask.push_time_scale(TimeScaleInvalidation::StopAnimation);
        mask.push_time_scale(TimeScaleInvalidation::StopAnimation);
        assert_eq!(kinds(&mask), vec![TimeScaleInvalidationType::StopAnimation]);
        assert!(mask.time_scale_animation().is_none());
    }

    #[test]
    fn merged_setter_cancels_the_receiving_animation() {
        let animation = Animation::start(0.0, 5.0, 0.0, 100.0).expect("animation");
        let mut mask =
            InvalidateMask::cursor().with_time_scale(TimeScaleInvalidation::Animation(animation));
        let offset = InvalidateMask::light()
            .with_time_scale(TimeScaleInvalidation::ApplyRightOffset(3.0));
        mask.merge(&offset);

        assert!(mask.time_scale_animation().is_none());
        assert_eq!(mask.full_invalidation(), InvalidationLevel::Light);
        assert_eq!(
            kinds(&mask),
            vec![
                TimeScaleInvalidationType::StopAnimation,
                TimeScaleInvalidationType::ApplyRightOffset,
            ]
        );
    }

    #[test]
    fn merged_animation_outlives_earlier_setters() {
        let animation = Animation::start(0.0, 5.0, 0.0, 100.0).expect("animation");
        let mut mask =
            InvalidateMask::light().with_time_scale(TimeScaleInvalidation::ApplyBarSpacing(8.0));
        mask.merge(
            &InvalidateMask::light().with_time_scale(TimeScaleInvalidation::Animation(animation)),
        );
        assert_eq!(mask.time_scale_animation(), Some(animation));
        assert_eq!(
            mask.time_scale_invalidations().last(),
            Some(&TimeScaleInvalidation::Animation(animation))
        );
    }
}
