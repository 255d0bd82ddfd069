use approx::{assert_abs_diff_eq, assert_relative_eq};
use chart_scales::core::price_transform::{from_log, to_log};
use chart_scales::core::{
    InternalTime, LogFormula, PriceRange, TimeInput, TimeScalePoint, fill_weights_for_points,
};
use chart_scales::model::{
    InvalidateMask, InvalidationLevel, PaneInvalidation, PriceScale, PriceScaleMargins,
    PriceScaleMode, PriceScaleOptions, PriceScaleStateChange, TimeScale, TimeScaleOptions,
};
use proptest::prelude::*;

fn time_scale(count: usize, width: f64, bar_spacing: f64) -> TimeScale {
    let mut points = (0..count)
        .map(|i| {
            let timestamp = 1_000_000 + i as i64 * 300;
            TimeScalePoint::new(InternalTime::new(timestamp), TimeInput::Timestamp(timestamp))
        })
        .collect::<Vec<_>>();
    fill_weights_for_points(&mut points, 0);
    let mut scale = TimeScale::new(TimeScaleOptions {
        bar_spacing,
        ..TimeScaleOptions::default()
    });
    scale.set_width(width).expect("width");
    scale.update(&points, 0);
    scale
        .set_base_index(Some(count as i64 - 1))
        .expect("base index");
    scale
}

fn price_scale(mode: PriceScaleMode, range: PriceRange, height: f64) -> PriceScale {
    let mut scale = PriceScale::new(
        "right",
        PriceScaleOptions {
            scale_margins: PriceScaleMargins {
                top: 0.1,
                bottom: 0.1,
            },
            ..PriceScaleOptions::default()
        },
    );
    scale.set_height(height);
    scale.set_price_range(Some(range));
    if mode != PriceScaleMode::Normal {
        scale.set_mode(PriceScaleStateChange {
            mode: Some(mode),
            ..PriceScaleStateChange::default()
        });
    }
    scale
}

fn level() -> impl Strategy<Value = InvalidationLevel> {
    prop_oneof![
        Just(InvalidationLevel::None),
        Just(InvalidationLevel::Cursor),
        Just(InvalidationLevel::Light),
        Just(InvalidationLevel::Full),
    ]
}

fn mask() -> impl Strategy<Value = InvalidateMask> {
    (
        level(),
        prop::collection::vec((0usize..4, level(), any::<bool>()), 0..6),
    )
        .prop_map(|(global, panes)| {
            let mut mask = InvalidateMask::new(global);
            for (pane_index, level, auto_scale) in panes {
                mask.invalidate_pane(pane_index, PaneInvalidation { level, auto_scale });
            }
            mask
        })
}

fn merged(left: &InvalidateMask, right: &InvalidateMask) -> InvalidateMask {
    let mut mask = left.clone();
    mask.merge(right);
    mask
}

fn finite_range() -> impl Strategy<Value = PriceRange> {
    (-1.0e6..1.0e6f64, 0.0..1.0e6f64).prop_map(|(min, length)| PriceRange::new(min, min + length))
}

proptest! {
    #[test]
    fn index_coordinate_round_trip(
        count in 2usize..300,
        width in 100.0..2_000.0f64,
        spacing in 0.5..50.0f64,
        pick in 0.0..1.0f64,
    ) {
        let scale = time_scale(count, width, spacing);
        let index = (pick * (count - 1) as f64).round() as i64;
        prop_assert_eq!(scale.coordinate_to_index(scale.index_to_coordinate(index)), index);
    }

    #[test]
    fn coordinates_grow_with_index(
        count in 3usize..300,
        width in 100.0..2_000.0f64,
        spacing in 0.5..50.0f64,
    ) {
        let scale = time_scale(count, width, spacing);
        let coords = (0..count as i64).map(|i| scale.index_to_coordinate(i)).collect::<Vec<_>>();
        prop_assert!(coords.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn spacing_and_offset_stay_clamped(
        count in 2usize..300,
        width in 300.0..2_000.0f64,
        spacings in prop::collection::vec(0.01..5_000.0f64, 1..6),
        offsets in prop::collection::vec(-1_000.0..1_000.0f64, 1..6),
    ) {
        let mut scale = time_scale(count, width, 6.0);
        for (spacing, offset) in spacings.iter().zip(&offsets) {
            scale.set_bar_spacing(*spacing).expect("spacing");
            scale.set_right_offset(*offset).expect("offset");
            prop_assert!(scale.bar_spacing() >= scale.min_bar_spacing() - 1e-9);
            prop_assert!(scale.bar_spacing() <= scale.max_bar_spacing() + 1e-9);
            let min = scale.min_right_offset().expect("data present");
            prop_assert!(scale.right_offset() >= min - 1e-9);
            prop_assert!(scale.right_offset() <= scale.max_right_offset() + 1e-9);
        }
    }

    #[test]
    fn log_transform_inverts(price in 0.01..1.0e6f64) {
        let formula = LogFormula::default();
        assert_relative_eq!(from_log(to_log(price, formula), formula), price, max_relative = 1e-9);
        assert_relative_eq!(
            from_log(to_log(-price, formula), formula),
            -price,
            max_relative = 1e-9
        );
    }

    #[test]
    fn range_merge_is_commutative_and_associative(
        a in finite_range(),
        b in finite_range(),
        c in finite_range(),
    ) {
        prop_assert_eq!(a.merge(b), b.merge(a));
        prop_assert_eq!(a.merge(b).merge(c), a.merge(b.merge(c)));
        prop_assert_eq!(PriceRange::merge_opt(Some(a), None), Some(a));
        prop_assert_eq!(a.merge(a), a);
    }

    #[test]
    fn mask_merge_levels_are_order_independent(a in mask(), b in mask()) {
        let ab = merged(&a, &b);
        let ba = merged(&b, &a);
        prop_assert_eq!(ab.full_invalidation(), ba.full_invalidation());
        prop_assert_eq!(
            ab.full_invalidation(),
            a.full_invalidation().max(b.full_invalidation())
        );
        for pane_index in 0..4 {
            prop_assert_eq!(
                ab.invalidation_for_pane(pane_index),
                ba.invalidation_for_pane(pane_index)
            );
            prop_assert!(
                ab.invalidation_for_pane(pane_index).level
                    >= a.invalidation_for_pane(pane_index).level
            );
        }
    }

    #[test]
    fn normal_price_round_trip(
        range in finite_range().prop_filter("non-empty", |range| range.length() > 1e-3),
        height in 50.0..2_000.0f64,
        pick in 0.0..1.0f64,
    ) {
        let scale = price_scale(PriceScaleMode::Normal, range, height);
        let price = range.min() + pick * range.length();
        let y = scale.price_to_coordinate(price, range.min());
        assert_abs_diff_eq!(
            scale.coordinate_to_price(y, range.min()),
            price,
            epsilon = 1e-6 * range.length().max(1.0)
        );
    }

    #[test]
    fn log_price_round_trip(
        low in 0.1..1_000.0f64,
        factor in 2.0..1_000.0f64,
        height in 50.0..2_000.0f64,
        pick in 0.0..1.0f64,
    ) {
        let range = PriceRange::new(low, low * factor);
        let scale = price_scale(PriceScaleMode::Logarithmic, range, height);
        let price = low + pick * range.length();
        let y = scale.price_to_coordinate(price, low);
        assert_relative_eq!(scale.coordinate_to_price(y, low), price, max_relative = 1e-6);
    }
}
