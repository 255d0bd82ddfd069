use std::cell::RefCell;
use std::rc::Rc;

use approx::assert_abs_diff_eq;
use chart_scales::model::{
    Animation, ChartModel, ChartModelOptions, DataLayer, InvalidateMask, InvalidationLevel,
    PaneInvalidation, SeriesDataItem, SeriesOptions, TimeScaleInvalidation,
    TimeScaleInvalidationType,
};
use chart_scales::{SeriesId, SeriesKind};

fn model_with_bars(count: usize) -> (ChartModel, SeriesId) {
    let mut model = ChartModel::new(ChartModelOptions::default()).expect("model");
    model.set_width(500.0).expect("width");
    model.set_pane_height(0, 300.0).expect("height");
    let id = model
        .add_series(SeriesKind::Line, SeriesOptions::default(), 0)
        .expect("series");
    let items = (0..count)
        .map(|i| SeriesDataItem::single(1_000_000 + i as i64 * 60, i as f64))
        .collect::<Vec<_>>();
    let mut layer = DataLayer::new();
    let response = layer
        .set_series_data(id, SeriesKind::Line, &items)
        .expect("data");
    model.apply_data_update(&response).expect("apply");
    model.take_pending_invalidation();
    (model, id)
}

fn kinds(mask: &InvalidateMask) -> Vec<TimeScaleInvalidationType> {
    mask.time_scale_invalidations()
        .iter()
        .map(|invalidation| invalidation.kind())
        .collect()
}

/// Queued commands without the animation stops every command implies.
fn commands(mask: &InvalidateMask) -> Vec<TimeScaleInvalidationType> {
    kinds(mask)
        .into_iter()
        .filter(|kind| *kind != TimeScaleInvalidationType::StopAnimation)
        .collect()
}

#[test]
fn pending_masks_merge_until_taken() {
    let (mut model, _) = model_with_bars(50);
    model.cursor_update();
    model.invalidate_pane(0, InvalidationLevel::Light, true);
    model.cursor_update();

    let mask = model.take_pending_invalidation().expect("pending");
    assert_eq!(mask.full_invalidation(), InvalidationLevel::Light);
    assert_eq!(
        mask.invalidation_for_pane(0),
        PaneInvalidation {
            level: InvalidationLevel::Light,
            auto_scale: true,
        }
    );
    assert!(model.pending_invalidation().is_none());
}

#[test]
fn fit_content_discards_earlier_offset_commands() {
    let (mut model, _) = model_with_bars(50);
    model.set_bar_spacing(12.0).expect("spacing");
    model.set_right_offset(3.0).expect("offset");
    assert_eq!(
        commands(model.pending_invalidation().expect("pending")),
        vec![
            TimeScaleInvalidationType::ApplyBarSpacing,
            TimeScaleInvalidationType::ApplyRightOffset,
        ]
    );
    model.fit_content();
    assert_eq!(
        kinds(model.pending_invalidation().expect("pending")),
        vec![TimeScaleInvalidationType::FitContent]
    );
}

#[test]
fn queued_commands_apply_in_order_on_draw() {
    let (mut model, _) = model_with_bars(50);
    model.set_bar_spacing(12.0).expect("spacing");
    model.set_right_offset(3.0).expect("offset");
    let mask = model.take_pending_invalidation().expect("pending");
    assert_abs_diff_eq!(model.time_scale().right_offset(), 0.0);

    let running = model
        .apply_time_scale_invalidations(&mask, 0.0)
        .expect("apply");
    assert!(!running);
    assert_abs_diff_eq!(model.time_scale().bar_spacing(), 12.0);
    assert_abs_diff_eq!(model.time_scale().right_offset(), 3.0);
}

#[test]
fn merged_masks_replay_as_one_queue() {
    let (mut model, _) = model_with_bars(50);
    let mut mask =
        InvalidateMask::light().with_time_scale(TimeScaleInvalidation::ApplyBarSpacing(12.0));
    mask.merge(
        &InvalidateMask::cursor().with_time_scale(TimeScaleInvalidation::ApplyRightOffset(4.0)),
    );
    assert_eq!(mask.full_invalidation(), InvalidationLevel::Light);

    let running = model
        .apply_time_scale_invalidations(&mask, 0.0)
        .expect("apply");
    assert!(!running);
    assert_abs_diff_eq!(model.time_scale().bar_spacing(), 12.0);
    assert_abs_diff_eq!(model.time_scale().right_offset(), 4.0);
}

#[test]
fn merged_animation_keeps_running_after_replay() {
    let (mut model, _) = model_with_bars(50);
    let animation = Animation::start(0.0, 6.0, 0.0, 100.0).expect("animation");
    let mut mask =
        InvalidateMask::light().with_time_scale(TimeScaleInvalidation::ApplyBarSpacing(8.0));
    mask.merge(
        &InvalidateMask::light().with_time_scale(TimeScaleInvalidation::Animation(animation)),
    );

    let running = model
        .apply_time_scale_invalidations(&mask, 50.0)
        .expect("apply");
    assert!(running);
    assert_abs_diff_eq!(model.time_scale().bar_spacing(), 8.0);
    assert_abs_diff_eq!(model.time_scale().right_offset(), 3.0, epsilon = 1e-9);

    mask.merge(
        &InvalidateMask::light().with_time_scale(TimeScaleInvalidation::ApplyRightOffset(1.0)),
    );
    let running = model
        .apply_time_scale_invalidations(&mask, 60.0)
        .expect("apply");
    assert!(!running);
    assert_abs_diff_eq!(model.time_scale().right_offset(), 1.0);
}

#[test]
fn stopping_an_animation_removes_it_from_the_queue() {
    let (mut model, _) = model_with_bars(50);
    model
        .scroll_to_offset_animated(10.0, 400.0, 0.0)
        .expect("animation");
    assert!(
        model
            .pending_invalidation()
            .and_then(InvalidateMask::time_scale_animation)
            .is_some()
    );
    model.stop_time_scale_animation();
    let mask = model.take_pending_invalidation().expect("pending");
    assert!(mask.time_scale_animation().is_none());
    assert_eq!(kinds(&mask), vec![TimeScaleInvalidationType::StopAnimation]);
}

#[test]
fn handler_sees_each_mask_and_auto_scale_pane_refits() {
    let (mut model, id) = model_with_bars(50);
    let levels = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&levels);
    model.set_invalidate_handler(Box::new(move |mask: &InvalidateMask| {
        sink.borrow_mut().push(mask.full_invalidation());
    }));
    model.invalidate_pane(0, InvalidationLevel::Light, true);
    model.cursor_update();
    assert_eq!(
        *levels.borrow(),
        vec![InvalidationLevel::Light, InvalidationLevel::Cursor]
    );

    let mut mask = InvalidateMask::light();
    mask.invalidate_pane(
        0,
        PaneInvalidation {
            level: InvalidationLevel::Light,
            auto_scale: true,
        },
    );
    model.apply_pane_invalidations(&mask);
    let y_top = model
        .series_price_to_coordinate(id, 49.0)
        .expect("known")
        .expect("visible data");
    let y_bottom = model
        .series_price_to_coordinate(id, 0.0)
        .expect("known")
        .expect("visible data");
    assert!(y_top < y_bottom);
}
