use std::cell::RefCell;
use std::rc::Rc;

use approx::assert_abs_diff_eq;
use chart_scales::core::{InternalTime, TimeInput, TimeScalePoint, fill_weights_for_points};
use chart_scales::model::{TimeScale, TimeScaleOptions};

fn points(count: usize) -> Vec<TimeScalePoint> {
    let mut points = (0..count)
        .map(|i| {
            let timestamp = 1_600_000_000 + i as i64 * 60;
            TimeScalePoint::new(InternalTime::new(timestamp), TimeInput::Timestamp(timestamp))
        })
        .collect::<Vec<_>>();
    fill_weights_for_points(&mut points, 0);
    points
}

fn build_scale(count: usize, width: f64, bar_spacing: f64) -> TimeScale {
    let mut scale = TimeScale::new(TimeScaleOptions {
        bar_spacing,
        ..TimeScaleOptions::default()
    });
    scale.set_width(width).expect("width");
    scale.update(&points(count), 0);
    scale
        .set_base_index(Some(count as i64 - 1))
        .expect("base index");
    scale
}

#[test]
fn pan_by_right_offset_moves_last_bar_left() {
    let mut scale = build_scale(101, 500.0, 10.0);
    assert_abs_diff_eq!(scale.index_to_coordinate(100), 494.0);

    scale.set_right_offset(5.0).expect("offset");
    assert_abs_diff_eq!(scale.index_to_coordinate(100), 444.0);
    assert_eq!(scale.coordinate_to_index(444.0), 100);
}

#[test]
fn fit_content_shows_every_point() {
    let mut scale = build_scale(101, 500.0, 10.0);
    scale.fit_content().expect("fit");
    let range = scale.visible_logical_range().expect("range");
    assert_abs_diff_eq!(range.left(), 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(range.right(), 100.0, epsilon = 1e-9);
    assert_abs_diff_eq!(scale.bar_spacing(), 500.0 / 101.0, epsilon = 1e-9);
}

#[test]
fn right_offset_is_clamped_to_scroll_bounds() {
    let mut scale = build_scale(101, 500.0, 10.0);
    scale.set_right_offset(1_000.0).expect("offset");
    assert_abs_diff_eq!(scale.right_offset(), scale.max_right_offset());
    assert_abs_diff_eq!(scale.right_offset(), 48.0);

    scale.set_right_offset(-1_000.0).expect("offset");
    let min = scale.min_right_offset().expect("data present");
    assert_abs_diff_eq!(scale.right_offset(), min);
    assert_abs_diff_eq!(min, -99.0);
}

#[test]
fn bar_spacing_is_clamped_into_min_and_half_width() {
    let mut scale = build_scale(50, 400.0, 6.0);
    scale.set_bar_spacing(1_000.0).expect("spacing");
    assert_abs_diff_eq!(scale.bar_spacing(), 200.0);
    scale.set_bar_spacing(0.01).expect("spacing");
    assert_abs_diff_eq!(scale.bar_spacing(), 0.5);
    assert!(scale.set_bar_spacing(f64::NAN).is_err());
}

#[test]
fn zero_width_is_ignored_and_negative_width_rejected() {
    let mut scale = build_scale(10, 300.0, 6.0);
    scale.set_width(0.0).expect("zero width");
    assert_abs_diff_eq!(scale.width(), 300.0);
    assert!(scale.set_width(-5.0).is_err());
}

#[test]
fn visible_range_change_is_reported_once_per_change() {
    let mut scale = build_scale(101, 500.0, 10.0);
    let reported = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&reported);
    scale
        .logical_range_changed()
        .subscribe(move |range| sink.borrow_mut().push(*range));

    scale.visible_logical_range();
    scale.visible_logical_range();
    scale.set_right_offset(3.0).expect("offset");
    scale.visible_logical_range();

    let reported = reported.borrow();
    assert_eq!(reported.len(), 2);
    let last = reported[1].expect("range");
    assert_abs_diff_eq!(last.right(), 103.0, epsilon = 1e-9);
}

#[test]
fn visible_time_range_uses_original_times_of_edge_points() {
    let mut scale = build_scale(20, 500.0, 10.0);
    let range = scale.visible_time_range().expect("range");
    assert_eq!(range.from, TimeInput::Timestamp(1_600_000_000));
    assert_eq!(range.to, TimeInput::Timestamp(1_600_000_000 + 19 * 60));
}

#[test]
fn scroll_gesture_keeps_pixel_offset_in_bars() {
    let mut scale = build_scale(101, 500.0, 10.0);
    scale.set_right_offset(10.0).expect("offset");
    scale.start_scroll(300.0);
    scale.scroll_to(250.0);
    scale.end_scroll();
    assert_abs_diff_eq!(scale.right_offset(), 15.0, epsilon = 1e-9);
}

#[test]
fn restore_default_resets_spacing_and_offset() {
    let mut scale = build_scale(101, 500.0, 10.0);
    scale.set_bar_spacing(20.0).expect("spacing");
    scale.set_right_offset(7.0).expect("offset");
    scale.restore_default().expect("restore");
    assert_abs_diff_eq!(scale.bar_spacing(), 10.0);
    assert_abs_diff_eq!(scale.right_offset(), 0.0);
}

#[test]
fn animated_scroll_reaches_its_target() {
    let scale = build_scale(101, 500.0, 10.0);
    let animation = scale
        .scroll_to_offset_animated(8.0, 400.0, 1_000.0)
        .expect("animation");
    assert_abs_diff_eq!(animation.position_at(1_200.0), 4.0);
    assert!(animation.is_finished(1_400.0));
    assert_abs_diff_eq!(animation.position_at(2_000.0), 8.0);
}
