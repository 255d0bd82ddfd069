use approx::assert_relative_eq;
use chart_scales::model::{PriceTickMarkBuilder, PriceTickSpanCalculator};

#[test]
fn hundred_units_over_three_hundred_pixels_step_by_ten() {
    let builder = PriceTickMarkBuilder::default();
    // 12px font reserves 30px per label, so at most ten labels fit
    assert_eq!(builder.tick_span(100.0, 0.0, 300.0, 12.0), 10.0);
}

#[test]
fn sub_unit_ranges_use_fractional_dividers() {
    let builder = PriceTickMarkBuilder::default();
    assert_relative_eq!(builder.tick_span(1.0, 0.0, 300.0, 12.0), 0.1, max_relative = 1e-9);
}

#[test]
fn taller_scales_get_finer_spans() {
    let builder = PriceTickMarkBuilder::default();
    let short = builder.tick_span(100.0, 0.0, 150.0, 12.0);
    let tall = builder.tick_span(100.0, 0.0, 1_200.0, 12.0);
    assert!(tall < short, "tall {tall}, short {short}");
}

#[test]
fn spans_never_drop_below_the_minimal_move() {
    let calculator = PriceTickSpanCalculator::new(100.0, [2.0, 2.5, 2.0]).expect("calculator");
    let span = calculator.tick_span(10.02, 10.0, 0.000_1);
    assert!(span >= 0.01 - 1e-12, "span {span}");
}

#[test]
fn non_decimal_bases_split_into_twos_and_fives() {
    let quarters = PriceTickSpanCalculator::new(4.0, [2.0, 2.5, 2.0]).expect("quarters");
    let span = quarters.tick_span(1.0, 0.0, 0.01);
    assert_relative_eq!(span, 0.25, max_relative = 1e-12);
}

#[test]
fn unsupported_bases_are_rejected_or_replaced() {
    assert!(PriceTickSpanCalculator::new(3.0, [2.0, 2.5, 2.0]).is_err());
    assert!(PriceTickSpanCalculator::new(f64::NAN, [2.0, 2.5, 2.0]).is_err());
    assert_eq!(PriceTickMarkBuilder::new(3.0).base(), 100.0);
    assert_eq!(PriceTickMarkBuilder::new(1_000.0).base(), 1_000.0);
}
