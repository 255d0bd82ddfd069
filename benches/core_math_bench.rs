use chart_scales::core::{
    InternalTime, PlotRowValueIndex, PriceRange, TimeInput, TimeScalePoint,
    fill_weights_for_points,
};
use chart_scales::model::{
    DataLayer, PriceScale, PriceScaleOptions, SeriesDataItem, SeriesId, SeriesKind, TimeScale,
    TimeScaleOptions,
};
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

fn ohlc_items(count: usize) -> Vec<SeriesDataItem> {
    (0..count)
        .map(|i| {
            let t = i as f64;
            let base = 100.0 + t * 0.05;
            let open = base;
            let close = if i % 2 == 0 { base + 1.0 } else { base - 1.0 };
            let low = open.min(close) - 0.75;
            let high = open.max(close) + 0.75;
            SeriesDataItem::ohlc(1_600_000_000 + i as i64 * 60, open, high, low, close)
        })
        .collect()
}

fn bench_time_scale_round_trip(c: &mut Criterion) {
    let mut points = (0..10_000)
        .map(|i| {
            let timestamp = 1_600_000_000 + i * 60;
            TimeScalePoint::new(InternalTime::new(timestamp), TimeInput::Timestamp(timestamp))
        })
        .collect::<Vec<_>>();
    fill_weights_for_points(&mut points, 0);
    let mut scale = TimeScale::new(TimeScaleOptions::default());
    scale.set_width(1_920.0).expect("valid width");
    scale.update(&points, 0);
    scale.set_base_index(Some(9_999)).expect("valid base index");

    c.bench_function("time_scale_round_trip", |b| {
        b.iter(|| {
            let x = scale.index_to_coordinate(black_box(9_876));
            let _ = scale.coordinate_to_index(black_box(x));
        })
    });
}

fn bench_price_scale_round_trip(c: &mut Criterion) {
    let mut scale = PriceScale::new("right", PriceScaleOptions::default());
    scale.set_height(1_080.0);
    scale.set_price_range(Some(PriceRange::new(0.0, 10_000.0)));

    c.bench_function("price_scale_round_trip", |b| {
        b.iter(|| {
            let y = scale.price_to_coordinate(black_box(4_321.123), 0.0);
            let _ = scale.coordinate_to_price(black_box(y), 0.0);
        })
    });
}

fn bench_min_max_on_range_10k(c: &mut Criterion) {
    let mut layer = DataLayer::new();
    let id = SeriesId::new(1);
    let rows = layer
        .set_series_data(id, SeriesKind::Candlestick, &ohlc_items(10_000))
        .map(|response| response.series[&id].rows.to_vec())
        .expect("valid data");
    let mut plot_list = chart_scales::core::PlotList::new();
    plot_list.set_data(rows).expect("ascending rows");
    let columns = [PlotRowValueIndex::High, PlotRowValueIndex::Low];

    c.bench_function("min_max_on_range_10k", |b| {
        b.iter(|| {
            let _ = plot_list.min_max_on_range_cached(
                black_box(1_234),
                black_box(8_765),
                black_box(&columns),
            );
        })
    });
}

fn bench_set_series_data_10k(c: &mut Criterion) {
    let items = ohlc_items(10_000);

    c.bench_function("set_series_data_10k", |b| {
        b.iter(|| {
            let mut layer = DataLayer::new();
            let _ = layer
                .set_series_data(SeriesId::new(1), SeriesKind::Candlestick, black_box(&items))
                .expect("valid data");
        })
    });
}

criterion_group!(
    benches,
    bench_time_scale_round_trip,
    bench_price_scale_round_trip,
    bench_min_max_on_range_10k,
    bench_set_series_data_10k
);
criterion_main!(benches);
