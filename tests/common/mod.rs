#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use tarules::domain::bar::BarSeries;
pub use tarules::domain::num::{Num, NumFactory};
use tarules::domain::trading_record::{TradeType, TradingRecord};

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Daily bars where open, high, low and close all equal the given price.
pub fn make_series(factory: NumFactory, closes: &[f64]) -> Arc<BarSeries> {
    let bars: Vec<(f64, f64, f64, f64)> = closes.iter().map(|&c| (c, c, c, c)).collect();
    make_ohlc_series(factory, &bars)
}

/// Daily bars from (open, high, low, close) tuples.
pub fn make_ohlc_series(factory: NumFactory, bars: &[(f64, f64, f64, f64)]) -> Arc<BarSeries> {
    let mut series = BarSeries::new("test", factory);
    for (i, &(o, h, l, c)) in bars.iter().enumerate() {
        series
            .add_bar(start_time() + Duration::days(i as i64), o, h, l, c, 1000.0)
            .unwrap();
    }
    Arc::new(series)
}

pub fn num(factory: NumFactory, value: f64) -> Num {
    factory.num_of(value)
}

/// Record with one open position entered at `index` for `price`.
pub fn open_record(
    factory: NumFactory,
    trade_type: TradeType,
    index: usize,
    price: f64,
) -> TradingRecord {
    let mut record = TradingRecord::new(trade_type);
    record
        .enter(index, factory.num_of(price), factory.one())
        .unwrap();
    record
}

pub fn satisfied_indexes(rule: &tarules::domain::rule::Rule, len: usize) -> Vec<usize> {
    (0..len).filter(|&i| rule.is_satisfied_at(i)).collect()
}
