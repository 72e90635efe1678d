//! True range and Average True Range (Wilder smoothing).
//!
//! TR[0] = high - low, TR[i] = max(high - low, |high - C[i-1]|, |low - C[i-1]|).
//! ATR(n) is seeded with the mean of the first n true ranges, then
//! ATR[i] = (ATR[i-1] * (n-1) + TR[i]) / n.
//! Warmup: the first (n-1) values are NaN.

use crate::domain::bar::BarSeries;
use crate::domain::descriptor::ComponentDescriptor;
use crate::domain::error::EngineError;
use crate::domain::indicator::{CachedValues, Indicator, describe_windowed};
use crate::domain::num::Num;
use std::sync::Arc;

#[derive(Debug)]
pub struct TrueRangeIndicator {
    series: Arc<BarSeries>,
    cache: CachedValues<Num>,
}

impl TrueRangeIndicator {
    pub fn new(series: &Arc<BarSeries>) -> Self {
        Self {
            series: Arc::clone(series),
            cache: CachedValues::new(),
        }
    }

    fn calculate(&self, index: usize) -> Num {
        let prev_close = index.checked_sub(1).map(|p| self.series.bar(p).close);
        self.series.bar(index).true_range(prev_close)
    }
}

impl Indicator for TrueRangeIndicator {
    fn value(&self, index: usize) -> Num {
        self.series.check_index(index);
        self.cache.get_or_compute(index, |i| self.calculate(i))
    }

    fn series(&self) -> &Arc<BarSeries> {
        &self.series
    }

    fn describe(&self) -> Option<ComponentDescriptor> {
        Some(ComponentDescriptor::builder("TrueRangeIndicator").build())
    }
}

#[derive(Debug)]
pub struct AtrIndicator {
    true_range: TrueRangeIndicator,
    bar_count: usize,
    cache: CachedValues<Num>,
}

impl AtrIndicator {
    pub fn new(series: &Arc<BarSeries>, bar_count: usize) -> Result<Self, EngineError> {
        if bar_count == 0 {
            return Err(EngineError::rule("ATR bar count must be at least 1"));
        }
        Ok(Self {
            true_range: TrueRangeIndicator::new(series),
            bar_count,
            cache: CachedValues::new(),
        })
    }

    pub fn bar_count(&self) -> usize {
        self.bar_count
    }

    fn calculate(&self, index: usize) -> Num {
        let n = self.bar_count;
        let factory = self.series().factory();
        let period = factory.num_of_i64(n as i64);
        if index + 1 < n {
            return Num::NaN;
        }
        if index + 1 == n {
            let sum = (0..n).fold(factory.zero(), |acc, i| acc + self.true_range.value(i));
            return sum / period;
        }
        let prev = self.value(index - 1);
        (prev * factory.num_of_i64(n as i64 - 1) + self.true_range.value(index)) / period
    }
}

impl Indicator for AtrIndicator {
    fn value(&self, index: usize) -> Num {
        self.series().check_index(index);
        self.cache.get_or_compute(index, |i| self.calculate(i))
    }

    fn series(&self) -> &Arc<BarSeries> {
        self.true_range.series()
    }

    fn describe(&self) -> Option<ComponentDescriptor> {
        describe_windowed("ATRIndicator", self.bar_count, None)
    }
}
