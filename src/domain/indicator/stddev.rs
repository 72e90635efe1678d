//! Standard Deviation indicator.
//!
//! Population standard deviation over n source values.
//! STDDEV(n)[i] = sqrt(sum((S[i-j] - SMA(n)[i])^2 for j in 0..n) / n)
//! Warmup: the first (n-1) values are NaN.

use crate::domain::bar::BarSeries;
use crate::domain::descriptor::ComponentDescriptor;
use crate::domain::error::EngineError;
use crate::domain::indicator::{CachedValues, Indicator, IndicatorRef, describe_windowed};
use crate::domain::num::Num;
use std::sync::Arc;

#[derive(Debug)]
pub struct StdDevIndicator {
    source: IndicatorRef,
    bar_count: usize,
    cache: CachedValues<Num>,
}

impl StdDevIndicator {
    pub fn new(source: IndicatorRef, bar_count: usize) -> Result<Self, EngineError> {
        if bar_count == 0 {
            return Err(EngineError::rule("standard deviation bar count must be at least 1"));
        }
        Ok(Self {
            source,
            bar_count,
            cache: CachedValues::new(),
        })
    }

    fn calculate(&self, index: usize) -> Num {
        if index + 1 < self.bar_count {
            return Num::NaN;
        }
        let factory = self.series().factory();
        let period = factory.num_of_i64(self.bar_count as i64);
        let start = index + 1 - self.bar_count;
        let window: Vec<Num> = (start..=index).map(|i| self.source.value(i)).collect();

        let mean = window.iter().fold(factory.zero(), |acc, v| acc + *v) / period;
        let variance = window.iter().fold(factory.zero(), |acc, v| {
            let diff = *v - mean;
            acc + diff * diff
        }) / period;
        variance.sqrt()
    }
}

impl Indicator for StdDevIndicator {
    fn value(&self, index: usize) -> Num {
        self.series().check_index(index);
        self.cache.get_or_compute(index, |i| self.calculate(i))
    }

    fn series(&self) -> &Arc<BarSeries> {
        self.source.series()
    }

    fn describe(&self) -> Option<ComponentDescriptor> {
        describe_windowed("StandardDeviationIndicator", self.bar_count, Some(&self.source))
    }
}
