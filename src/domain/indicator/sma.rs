//! Simple Moving Average.
//!
//! SMA(n)[i] = sum(S[i-n+1..=i]) / n
//! Warmup: the first (n-1) values are NaN.

use crate::domain::bar::BarSeries;
use crate::domain::descriptor::ComponentDescriptor;
use crate::domain::error::EngineError;
use crate::domain::indicator::{CachedValues, Indicator, IndicatorRef, describe_windowed};
use crate::domain::num::Num;
use std::sync::Arc;

#[derive(Debug)]
pub struct SmaIndicator {
    source: IndicatorRef,
    bar_count: usize,
    cache: CachedValues<Num>,
}

impl SmaIndicator {
    pub fn new(source: IndicatorRef, bar_count: usize) -> Result<Self, EngineError> {
        if bar_count == 0 {
            return Err(EngineError::rule("SMA bar count must be at least 1"));
        }
        Ok(Self {
            source,
            bar_count,
            cache: CachedValues::new(),
        })
    }

    pub fn bar_count(&self) -> usize {
        self.bar_count
    }

    fn calculate(&self, index: usize) -> Num {
        if index + 1 < self.bar_count {
            return Num::NaN;
        }
        let factory = self.series().factory();
        let start = index + 1 - self.bar_count;
        let sum = (start..=index).fold(factory.zero(), |acc, i| acc + self.source.value(i));
        sum / factory.num_of_i64(self.bar_count as i64)
    }
}

impl Indicator for SmaIndicator {
    fn value(&self, index: usize) -> Num {
        self.series().check_index(index);
        self.cache.get_or_compute(index, |i| self.calculate(i))
    }

    fn series(&self) -> &Arc<BarSeries> {
        self.source.series()
    }

    fn describe(&self) -> Option<ComponentDescriptor> {
        describe_windowed("SMAIndicator", self.bar_count, Some(&self.source))
    }
}
