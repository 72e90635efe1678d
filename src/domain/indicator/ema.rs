//! Exponential Moving Average indicator.
//!
//! k = 2/(n+1), seeded with the SMA of the first n values, then
//! EMA[i] = S[i]*k + EMA[i-1]*(1-k).
//! Warmup: the first (n-1) values are NaN.
//!
//! Each value reads the previous one through the cache, so a cold request at
//! index i fills 0..=i in order.

use crate::domain::bar::BarSeries;
use crate::domain::descriptor::ComponentDescriptor;
use crate::domain::error::EngineError;
use crate::domain::indicator::{CachedValues, Indicator, IndicatorRef, describe_windowed};
use crate::domain::num::Num;
use std::sync::Arc;

#[derive(Debug)]
pub struct EmaIndicator {
    source: IndicatorRef,
    bar_count: usize,
    cache: CachedValues<Num>,
}

impl EmaIndicator {
    pub fn new(source: IndicatorRef, bar_count: usize) -> Result<Self, EngineError> {
        if bar_count == 0 {
            return Err(EngineError::rule("EMA bar count must be at least 1"));
        }
        Ok(Self {
            source,
            bar_count,
            cache: CachedValues::new(),
        })
    }

    fn calculate(&self, index: usize) -> Num {
        let n = self.bar_count;
        let factory = self.series().factory();
        if index + 1 < n {
            return Num::NaN;
        }
        if index + 1 == n {
            let sum = (0..n).fold(factory.zero(), |acc, i| acc + self.source.value(i));
            return sum / factory.num_of_i64(n as i64);
        }
        let k = factory.num_of_i64(2) / factory.num_of_i64(n as i64 + 1);
        let prev = self.value(index - 1);
        self.source.value(index) * k + prev * (factory.one() - k)
    }
}

impl Indicator for EmaIndicator {
    fn value(&self, index: usize) -> Num {
        self.series().check_index(index);
        self.cache.get_or_compute(index, |i| self.calculate(i))
    }

    fn series(&self) -> &Arc<BarSeries> {
        self.source.series()
    }

    fn describe(&self) -> Option<ComponentDescriptor> {
        describe_windowed("EMAIndicator", self.bar_count, Some(&self.source))
    }
}
