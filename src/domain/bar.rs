//! Bar and bar series representation.
//!
//! A [`BarSeries`] is built once, wrapped in an `Arc` and then shared read-only
//! by every indicator and rule that evaluates over it.

use crate::domain::error::EngineError;
use crate::domain::num::{Num, NumFactory};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct Bar {
    pub end_time: DateTime<Utc>,
    pub open: Num,
    pub high: Num,
    pub low: Num,
    pub close: Num,
    pub volume: Num,
}

impl Bar {
    /// max(high - low, |high - prev_close|, |low - prev_close|), or high - low
    /// for the first bar of a series.
    pub fn true_range(&self, prev_close: Option<Num>) -> Num {
        let hl = (self.high - self.low).abs();
        match prev_close {
            None => hl,
            Some(prev) => {
                let hc = (self.high - prev).abs();
                let lc = (self.low - prev).abs();
                hl.max(hc).max(lc)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct BarSeries {
    name: String,
    factory: NumFactory,
    bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new(name: impl Into<String>, factory: NumFactory) -> Self {
        Self {
            name: name.into(),
            factory,
            bars: Vec::new(),
        }
    }

    /// Appends a bar, converting its values into the series representation.
    /// End times must be strictly increasing.
    pub fn push(&mut self, bar: Bar) -> Result<(), EngineError> {
        if let Some(last) = self.bars.last() {
            if bar.end_time <= last.end_time {
                return Err(EngineError::rule(format!(
                    "bar ending {} does not follow {}",
                    bar.end_time, last.end_time
                )));
            }
        }
        let f = self.factory;
        self.bars.push(Bar {
            end_time: bar.end_time,
            open: f.convert(bar.open),
            high: f.convert(bar.high),
            low: f.convert(bar.low),
            close: f.convert(bar.close),
            volume: f.convert(bar.volume),
        });
        Ok(())
    }

    pub fn add_bar(
        &mut self,
        end_time: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<(), EngineError> {
        let f = self.factory;
        self.push(Bar {
            end_time,
            open: f.num_of(open),
            high: f.num_of(high),
            low: f.num_of(low),
            close: f.num_of(close),
            volume: f.num_of(volume),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn factory(&self) -> NumFactory {
        self.factory
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn get(&self, index: usize) -> Option<&Bar> {
        self.bars.get(index)
    }

    /// # Panics
    ///
    /// Panics when `index` is outside `[0, len)`.
    pub fn bar(&self, index: usize) -> &Bar {
        self.check_index(index);
        &self.bars[index]
    }

    /// Bounds check shared by all indicators: out-of-range access is a
    /// programming error and is never clamped.
    pub fn check_index(&self, index: usize) {
        if index >= self.bars.len() {
            panic!(
                "index {index} out of bounds for series {:?} of {} bars",
                self.name,
                self.bars.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn sample_bar() -> Bar {
        let f = NumFactory::Double;
        Bar {
            end_time: t(15),
            open: f.num_of(100.0),
            high: f.num_of(110.0),
            low: f.num_of(90.0),
            close: f.num_of(105.0),
            volume: f.num_of(50_000.0),
        }
    }

    #[test]
    fn true_range_first_bar_is_high_low() {
        assert_eq!(sample_bar().true_range(None).to_f64(), 20.0);
    }

    #[test]
    fn true_range_gap_up() {
        let bar = sample_bar();
        // high-low=20, |110-70|=40, |90-70|=20 → 40
        let prev = NumFactory::Double.num_of(70.0);
        assert_eq!(bar.true_range(Some(prev)).to_f64(), 40.0);
    }

    #[test]
    fn true_range_gap_down() {
        let bar = sample_bar();
        let prev = NumFactory::Double.num_of(130.0);
        assert_eq!(bar.true_range(Some(prev)).to_f64(), 40.0);
    }

    #[test]
    fn push_converts_to_series_representation() {
        let mut series = BarSeries::new("test", NumFactory::Decimal);
        series.push(sample_bar()).unwrap();
        assert!(matches!(series.bar(0).close, Num::Decimal(_)));
        assert_eq!(series.bar(0).close.to_string(), "105");
    }

    #[test]
    fn push_rejects_out_of_order_bars() {
        let mut series = BarSeries::new("test", NumFactory::Double);
        series.add_bar(t(2), 1.0, 1.0, 1.0, 1.0, 1.0).unwrap();
        assert!(series.add_bar(t(2), 1.0, 1.0, 1.0, 1.0, 1.0).is_err());
        assert!(series.add_bar(t(1), 1.0, 1.0, 1.0, 1.0, 1.0).is_err());
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn get_is_non_panicking() {
        let series = BarSeries::new("empty", NumFactory::Double);
        assert!(series.is_empty());
        assert!(series.get(0).is_none());
    }

    #[test]
    #[should_panic(expected = "index 3 out of bounds")]
    fn bar_panics_out_of_range() {
        let mut series = BarSeries::new("test", NumFactory::Double);
        series.add_bar(t(1), 1.0, 1.0, 1.0, 1.0, 1.0).unwrap();
        series.bar(3);
    }
}
