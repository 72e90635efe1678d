//! Stop-loss and stop-gain conditions over an open position.
//!
//! A stop compares the current price against a level derived from a
//! reference price and a distance:
//!
//! - Reference: the entry price, or for trailing stops the most favourable
//!   price seen since entry (highest for a long, lowest for a short). The
//!   trailing extreme only ever ratchets in the favourable direction and is
//!   reseeded with the entry price whenever a new position opens.
//! - Distance: a percentage of the reference, a fixed amount, ATR × coefficient
//!   or standard deviation × coefficient.
//!
//! Loss stops fire when price falls through `reference - distance` (long) or
//! rises through `reference + distance` (short). Fixed gain stops fire when
//! price reaches `entry ± distance`. Trailing gain stops fire on a retrace
//! through `extreme ∓ distance`, but only while that level still locks in a
//! profit over the entry.
//!
//! Without a trading record or an open position a stop is never satisfied.

use crate::domain::error::EngineError;
use crate::domain::indicator::{AtrIndicator, Indicator, IndicatorRef, StdDevIndicator};
use crate::domain::num::Num;
use crate::domain::trading_record::{Trade, TradeType, TradingRecord};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSide {
    Loss,
    Gain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceKind {
    Percentage,
    Amount,
    AverageTrueRange,
    Volatility,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopDistance {
    Percentage(Num),
    Amount(Num),
    AverageTrueRange { bar_count: usize, coefficient: Num },
    Volatility { bar_count: usize, coefficient: Num },
}

impl StopDistance {
    pub fn kind(&self) -> DistanceKind {
        match self {
            StopDistance::Percentage(_) => DistanceKind::Percentage,
            StopDistance::Amount(_) => DistanceKind::Amount,
            StopDistance::AverageTrueRange { .. } => DistanceKind::AverageTrueRange,
            StopDistance::Volatility { .. } => DistanceKind::Volatility,
        }
    }
}

const TYPE_NAMES: [(StopSide, DistanceKind, bool, &str); 16] = [
    (StopSide::Loss, DistanceKind::Percentage, false, "StopLossRule"),
    (StopSide::Loss, DistanceKind::Percentage, true, "TrailingStopLossRule"),
    (StopSide::Loss, DistanceKind::Amount, false, "FixedAmountStopLossRule"),
    (StopSide::Loss, DistanceKind::Amount, true, "TrailingFixedAmountStopLossRule"),
    (StopSide::Loss, DistanceKind::AverageTrueRange, false, "AverageTrueRangeStopLossRule"),
    (StopSide::Loss, DistanceKind::AverageTrueRange, true, "AverageTrueRangeTrailingStopLossRule"),
    (StopSide::Loss, DistanceKind::Volatility, false, "VolatilityStopLossRule"),
    (StopSide::Loss, DistanceKind::Volatility, true, "VolatilityTrailingStopLossRule"),
    (StopSide::Gain, DistanceKind::Percentage, false, "StopGainRule"),
    (StopSide::Gain, DistanceKind::Percentage, true, "TrailingStopGainRule"),
    (StopSide::Gain, DistanceKind::Amount, false, "FixedAmountStopGainRule"),
    (StopSide::Gain, DistanceKind::Amount, true, "TrailingFixedAmountStopGainRule"),
    (StopSide::Gain, DistanceKind::AverageTrueRange, false, "AverageTrueRangeStopGainRule"),
    (StopSide::Gain, DistanceKind::AverageTrueRange, true, "AverageTrueRangeTrailingStopGainRule"),
    (StopSide::Gain, DistanceKind::Volatility, false, "VolatilityStopGainRule"),
    (StopSide::Gain, DistanceKind::Volatility, true, "VolatilityTrailingStopGainRule"),
];

/// Looks up (side, distance kind, trailing) for a stop rule type name.
pub fn parse_stop_type(name: &str) -> Option<(StopSide, DistanceKind, bool)> {
    TYPE_NAMES
        .iter()
        .find(|(_, _, _, n)| *n == name)
        .map(|(side, kind, trailing, _)| (*side, *kind, *trailing))
}

/// Ratchet state of one position. `position` is the ordinal of the position
/// in its record, so an exit and re-entry on the same bar still reseeds.
#[derive(Debug, Clone, Copy)]
struct TrailState {
    position: usize,
    entry_index: usize,
    trade_type: TradeType,
    next_index: usize,
    extreme: Num,
}

#[derive(Debug)]
pub struct StopRule {
    price: IndicatorRef,
    side: StopSide,
    distance: StopDistance,
    trailing: bool,
    volatility: Option<IndicatorRef>,
    trail: Mutex<Option<TrailState>>,
}

impl StopRule {
    pub fn new(
        price: IndicatorRef,
        side: StopSide,
        distance: StopDistance,
        trailing: bool,
    ) -> Result<Self, EngineError> {
        let factory = price.series().factory();
        let check = |value: Num, what: &str| -> Result<Num, EngineError> {
            if value.is_nan() || value.is_negative() {
                return Err(EngineError::rule(format!(
                    "stop {what} must be a non-negative number, got {value}"
                )));
            }
            Ok(factory.convert(value))
        };
        let (distance, volatility): (StopDistance, Option<IndicatorRef>) = match distance {
            StopDistance::Percentage(pct) => (StopDistance::Percentage(check(pct, "percentage")?), None),
            StopDistance::Amount(amount) => (StopDistance::Amount(check(amount, "amount")?), None),
            StopDistance::AverageTrueRange {
                bar_count,
                coefficient,
            } => (
                StopDistance::AverageTrueRange {
                    bar_count,
                    coefficient: check(coefficient, "coefficient")?,
                },
                Some(Arc::new(AtrIndicator::new(price.series(), bar_count)?) as IndicatorRef),
            ),
            StopDistance::Volatility {
                bar_count,
                coefficient,
            } => (
                StopDistance::Volatility {
                    bar_count,
                    coefficient: check(coefficient, "coefficient")?,
                },
                Some(Arc::new(StdDevIndicator::new(Arc::clone(&price), bar_count)?) as IndicatorRef),
            ),
        };
        Ok(Self {
            price,
            side,
            distance,
            trailing,
            volatility,
            trail: Mutex::new(None),
        })
    }

    /// Percentage stop-loss against the entry price.
    pub fn stop_loss(price: IndicatorRef, percentage: Num) -> Result<Self, EngineError> {
        Self::new(price, StopSide::Loss, StopDistance::Percentage(percentage), false)
    }

    pub fn trailing_stop_loss(price: IndicatorRef, percentage: Num) -> Result<Self, EngineError> {
        Self::new(price, StopSide::Loss, StopDistance::Percentage(percentage), true)
    }

    pub fn stop_gain(price: IndicatorRef, percentage: Num) -> Result<Self, EngineError> {
        Self::new(price, StopSide::Gain, StopDistance::Percentage(percentage), false)
    }

    pub fn trailing_stop_gain(price: IndicatorRef, percentage: Num) -> Result<Self, EngineError> {
        Self::new(price, StopSide::Gain, StopDistance::Percentage(percentage), true)
    }

    pub fn price(&self) -> &IndicatorRef {
        &self.price
    }

    pub fn side(&self) -> StopSide {
        self.side
    }

    pub fn distance(&self) -> StopDistance {
        self.distance
    }

    pub fn is_trailing(&self) -> bool {
        self.trailing
    }

    pub fn type_name(&self) -> &'static str {
        let kind = self.distance.kind();
        TYPE_NAMES
            .iter()
            .find(|(side, k, trailing, _)| *side == self.side && *k == kind && *trailing == self.trailing)
            .map(|(_, _, _, name)| *name)
            .unwrap_or("StopRule")
    }

    /// Trailing extreme reached so far for the current position, if any.
    pub fn reference_price(&self) -> Option<Num> {
        self.trail
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|state| state.extreme)
    }

    /// Price level the stop compares against at `index`, or `None` without
    /// an open position or while the distance is still undefined.
    pub fn stop_price(&self, index: usize, record: Option<&TradingRecord>) -> Option<Num> {
        let (position, entry) = open_entry(record)?;
        Some(self.level(position, entry, index)).filter(|level| !level.is_nan())
    }

    pub fn is_satisfied(&self, index: usize, record: Option<&TradingRecord>) -> bool {
        let Some((position, entry)) = open_entry(record) else {
            return false;
        };
        let level = self.level(position, entry, index);
        let price = self.price.value(index);
        let long = entry.trade_type == TradeType::Buy;
        match (self.side, self.trailing) {
            (StopSide::Loss, _) => {
                if long {
                    price <= level
                } else {
                    price >= level
                }
            }
            (StopSide::Gain, false) => {
                if long {
                    price >= level
                } else {
                    price <= level
                }
            }
            (StopSide::Gain, true) => {
                if long {
                    level > entry.price && price <= level
                } else {
                    level < entry.price && price >= level
                }
            }
        }
    }

    fn level(&self, position: usize, entry: &Trade, index: usize) -> Num {
        let reference = self.reference(position, entry, index);
        let distance = self.distance_at(reference, index);
        let long = entry.trade_type == TradeType::Buy;
        let below = match (self.side, self.trailing) {
            (StopSide::Loss, _) | (StopSide::Gain, true) => long,
            (StopSide::Gain, false) => !long,
        };
        if below {
            reference - distance
        } else {
            reference + distance
        }
    }

    fn distance_at(&self, reference: Num, index: usize) -> Num {
        match self.distance {
            StopDistance::Percentage(pct) => {
                reference * pct / self.price.series().factory().hundred()
            }
            StopDistance::Amount(amount) => amount,
            StopDistance::AverageTrueRange { coefficient, .. }
            | StopDistance::Volatility { coefficient, .. } => match &self.volatility {
                Some(indicator) => indicator.value(index) * coefficient,
                None => Num::NaN,
            },
        }
    }

    fn reference(&self, position: usize, entry: &Trade, index: usize) -> Num {
        if !self.trailing {
            return entry.price;
        }
        let mut guard = self.trail.lock().unwrap_or_else(PoisonError::into_inner);
        let mut state = match *guard {
            Some(state)
                if state.position == position
                    && state.entry_index == entry.index
                    && state.trade_type == entry.trade_type =>
            {
                state
            }
            _ => TrailState {
                position,
                entry_index: entry.index,
                trade_type: entry.trade_type,
                next_index: entry.index,
                extreme: entry.price,
            },
        };
        while state.next_index <= index {
            let price = self.price.value(state.next_index);
            if !price.is_nan() {
                state.extreme = match entry.trade_type {
                    TradeType::Buy => state.extreme.max(price),
                    TradeType::Sell => state.extreme.min(price),
                };
            }
            state.next_index += 1;
        }
        *guard = Some(state);
        state.extreme
    }
}

/// Ordinal and entry trade of the record's open position.
fn open_entry(record: Option<&TradingRecord>) -> Option<(usize, &Trade)> {
    let record = record?;
    let position = record.current_position();
    if !position.is_opened() {
        return None;
    }
    position.entry().map(|entry| (record.positions().len(), entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::BarSeries;
    use crate::domain::indicator::PriceIndicator;
    use crate::domain::num::NumFactory;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};

    fn closes(prices: &[f64]) -> Arc<BarSeries> {
        let mut s = BarSeries::new("stops", NumFactory::Decimal);
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for (i, &p) in prices.iter().enumerate() {
            s.add_bar(t0 + Duration::days(i as i64), p, p, p, p, 0.0).unwrap();
        }
        Arc::new(s)
    }

    fn num(v: f64) -> Num {
        NumFactory::Decimal.num_of(v)
    }

    fn entered(trade_type: TradeType, index: usize, price: f64) -> TradingRecord {
        let mut record = TradingRecord::new(trade_type);
        record.enter(index, num(price), num(1.0)).unwrap();
        record
    }

    #[test]
    fn percentage_stop_loss_long() {
        let s = closes(&[100.0, 105.0, 110.0, 120.0, 100.0]);
        let stop = StopRule::stop_loss(PriceIndicator::close(&s), num(5.0)).unwrap();
        let flat = TradingRecord::new(TradeType::Buy);
        assert!(!stop.is_satisfied(0, Some(&flat)));
        assert!(!stop.is_satisfied(1, Some(&flat)));
        let record = entered(TradeType::Buy, 2, 114.0);
        assert!(!stop.is_satisfied(2, Some(&record)));
        assert!(!stop.is_satisfied(3, Some(&record)));
        assert!(stop.is_satisfied(4, Some(&record)));
        assert_eq!(stop.stop_price(4, Some(&record)).unwrap().to_string(), "108.3");
    }

    #[test]
    fn no_record_or_flat_record_never_fires() {
        let s = closes(&[100.0, 1.0]);
        let stop = StopRule::stop_loss(PriceIndicator::close(&s), num(5.0)).unwrap();
        assert!(!stop.is_satisfied(1, None));
        let flat = TradingRecord::new(TradeType::Buy);
        assert!(!stop.is_satisfied(1, Some(&flat)));
        assert!(stop.stop_price(1, Some(&flat)).is_none());
    }

    #[test]
    fn trailing_stop_loss_ratchets_and_resets() {
        let s = closes(&[100.0, 110.0, 120.0, 130.0, 117.0, 130.0, 116.99]);
        let stop = StopRule::trailing_stop_loss(PriceIndicator::close(&s), num(10.0)).unwrap();
        let mut record = entered(TradeType::Buy, 2, 114.0);
        assert!(!stop.is_satisfied(2, Some(&record)));
        assert!(!stop.is_satisfied(3, Some(&record)));
        assert!(stop.is_satisfied(4, Some(&record)));
        assert_eq!(stop.reference_price().unwrap().to_string(), "130");

        record.exit(4, num(117.0), num(1.0)).unwrap();
        record.enter(5, num(128.0), num(1.0)).unwrap();
        assert!(!stop.is_satisfied(5, Some(&record)));
        assert!(stop.is_satisfied(6, Some(&record)));
    }

    #[test]
    fn trailing_stop_loss_short() {
        let s = closes(&[100.0, 90.0, 80.0, 70.0, 77.0, 120.0, 132.01]);
        let stop = StopRule::trailing_stop_loss(PriceIndicator::close(&s), num(10.0)).unwrap();
        let mut record = entered(TradeType::Sell, 2, 84.0);
        assert!(!stop.is_satisfied(2, Some(&record)));
        assert!(!stop.is_satisfied(3, Some(&record)));
        assert!(stop.is_satisfied(4, Some(&record)));

        record.exit(4, num(77.0), num(1.0)).unwrap();
        record.enter(5, num(128.0), num(1.0)).unwrap();
        assert!(!stop.is_satisfied(5, Some(&record)));
        assert!(stop.is_satisfied(6, Some(&record)));
    }

    #[test]
    fn same_bar_reentry_reseeds_trailing_reference() {
        let s = closes(&[100.0, 100.0, 100.0]);
        let stop = StopRule::trailing_stop_loss(PriceIndicator::close(&s), num(10.0)).unwrap();
        let mut record = entered(TradeType::Buy, 1, 200.0);
        assert!(stop.is_satisfied(1, Some(&record)));
        assert_eq!(stop.reference_price(), Some(num(200.0)));

        record.exit(1, num(100.0), num(1.0)).unwrap();
        record.enter(1, num(100.0), num(1.0)).unwrap();
        assert!(!stop.is_satisfied(2, Some(&record)));
        assert_eq!(stop.reference_price(), Some(num(100.0)));
        assert_eq!(stop.stop_price(2, Some(&record)), Some(num(90.0)));
    }

    #[test]
    fn trailing_reference_never_retreats() {
        let s = closes(&[100.0, 104.0, 108.0, 103.0, 101.0, 109.0]);
        let stop =
            StopRule::trailing_stop_loss(PriceIndicator::close(&s), num(50.0)).unwrap();
        let record = entered(TradeType::Buy, 0, 100.0);
        let mut previous = num(0.0);
        for i in 0..6 {
            stop.is_satisfied(i, Some(&record));
            let reference = stop.reference_price().unwrap();
            assert!(reference >= previous, "reference fell at {i}");
            previous = reference;
        }
        assert_eq!(previous.to_string(), "109");
    }

    #[test]
    fn fixed_amount_stop_loss() {
        let s = closes(&[100.0, 96.0, 94.0]);
        let stop = StopRule::new(
            PriceIndicator::close(&s),
            StopSide::Loss,
            StopDistance::Amount(num(5.0)),
            false,
        )
        .unwrap();
        let record = entered(TradeType::Buy, 0, 100.0);
        assert!(!stop.is_satisfied(1, Some(&record)));
        assert!(stop.is_satisfied(2, Some(&record)));
        assert_eq!(stop.type_name(), "FixedAmountStopLossRule");
    }

    fn volatility(side: StopSide, trailing: bool, s: &Arc<BarSeries>) -> StopRule {
        StopRule::new(
            PriceIndicator::close(s),
            side,
            StopDistance::Volatility {
                bar_count: 3,
                coefficient: num(1.0),
            },
            trailing,
        )
        .unwrap()
    }

    #[test]
    fn volatility_stop_loss_uses_standard_deviation() {
        // population deviation of [98, 100, 90] is 4.32, so the stop sits at 95.68
        let s = closes(&[100.0, 102.0, 98.0, 100.0, 90.0]);
        let stop = volatility(StopSide::Loss, false, &s);
        let record = entered(TradeType::Buy, 3, 100.0);
        assert!(!stop.is_satisfied(3, Some(&record)));
        assert!(stop.is_satisfied(4, Some(&record)));
        assert_relative_eq!(
            stop.stop_price(4, Some(&record)).unwrap().to_f64(),
            100.0 - (56.0_f64 / 3.0).sqrt(),
            epsilon = 1e-6
        );
        assert_eq!(stop.type_name(), "VolatilityStopLossRule");
    }

    #[test]
    fn volatility_trailing_stop_follows_the_high() {
        // at 4 the window [100, 110, 105] has deviation 4.08: trailing level
        // 110 - 4.08 = 105.92 is hit, the fixed level 95.92 is not
        let s = closes(&[100.0, 100.0, 100.0, 110.0, 105.0]);
        let trailing = volatility(StopSide::Loss, true, &s);
        let fixed = volatility(StopSide::Loss, false, &s);
        let record = entered(TradeType::Buy, 2, 100.0);
        assert!(!trailing.is_satisfied(3, Some(&record)));
        assert!(trailing.is_satisfied(4, Some(&record)));
        assert_eq!(trailing.reference_price(), Some(num(110.0)));
        assert!(!fixed.is_satisfied(4, Some(&record)));
        assert_eq!(trailing.type_name(), "VolatilityTrailingStopLossRule");
    }

    #[test]
    fn volatility_warmup_never_fires() {
        let s = closes(&[100.0, 50.0, 50.0]);
        let stop = volatility(StopSide::Loss, false, &s);
        let record = entered(TradeType::Buy, 0, 100.0);
        assert!(!stop.is_satisfied(1, Some(&record)));
        assert!(stop.stop_price(1, Some(&record)).is_none());
    }

    #[test]
    fn percentage_stop_gain_both_sides() {
        let s = closes(&[100.0, 105.0, 110.0, 95.0, 90.0]);
        let gain = StopRule::stop_gain(PriceIndicator::close(&s), num(10.0)).unwrap();
        let long = entered(TradeType::Buy, 0, 100.0);
        assert!(!gain.is_satisfied(1, Some(&long)));
        assert!(gain.is_satisfied(2, Some(&long)));

        let short = entered(TradeType::Sell, 0, 100.0);
        assert!(!gain.is_satisfied(3, Some(&short)));
        assert!(gain.is_satisfied(4, Some(&short)));
    }

    #[test]
    fn trailing_stop_gain_needs_locked_in_profit() {
        let s = closes(&[100.0, 105.0, 101.0, 120.0, 110.0]);
        let gain = StopRule::trailing_stop_gain(PriceIndicator::close(&s), num(5.0)).unwrap();
        let record = entered(TradeType::Buy, 0, 100.0);
        // extreme 105 → retrace level 99.75, below entry: no profit to protect
        assert!(!gain.is_satisfied(1, Some(&record)));
        assert!(!gain.is_satisfied(2, Some(&record)));
        // extreme 120 → level 114
        assert!(!gain.is_satisfied(3, Some(&record)));
        assert!(gain.is_satisfied(4, Some(&record)));
    }

    #[test]
    fn type_names_cover_every_combination() {
        for (side, kind, trailing, name) in TYPE_NAMES {
            assert_eq!(parse_stop_type(name), Some((side, kind, trailing)));
        }
        assert_eq!(parse_stop_type("AndRule"), None);
    }

    #[test]
    fn negative_or_nan_distance_rejected() {
        let s = closes(&[1.0]);
        assert!(StopRule::stop_loss(PriceIndicator::close(&s), num(-1.0)).is_err());
        assert!(StopRule::stop_loss(PriceIndicator::close(&s), Num::NaN).is_err());
        let zero_bars = StopDistance::AverageTrueRange {
            bar_count: 0,
            coefficient: num(1.0),
        };
        assert!(StopRule::new(PriceIndicator::close(&s), StopSide::Loss, zero_bars, false).is_err());
    }
}
