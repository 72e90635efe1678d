//! Ledger-reading rule: aggregates the positions of a trading record and
//! checks the result against a required minimum and/or maximum.
//!
//! Only positions that already existed at the evaluated index count. A
//! position enters a count once its entry index is reached. For the value
//! aggregations (amount, value, profit) its exit must also have happened by
//! then, unless it is still open. An open position contributes zero profit.
//!
//! Without a record, or with a record holding no trades, the aggregate is zero.

use crate::domain::error::EngineError;
use crate::domain::num::{Num, NumFactory};
use crate::domain::trading_record::{Position, TradingRecord};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionFilter {
    All,
    Open,
    Closed,
}

impl PositionFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionFilter::All => "ALL",
            PositionFilter::Open => "OPEN",
            PositionFilter::Closed => "CLOSED",
        }
    }

    fn apply<'a>(&self, record: &'a TradingRecord) -> Vec<&'a Position> {
        let current = record.current_position();
        let open = current.is_opened().then_some(current);
        match self {
            PositionFilter::All => record.positions().iter().chain(open).collect(),
            PositionFilter::Open => open.into_iter().collect(),
            PositionFilter::Closed => record.positions().iter().collect(),
        }
    }
}

impl FromStr for PositionFilter {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ALL" => Ok(PositionFilter::All),
            "OPEN" => Ok(PositionFilter::Open),
            "CLOSED" => Ok(PositionFilter::Closed),
            _ => Err(EngineError::rule(format!("unknown position filter {s:?}"))),
        }
    }
}

impl fmt::Display for PositionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionAggregation {
    NumberOfPositions,
    NumberOfEntryTrades,
    NumberOfExitTrades,
    /// Sum of entry amounts.
    Amount,
    /// Sum of entry price × amount.
    Value,
    NetProfit,
    /// Equal to net profit: the ledger records no trading costs.
    GrossProfit,
}

impl PositionAggregation {
    pub const ALL: [PositionAggregation; 7] = [
        PositionAggregation::NumberOfPositions,
        PositionAggregation::NumberOfEntryTrades,
        PositionAggregation::NumberOfExitTrades,
        PositionAggregation::Amount,
        PositionAggregation::Value,
        PositionAggregation::NetProfit,
        PositionAggregation::GrossProfit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PositionAggregation::NumberOfPositions => "NUMBER_OF_POSITIONS",
            PositionAggregation::NumberOfEntryTrades => "NUMBER_OF_ENTRY_TRADES",
            PositionAggregation::NumberOfExitTrades => "NUMBER_OF_EXIT_TRADES",
            PositionAggregation::Amount => "AMOUNT",
            PositionAggregation::Value => "VALUE",
            PositionAggregation::NetProfit => "NET_PROFIT",
            PositionAggregation::GrossProfit => "GROSS_PROFIT",
        }
    }

    fn apply(&self, factory: NumFactory, index: usize, positions: &[&Position]) -> Num {
        let count = |n: usize| factory.num_of_i64(n as i64);
        let sum = |f: &dyn Fn(&Position) -> Num| {
            positions
                .iter()
                .filter(|p| entered_by(p, index) && exited_by(p, index))
                .fold(factory.zero(), |acc, p| acc + f(*p))
        };
        match self {
            PositionAggregation::NumberOfPositions | PositionAggregation::NumberOfEntryTrades => {
                count(positions.iter().filter(|p| entered_by(p, index)).count())
            }
            PositionAggregation::NumberOfExitTrades => count(
                positions
                    .iter()
                    .filter(|p| p.exit().is_some_and(|t| t.index <= index))
                    .count(),
            ),
            PositionAggregation::Amount => {
                sum(&|p| p.entry().map_or(factory.zero(), |t| t.amount))
            }
            PositionAggregation::Value => {
                sum(&|p| p.entry().map_or(factory.zero(), |t| t.price * t.amount))
            }
            PositionAggregation::NetProfit | PositionAggregation::GrossProfit => {
                sum(&|p| p.profit().unwrap_or(factory.zero()))
            }
        }
    }
}

impl FromStr for PositionAggregation {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase();
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == wanted)
            .ok_or_else(|| EngineError::rule(format!("unknown position aggregation {s:?}")))
    }
}

impl fmt::Display for PositionAggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn entered_by(position: &Position, index: usize) -> bool {
    position.entry().is_some_and(|t| t.index <= index)
}

/// Open positions count as exited-by for value aggregations.
fn exited_by(position: &Position, index: usize) -> bool {
    position.exit().is_none_or(|t| t.index <= index)
}

#[derive(Debug, Clone)]
pub struct PositionRule {
    filter: PositionFilter,
    aggregation: PositionAggregation,
    minimum: Option<Num>,
    maximum: Option<Num>,
    factory: NumFactory,
}

impl PositionRule {
    /// At least one bound is required; bounds must be numbers with
    /// `minimum <= maximum`.
    pub fn new(
        filter: PositionFilter,
        aggregation: PositionAggregation,
        minimum: Option<Num>,
        maximum: Option<Num>,
    ) -> Result<Self, EngineError> {
        let Some(bound) = minimum.or(maximum) else {
            return Err(EngineError::rule("position rule needs a minimum or a maximum"));
        };
        if [minimum, maximum].into_iter().flatten().any(|b| b.is_nan()) {
            return Err(EngineError::rule("position rule bounds must be numbers, got NaN"));
        }
        let factory = bound.factory().unwrap_or(NumFactory::Decimal);
        if let (Some(min), Some(max)) = (minimum, maximum) {
            if min > max {
                return Err(EngineError::rule(format!(
                    "position rule minimum {min} exceeds maximum {max}"
                )));
            }
        }
        Ok(Self {
            filter,
            aggregation,
            minimum,
            maximum,
            factory,
        })
    }

    pub fn filter(&self) -> PositionFilter {
        self.filter
    }

    pub fn aggregation(&self) -> PositionAggregation {
        self.aggregation
    }

    pub fn minimum(&self) -> Option<Num> {
        self.minimum
    }

    pub fn maximum(&self) -> Option<Num> {
        self.maximum
    }

    /// Aggregated value of the filtered positions at `index`.
    pub fn aggregate(&self, index: usize, record: Option<&TradingRecord>) -> Num {
        match record {
            Some(record) if !record.trades().is_empty() => {
                let positions = self.filter.apply(record);
                self.aggregation.apply(self.factory, index, &positions)
            }
            _ => self.factory.zero(),
        }
    }

    pub fn is_satisfied(&self, index: usize, record: Option<&TradingRecord>) -> bool {
        let value = self.aggregate(index, record);
        self.minimum.is_none_or(|min| min <= value) && self.maximum.is_none_or(|max| value <= max)
    }
}
