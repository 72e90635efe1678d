//! Trade ledger: trades, positions and the trading record.
//!
//! Rules only read a [`TradingRecord`]; the caller driving a strategy owns it
//! and appends entries and exits.

use crate::domain::error::EngineError;
use crate::domain::num::Num;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TradeType {
    Buy,
    Sell,
}

impl TradeType {
    pub fn complement(&self) -> TradeType {
        match self {
            TradeType::Buy => TradeType::Sell,
            TradeType::Sell => TradeType::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeType::Buy => "BUY",
            TradeType::Sell => "SELL",
        }
    }
}

impl fmt::Display for TradeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Ok(TradeType::Buy),
            "SELL" => Ok(TradeType::Sell),
            _ => Err(EngineError::TradeInvalid {
                reason: format!("unknown trade type {s:?}"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub trade_type: TradeType,
    pub index: usize,
    pub price: Num,
    pub amount: Num,
}

#[derive(Debug, Clone)]
pub struct Position {
    starting_type: TradeType,
    entry: Option<Trade>,
    exit: Option<Trade>,
}

impl Position {
    pub fn new(starting_type: TradeType) -> Self {
        Self {
            starting_type,
            entry: None,
            exit: None,
        }
    }

    pub fn starting_type(&self) -> TradeType {
        self.starting_type
    }

    pub fn entry(&self) -> Option<&Trade> {
        self.entry.as_ref()
    }

    pub fn exit(&self) -> Option<&Trade> {
        self.exit.as_ref()
    }

    pub fn is_new(&self) -> bool {
        self.entry.is_none()
    }

    pub fn is_opened(&self) -> bool {
        self.entry.is_some() && self.exit.is_none()
    }

    pub fn is_closed(&self) -> bool {
        self.exit.is_some()
    }

    /// Realised profit of a closed position: (exit - entry) * amount for a
    /// long, the reverse for a short.
    pub fn profit(&self) -> Option<Num> {
        let (entry, exit) = (self.entry.as_ref()?, self.exit.as_ref()?);
        let diff = match entry.trade_type {
            TradeType::Buy => exit.price - entry.price,
            TradeType::Sell => entry.price - exit.price,
        };
        Some(diff * entry.amount)
    }

    fn operate(&mut self, index: usize, price: Num, amount: Num) -> Result<Trade, EngineError> {
        match (&self.entry, &self.exit) {
            (None, _) => {
                let trade = Trade {
                    trade_type: self.starting_type,
                    index,
                    price,
                    amount,
                };
                self.entry = Some(trade.clone());
                Ok(trade)
            }
            (Some(entry), None) => {
                if index < entry.index {
                    return Err(EngineError::TradeInvalid {
                        reason: format!("exit at {index} precedes entry at {}", entry.index),
                    });
                }
                let trade = Trade {
                    trade_type: self.starting_type.complement(),
                    index,
                    price,
                    amount,
                };
                self.exit = Some(trade.clone());
                Ok(trade)
            }
            (Some(_), Some(_)) => Err(EngineError::TradeInvalid {
                reason: "position is already closed".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TradingRecord {
    starting_type: TradeType,
    current: Position,
    positions: Vec<Position>,
    trades: Vec<Trade>,
}

impl TradingRecord {
    pub fn new(starting_type: TradeType) -> Self {
        Self {
            starting_type,
            current: Position::new(starting_type),
            positions: Vec::new(),
            trades: Vec::new(),
        }
    }

    pub fn starting_type(&self) -> TradeType {
        self.starting_type
    }

    /// Enters if flat, exits if a position is open.
    pub fn operate(&mut self, index: usize, price: Num, amount: Num) -> Result<(), EngineError> {
        if let Some(last) = self.trades.last() {
            if index < last.index {
                return Err(EngineError::TradeInvalid {
                    reason: format!("trade at {index} precedes last trade at {}", last.index),
                });
            }
        }
        let trade = self.current.operate(index, price, amount)?;
        self.trades.push(trade);
        if self.current.is_closed() {
            let closed = std::mem::replace(&mut self.current, Position::new(self.starting_type));
            self.positions.push(closed);
        }
        Ok(())
    }

    pub fn enter(&mut self, index: usize, price: Num, amount: Num) -> Result<(), EngineError> {
        if !self.current.is_new() {
            return Err(EngineError::TradeInvalid {
                reason: "a position is already open".to_string(),
            });
        }
        self.operate(index, price, amount)
    }

    pub fn exit(&mut self, index: usize, price: Num, amount: Num) -> Result<(), EngineError> {
        if !self.current.is_opened() {
            return Err(EngineError::TradeInvalid {
                reason: "no open position to exit".to_string(),
            });
        }
        self.operate(index, price, amount)
    }

    /// True when no position is open.
    pub fn is_closed(&self) -> bool {
        !self.current.is_opened()
    }

    pub fn current_position(&self) -> &Position {
        &self.current
    }

    /// Closed positions, oldest first.
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn last_trade(&self) -> Option<&Trade> {
        self.trades.last()
    }

    pub fn last_trade_of(&self, trade_type: TradeType) -> Option<&Trade> {
        self.trades.iter().rev().find(|t| t.trade_type == trade_type)
    }

    pub fn last_entry(&self) -> Option<&Trade> {
        self.last_trade_of(self.starting_type)
    }

    pub fn last_exit(&self) -> Option<&Trade> {
        self.last_trade_of(self.starting_type.complement())
    }
}
