//! Core domain types and logic.

pub mod num;
pub mod bar;
pub mod indicator;
pub mod trading_record;
pub mod rule;
pub mod rule_name;
pub mod rule_eval;
pub mod stop;
pub mod position_rule;
pub mod calendar;
pub mod descriptor;
pub mod rule_codec;
pub mod config;
pub mod error;
