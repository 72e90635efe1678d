//! Rule evaluation engine.
//!
//! # Evaluation Semantics
//!
//! - `AND`: short-circuits on the first `false`, `OR` on the first `true`
//! - Threshold rules: need `index + 1 >= k`; each operand may fire anywhere in
//!   the trailing window `[index - k + 1, index]`
//! - Comparisons: any `NaN` operand evaluates to `false`; crosses return
//!   `false` at index 0
//! - Chain: the last link fires at `index`; every earlier rule fired no more
//!   than `max_bars` bars before the rule that follows it
//! - Just-once: the first satisfied call wins, in call order
//! - Stop and wait-for rules are `false` without a trading record; a
//!   position rule reads a missing record as zero positions

use crate::domain::indicator::{Indicator, IndicatorRef};
use crate::domain::rule::{ChainLink, Comparison, Rule, RuleKind, RuleRef};
use crate::domain::trading_record::{TradeType, TradingRecord};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::Level;

pub fn evaluate(rule: &Rule, index: usize, record: Option<&TradingRecord>) -> bool {
    let satisfied = match rule.kind() {
        RuleKind::Boolean(value) => *value,
        RuleKind::Fixed(indexes) => indexes.contains(&index),
        RuleKind::And(a, b) => a.is_satisfied(index, record) && b.is_satisfied(index, record),
        RuleKind::Or(a, b) => a.is_satisfied(index, record) || b.is_satisfied(index, record),
        RuleKind::Xor(a, b) => a.is_satisfied(index, record) ^ b.is_satisfied(index, record),
        RuleKind::Not(inner) => !inner.is_satisfied(index, record),
        RuleKind::AndWithThreshold {
            first,
            second,
            threshold,
        } => {
            within_window(first, index, *threshold, record)
                && within_window(second, index, *threshold, record)
        }
        RuleKind::OrWithThreshold {
            first,
            second,
            threshold,
        } => {
            within_window(first, index, *threshold, record)
                || within_window(second, index, *threshold, record)
        }
        RuleKind::Vote { required, rules } => {
            let votes = rules
                .iter()
                .filter(|r| r.is_satisfied(index, record))
                .count();
            votes >= *required
        }
        RuleKind::Chain { first, links } => chain_resolves(first, links, index, record),
        RuleKind::JustOnce { rule, fired } => just_once(rule, fired, index, record),
        RuleKind::WaitFor { trade_type, bars } => waited(*trade_type, *bars, index, record),
        RuleKind::Compare { op, first, second } => compare(*op, first, second, index),
        RuleKind::InPipe {
            reference,
            upper,
            lower,
        } => {
            let (value, upper, lower) = (
                reference.value(index),
                upper.value(index),
                lower.value(index),
            );
            value <= upper && value >= lower
        }
        RuleKind::Stop(stop) => stop.is_satisfied(index, record),
        RuleKind::Position(position) => position.is_satisfied(index, record),
        RuleKind::Calendar(calendar) => calendar.is_satisfied(index),
        RuleKind::Predicate(predicate) => predicate.call(index, record),
    };

    if tracing::enabled!(Level::TRACE) {
        tracing::trace!(
            rule = %rule.name(),
            kind = rule.type_name(),
            index,
            satisfied,
            "rule evaluated"
        );
    }
    satisfied
}

/// True when `rule` fired somewhere in the trailing window of `threshold`
/// bars ending at `index`.
fn within_window(
    rule: &RuleRef,
    index: usize,
    threshold: usize,
    record: Option<&TradingRecord>,
) -> bool {
    if index + 1 < threshold {
        return false;
    }
    let start = index + 1 - threshold;
    (start..=index).any(|i| rule.is_satisfied(i, record))
}

/// Walks the chain backwards from the last link, carrying the full set of
/// indexes at which each rule could have fired. Keeping every candidate
/// rather than the nearest one matters: an earlier firing of a link can be
/// the only one close enough to its predecessor.
fn chain_resolves(
    first: &RuleRef,
    links: &[ChainLink],
    index: usize,
    record: Option<&TradingRecord>,
) -> bool {
    let Some(last) = links.last() else {
        return first.is_satisfied(index, record);
    };
    if !last.rule.is_satisfied(index, record) {
        return false;
    }

    // Ascending firing indexes of the link currently being resolved.
    let mut firings = vec![index];
    for (pos, link) in links.iter().enumerate().rev() {
        let previous = if pos == 0 {
            first
        } else {
            &links[pos - 1].rule
        };
        let Some(&latest) = firings.last() else {
            return false;
        };
        let earliest = firings[0].saturating_sub(link.max_bars);
        let candidates: Vec<usize> = (earliest..=latest)
            .filter(|&t| {
                // the next firing at or after t must be within max_bars
                let next = firings.partition_point(|&f| f < t);
                firings.get(next).is_some_and(|&f| f - t <= link.max_bars)
            })
            .filter(|&t| previous.is_satisfied(t, record))
            .collect();
        if candidates.is_empty() {
            return false;
        }
        firings = candidates;
    }
    true
}

fn just_once(
    rule: &RuleRef,
    fired: &AtomicBool,
    index: usize,
    record: Option<&TradingRecord>,
) -> bool {
    if fired.load(Ordering::Acquire) {
        return false;
    }
    rule.is_satisfied(index, record)
        && fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
}

fn waited(
    trade_type: TradeType,
    bars: usize,
    index: usize,
    record: Option<&TradingRecord>,
) -> bool {
    let Some(record) = record else {
        return false;
    };
    record
        .trades()
        .iter()
        .rev()
        .find(|t| t.trade_type == trade_type && t.index <= index)
        .is_some_and(|t| index - t.index >= bars)
}

fn compare(op: Comparison, first: &IndicatorRef, second: &IndicatorRef, index: usize) -> bool {
    let (a, b) = (first.value(index), second.value(index));
    if a.is_nan() || b.is_nan() {
        return false;
    }
    match op {
        Comparison::Over => a > b,
        Comparison::Under => a < b,
        Comparison::IsEqual => a == b,
        Comparison::CrossedUp | Comparison::CrossedDown => {
            if index == 0 {
                return false;
            }
            let (pa, pb) = (first.value(index - 1), second.value(index - 1));
            if pa.is_nan() || pb.is_nan() {
                return false;
            }
            if op == Comparison::CrossedUp {
                a > b && pa <= pb
            } else {
                a < b && pa >= pb
            }
        }
    }
}
