//! Trading rules.
//!
//! A [`Rule`] is an immutable predicate over `(index, trading record)`. Every
//! kind is a [`RuleKind`] variant holding its operands; evaluation lives in
//! [`crate::domain::rule_eval`].
//!
//! Rules are shared through [`RuleRef`] (`Arc<Rule>`), so a sub-rule may be
//! reused by several parents. Constructors that take parameters validate them
//! up front and return an error instead of building a rule that could never
//! be satisfied as intended.

use crate::domain::calendar::CalendarRule;
use crate::domain::error::EngineError;
use crate::domain::indicator::{ConstantIndicator, Indicator, IndicatorRef};
use crate::domain::num::Num;
use crate::domain::position_rule::PositionRule;
use crate::domain::rule_eval;
use crate::domain::rule_name::{RuleName, RuleSummary, SummaryComponent};
use crate::domain::stop::StopRule;
use crate::domain::trading_record::{TradeType, TradingRecord};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

pub type RuleRef = Arc<Rule>;

/// Indicator comparisons evaluated at a single index (or, for crosses, the
/// index and its predecessor).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Over,
    Under,
    IsEqual,
    CrossedUp,
    CrossedDown,
}

impl Comparison {
    pub const ALL: [Comparison; 5] = [
        Comparison::Over,
        Comparison::Under,
        Comparison::IsEqual,
        Comparison::CrossedUp,
        Comparison::CrossedDown,
    ];

    pub fn type_name(&self) -> &'static str {
        match self {
            Comparison::Over => "OverIndicatorRule",
            Comparison::Under => "UnderIndicatorRule",
            Comparison::IsEqual => "IsEqualRule",
            Comparison::CrossedUp => "CrossedUpIndicatorRule",
            Comparison::CrossedDown => "CrossedDownIndicatorRule",
        }
    }

    pub fn from_type_name(name: &str) -> Option<Comparison> {
        Self::ALL.into_iter().find(|c| c.type_name() == name)
    }
}

/// One step of a [`RuleKind::Chain`]: `rule` must fire within `max_bars`
/// bars after the previous step fired.
#[derive(Debug, Clone)]
pub struct ChainLink {
    pub rule: RuleRef,
    pub max_bars: usize,
}

impl ChainLink {
    pub fn new(rule: RuleRef, max_bars: usize) -> Self {
        Self { rule, max_bars }
    }
}

type PredicateFn = dyn Fn(usize, Option<&TradingRecord>) -> bool + Send + Sync;

/// Caller-supplied predicate. Has no descriptor form.
#[derive(Clone)]
pub struct Predicate(Arc<PredicateFn>);

impl Predicate {
    pub(crate) fn call(&self, index: usize, record: Option<&TradingRecord>) -> bool {
        (self.0)(index, record)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate(..)")
    }
}

#[derive(Debug)]
pub enum RuleKind {
    Boolean(bool),
    Fixed(Vec<usize>),
    And(RuleRef, RuleRef),
    Or(RuleRef, RuleRef),
    Xor(RuleRef, RuleRef),
    Not(RuleRef),
    AndWithThreshold {
        first: RuleRef,
        second: RuleRef,
        threshold: usize,
    },
    OrWithThreshold {
        first: RuleRef,
        second: RuleRef,
        threshold: usize,
    },
    Vote {
        required: usize,
        rules: Vec<RuleRef>,
    },
    Chain {
        first: RuleRef,
        links: Vec<ChainLink>,
    },
    /// `fired` flips on the first satisfied call and stays set.
    JustOnce {
        rule: RuleRef,
        fired: AtomicBool,
    },
    WaitFor {
        trade_type: TradeType,
        bars: usize,
    },
    Compare {
        op: Comparison,
        first: IndicatorRef,
        second: IndicatorRef,
    },
    InPipe {
        reference: IndicatorRef,
        upper: IndicatorRef,
        lower: IndicatorRef,
    },
    Stop(StopRule),
    Position(PositionRule),
    Calendar(CalendarRule),
    Predicate(Predicate),
}

impl RuleKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            RuleKind::Boolean(_) => "BooleanRule",
            RuleKind::Fixed(_) => "FixedRule",
            RuleKind::And(..) => "AndRule",
            RuleKind::Or(..) => "OrRule",
            RuleKind::Xor(..) => "XorRule",
            RuleKind::Not(_) => "NotRule",
            RuleKind::AndWithThreshold { .. } => "AndWithThresholdRule",
            RuleKind::OrWithThreshold { .. } => "OrWithThresholdRule",
            RuleKind::Vote { .. } => "VoteRule",
            RuleKind::Chain { .. } => "ChainRule",
            RuleKind::JustOnce { .. } => "JustOnceRule",
            RuleKind::WaitFor { .. } => "WaitForRule",
            RuleKind::Compare { op, .. } => op.type_name(),
            RuleKind::InPipe { .. } => "InPipeRule",
            RuleKind::Stop(stop) => stop.type_name(),
            RuleKind::Position(_) => "PositionRule",
            RuleKind::Calendar(calendar) => calendar.type_name(),
            RuleKind::Predicate(_) => "PredicateRule",
        }
    }

    /// Child rules in operand order. Empty for leaves.
    pub fn children(&self) -> Vec<&RuleRef> {
        match self {
            RuleKind::And(a, b) | RuleKind::Or(a, b) | RuleKind::Xor(a, b) => vec![a, b],
            RuleKind::AndWithThreshold { first, second, .. }
            | RuleKind::OrWithThreshold { first, second, .. } => vec![first, second],
            RuleKind::Not(rule) | RuleKind::JustOnce { rule, .. } => vec![rule],
            RuleKind::Vote { rules, .. } => rules.iter().collect(),
            RuleKind::Chain { first, links } => std::iter::once(first)
                .chain(links.iter().map(|link| &link.rule))
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct Rule {
    kind: RuleKind,
    name: RuleName,
}

impl Rule {
    pub fn from_kind(kind: RuleKind) -> RuleRef {
        Arc::new(Rule {
            kind,
            name: RuleName::default(),
        })
    }

    pub fn boolean(value: bool) -> RuleRef {
        Self::from_kind(RuleKind::Boolean(value))
    }

    /// Satisfied exactly at the given indexes.
    pub fn fixed(indexes: impl IntoIterator<Item = usize>) -> RuleRef {
        Self::from_kind(RuleKind::Fixed(indexes.into_iter().collect()))
    }

    pub fn and(self: Arc<Self>, other: RuleRef) -> RuleRef {
        Self::from_kind(RuleKind::And(self, other))
    }

    pub fn or(self: Arc<Self>, other: RuleRef) -> RuleRef {
        Self::from_kind(RuleKind::Or(self, other))
    }

    pub fn xor(self: Arc<Self>, other: RuleRef) -> RuleRef {
        Self::from_kind(RuleKind::Xor(self, other))
    }

    pub fn negation(self: Arc<Self>) -> RuleRef {
        Self::from_kind(RuleKind::Not(self))
    }

    /// Both rules fired somewhere in the trailing window of `threshold` bars.
    pub fn and_with_threshold(
        first: RuleRef,
        second: RuleRef,
        threshold: usize,
    ) -> Result<RuleRef, EngineError> {
        check_threshold(threshold)?;
        Ok(Self::from_kind(RuleKind::AndWithThreshold {
            first,
            second,
            threshold,
        }))
    }

    /// Either rule fired somewhere in the trailing window of `threshold` bars.
    pub fn or_with_threshold(
        first: RuleRef,
        second: RuleRef,
        threshold: usize,
    ) -> Result<RuleRef, EngineError> {
        check_threshold(threshold)?;
        Ok(Self::from_kind(RuleKind::OrWithThreshold {
            first,
            second,
            threshold,
        }))
    }

    /// At least `required` of `rules` are satisfied.
    pub fn vote(required: usize, rules: Vec<RuleRef>) -> Result<RuleRef, EngineError> {
        if rules.is_empty() {
            return Err(EngineError::rule("vote needs at least one rule"));
        }
        if required == 0 || required > rules.len() {
            return Err(EngineError::rule(format!(
                "required votes must be in [1, {}], got {required}",
                rules.len()
            )));
        }
        Ok(Self::from_kind(RuleKind::Vote { required, rules }))
    }

    pub fn chain(first: RuleRef, links: Vec<ChainLink>) -> RuleRef {
        Self::from_kind(RuleKind::Chain { first, links })
    }

    pub fn just_once(rule: RuleRef) -> RuleRef {
        Self::from_kind(RuleKind::JustOnce {
            rule,
            fired: AtomicBool::new(false),
        })
    }

    /// At least `bars` bars since the last trade of `trade_type`.
    pub fn wait_for(trade_type: TradeType, bars: usize) -> RuleRef {
        Self::from_kind(RuleKind::WaitFor { trade_type, bars })
    }

    pub fn compare(op: Comparison, first: IndicatorRef, second: IndicatorRef) -> RuleRef {
        Self::from_kind(RuleKind::Compare { op, first, second })
    }

    pub fn over(first: IndicatorRef, second: IndicatorRef) -> RuleRef {
        Self::compare(Comparison::Over, first, second)
    }

    pub fn under(first: IndicatorRef, second: IndicatorRef) -> RuleRef {
        Self::compare(Comparison::Under, first, second)
    }

    pub fn is_equal(first: IndicatorRef, second: IndicatorRef) -> RuleRef {
        Self::compare(Comparison::IsEqual, first, second)
    }

    pub fn crossed_up(first: IndicatorRef, second: IndicatorRef) -> RuleRef {
        Self::compare(Comparison::CrossedUp, first, second)
    }

    pub fn crossed_down(first: IndicatorRef, second: IndicatorRef) -> RuleRef {
        Self::compare(Comparison::CrossedDown, first, second)
    }

    /// `indicator > threshold`, with the threshold as a constant indicator.
    pub fn over_value(indicator: IndicatorRef, threshold: Num) -> RuleRef {
        let constant: IndicatorRef = Arc::new(ConstantIndicator::new(indicator.series(), threshold));
        Self::over(indicator, constant)
    }

    pub fn under_value(indicator: IndicatorRef, threshold: Num) -> RuleRef {
        let constant: IndicatorRef = Arc::new(ConstantIndicator::new(indicator.series(), threshold));
        Self::under(indicator, constant)
    }

    /// `lower <= reference <= upper`.
    pub fn in_pipe(reference: IndicatorRef, upper: IndicatorRef, lower: IndicatorRef) -> RuleRef {
        Self::from_kind(RuleKind::InPipe {
            reference,
            upper,
            lower,
        })
    }

    pub fn stop(stop: StopRule) -> RuleRef {
        Self::from_kind(RuleKind::Stop(stop))
    }

    /// Bounds an aggregate over the trading record's positions.
    pub fn position(position: PositionRule) -> RuleRef {
        Self::from_kind(RuleKind::Position(position))
    }

    pub fn calendar(calendar: CalendarRule) -> RuleRef {
        Self::from_kind(RuleKind::Calendar(calendar))
    }

    /// Wraps a closure as a rule named `name`.
    pub fn predicate<F>(name: &str, predicate: F) -> RuleRef
    where
        F: Fn(usize, Option<&TradingRecord>) -> bool + Send + Sync + 'static,
    {
        let rule = Self::from_kind(RuleKind::Predicate(Predicate(Arc::new(predicate))));
        rule.set_name(Some(name));
        rule
    }

    pub fn kind(&self) -> &RuleKind {
        &self.kind
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn children(&self) -> Vec<&RuleRef> {
        self.kind.children()
    }

    pub fn is_satisfied(&self, index: usize, record: Option<&TradingRecord>) -> bool {
        rule_eval::evaluate(self, index, record)
    }

    /// Evaluates without a trading record.
    pub fn is_satisfied_at(&self, index: usize) -> bool {
        self.is_satisfied(index, None)
    }

    /// Assigns a custom label; `None` or blank reverts to the default summary.
    pub fn set_name(&self, name: Option<&str>) {
        self.name.set_custom(name);
    }

    pub fn with_name(self: Arc<Self>, name: &str) -> RuleRef {
        self.set_name(Some(name));
        self
    }

    pub fn custom_name(&self) -> Option<String> {
        self.name.custom()
    }

    /// Custom label if set, otherwise the default summary text.
    pub fn name(&self) -> String {
        match self.custom_name() {
            Some(name) => name,
            None => self.default_name(),
        }
    }

    pub fn default_name(&self) -> String {
        self.summary().as_str().to_string()
    }

    /// Structural default label, computed once and memoized.
    pub fn summary(&self) -> Arc<RuleSummary> {
        self.name.default_or_compute(|| {
            let components = self
                .children()
                .into_iter()
                .map(|child| match child.custom_name() {
                    Some(label) => SummaryComponent::Label(label),
                    None => SummaryComponent::Summary(child.summary()),
                })
                .collect();
            RuleSummary::new(self.type_name(), components)
        })
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

fn check_threshold(threshold: usize) -> Result<(), EngineError> {
    if threshold < 1 {
        return Err(EngineError::rule("threshold must be at least 1"));
    }
    Ok(())
}
