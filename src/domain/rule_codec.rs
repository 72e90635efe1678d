//! Conversion between rule graphs and [`ComponentDescriptor`] trees.
//!
//! Each rule kind maps to one descriptor `type`. Operand rules become
//! `components` in operand order, scalar settings become `parameters`, and a
//! custom rule name travels as the descriptor `label`. Indicator operands are
//! described through [`Indicator::describe`] and rebuilt through the
//! indicator registry against the series passed to [`RuleCodec::from_descriptor`].
//!
//! Kinds with no descriptor form (custom predicates, or rules over an
//! indicator that cannot describe itself) yield [`CodecError::Unsupported`].

use crate::domain::bar::BarSeries;
use crate::domain::calendar::{
    CalendarFilter, CalendarRule, TimeRange, parse_weekday, weekday_name,
};
use crate::domain::descriptor::{ComponentDescriptor, Param, int_value};
use crate::domain::error::{CodecError, EngineError};
use crate::domain::indicator::registry::datetime_from_descriptor;
use crate::domain::indicator::{Indicator, IndicatorRef, indicator_from_descriptor};
use crate::domain::num::{Num, NumFactory};
use crate::domain::position_rule::{PositionAggregation, PositionFilter, PositionRule};
use crate::domain::rule::{ChainLink, Comparison, Rule, RuleKind, RuleRef};
use crate::domain::stop::{DistanceKind, StopDistance, StopRule, StopSide, parse_stop_type};
use crate::domain::trading_record::TradeType;
use std::sync::Arc;
use tracing::{debug, warn};

/// Describes and rebuilds rules.
///
/// A strict codec rejects descriptors carrying parameters the rule kind does
/// not know; the default lenient codec logs and ignores them.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleCodec {
    strict: bool,
}

impl RuleCodec {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn describe(&self, rule: &Rule) -> Result<ComponentDescriptor, CodecError> {
        let type_name = rule.type_name();
        let builder = ComponentDescriptor::builder(type_name).label(rule.custom_name());
        let described = match rule.kind() {
            RuleKind::Boolean(value) => builder.param("value", *value),
            RuleKind::Fixed(indexes) => builder.param("indexes", indexes.clone()),
            RuleKind::And(..) | RuleKind::Or(..) | RuleKind::Xor(..) | RuleKind::Not(_) => {
                builder.components(self.describe_children(rule)?)
            }
            RuleKind::AndWithThreshold { threshold, .. }
            | RuleKind::OrWithThreshold { threshold, .. } => builder
                .param("threshold", *threshold)
                .components(self.describe_children(rule)?),
            RuleKind::Vote { required, .. } => builder
                .param("requiredVotes", *required)
                .components(self.describe_children(rule)?),
            RuleKind::Chain { links, .. } => {
                let max_bars: Vec<usize> = links.iter().map(|link| link.max_bars).collect();
                builder
                    .param("maxBars", max_bars)
                    .components(self.describe_children(rule)?)
            }
            RuleKind::JustOnce { .. } => builder.components(self.describe_children(rule)?),
            RuleKind::WaitFor { trade_type, bars } => builder
                .param("tradeType", trade_type.as_str())
                .param("barCount", *bars),
            RuleKind::Compare { first, second, .. } => builder
                .component(describe_indicator(type_name, first)?)
                .component(describe_indicator(type_name, second)?),
            RuleKind::InPipe {
                reference,
                upper,
                lower,
            } => builder
                .component(describe_indicator(type_name, reference)?)
                .component(describe_indicator(type_name, upper)?)
                .component(describe_indicator(type_name, lower)?),
            RuleKind::Stop(stop) => {
                let builder = match stop.distance() {
                    StopDistance::Percentage(pct) => builder.param("percentage", pct),
                    StopDistance::Amount(amount) => builder.param("amount", amount),
                    StopDistance::AverageTrueRange {
                        bar_count,
                        coefficient,
                    }
                    | StopDistance::Volatility {
                        bar_count,
                        coefficient,
                    } => builder
                        .param("barCount", bar_count)
                        .param("coefficient", coefficient),
                };
                builder.component(describe_indicator(type_name, stop.price())?)
            }
            RuleKind::Position(position) => {
                let builder = builder
                    .param("positionFilter", position.filter().as_str())
                    .param("aggregationType", position.aggregation().as_str());
                let builder = match position.minimum() {
                    Some(min) => builder.param("requiredMinimum", min),
                    None => builder,
                };
                match position.maximum() {
                    Some(max) => builder.param("requiredMaximum", max),
                    None => builder,
                }
            }
            RuleKind::Calendar(calendar) => {
                let time = calendar.time().describe().ok_or_else(|| unsupported(type_name))?;
                let builder = match calendar.filter() {
                    CalendarFilter::TimeRanges(ranges) => builder.param(
                        "ranges",
                        ranges.iter().map(TimeRange::to_string).collect::<Vec<_>>(),
                    ),
                    CalendarFilter::DaysOfWeek(days) => builder.param(
                        "days",
                        days.iter().map(|d| weekday_name(*d)).collect::<Vec<_>>(),
                    ),
                    CalendarFilter::HoursOfDay(hours) => {
                        builder.param("hours", hours.iter().copied().collect::<Vec<u32>>())
                    }
                    CalendarFilter::MinutesOfHour(minutes) => {
                        builder.param("minutes", minutes.iter().copied().collect::<Vec<u32>>())
                    }
                };
                builder.component(time)
            }
            RuleKind::Predicate(_) => return Err(unsupported(type_name)),
        };
        Ok(described.build())
    }

    fn describe_children(&self, rule: &Rule) -> Result<Vec<ComponentDescriptor>, CodecError> {
        rule.children()
            .into_iter()
            .map(|child| self.describe(child))
            .collect()
    }

    /// Rebuilds a rule, resolving indicator operands against `series`.
    pub fn from_descriptor(
        &self,
        series: &Arc<BarSeries>,
        descriptor: &ComponentDescriptor,
    ) -> Result<RuleRef, CodecError> {
        let type_name = descriptor.type_name.as_str();
        if type_name.trim().is_empty() {
            return Err(CodecError::MissingType);
        }
        let Some(known) = known_parameters(type_name) else {
            return Err(CodecError::UnknownType(type_name.to_string()));
        };
        self.check_parameters(descriptor, known)?;

        let rule = match type_name {
            "BooleanRule" => Rule::boolean(descriptor.bool_param("value")?),
            "FixedRule" => {
                let indexes = descriptor
                    .list_param("indexes")?
                    .iter()
                    .map(|p| index_value(descriptor, p))
                    .collect::<Result<Vec<_>, _>>()?;
                Rule::fixed(indexes)
            }
            "AndRule" | "OrRule" | "XorRule" => {
                let [a, b] = self.rules::<2>(series, descriptor)?;
                match type_name {
                    "AndRule" => a.and(b),
                    "OrRule" => a.or(b),
                    _ => a.xor(b),
                }
            }
            "NotRule" => {
                let [inner] = self.rules::<1>(series, descriptor)?;
                inner.negation()
            }
            "AndWithThresholdRule" | "OrWithThresholdRule" => {
                let threshold = descriptor.usize_param("threshold")?;
                let [a, b] = self.rules::<2>(series, descriptor)?;
                if type_name == "AndWithThresholdRule" {
                    Rule::and_with_threshold(a, b, threshold)?
                } else {
                    Rule::or_with_threshold(a, b, threshold)?
                }
            }
            "VoteRule" => {
                let required = descriptor.usize_param("requiredVotes")?;
                Rule::vote(required, self.all_rules(series, descriptor)?)?
            }
            "ChainRule" => {
                let max_bars = descriptor
                    .list_param("maxBars")?
                    .iter()
                    .map(|p| index_value(descriptor, p))
                    .collect::<Result<Vec<_>, _>>()?;
                let mut rules = self.all_rules(series, descriptor)?.into_iter();
                let first = rules
                    .next()
                    .ok_or_else(|| descriptor.malformed("chain needs a first rule"))?;
                let rules: Vec<RuleRef> = rules.collect();
                if rules.len() != max_bars.len() {
                    return Err(descriptor.malformed(format!(
                        "{} links but {} maxBars values",
                        rules.len(),
                        max_bars.len()
                    )));
                }
                let links = rules
                    .into_iter()
                    .zip(max_bars)
                    .map(|(rule, max_bars)| ChainLink::new(rule, max_bars))
                    .collect();
                Rule::chain(first, links)
            }
            "JustOnceRule" => {
                let [inner] = self.rules::<1>(series, descriptor)?;
                Rule::just_once(inner)
            }
            "WaitForRule" => {
                let trade_type: TradeType = descriptor
                    .text_param("tradeType")?
                    .parse()
                    .map_err(|_| descriptor.malformed("tradeType must be BUY or SELL"))?;
                Rule::wait_for(trade_type, descriptor.usize_param("barCount")?)
            }
            "PositionRule" => Rule::position(position_from_descriptor(series.factory(), descriptor)?),
            "InPipeRule" => {
                let [reference, upper, lower] = indicators::<3>(series, descriptor)?;
                Rule::in_pipe(reference, upper, lower)
            }
            "PredicateRule" => return Err(unsupported(type_name)),
            _ => {
                if let Some(op) = Comparison::from_type_name(type_name) {
                    let [first, second] = indicators::<2>(series, descriptor)?;
                    Rule::compare(op, first, second)
                } else if let Some((side, kind, trailing)) = parse_stop_type(type_name) {
                    Rule::stop(stop_from_descriptor(series, descriptor, side, kind, trailing)?)
                } else {
                    Rule::calendar(calendar_from_descriptor(series, descriptor)?)
                }
            }
        };
        rule.set_name(descriptor.label.as_deref());
        Ok(rule)
    }

    fn check_parameters(
        &self,
        descriptor: &ComponentDescriptor,
        known: &[&str],
    ) -> Result<(), CodecError> {
        for key in descriptor.parameters.keys() {
            if known.contains(&key) {
                continue;
            }
            if self.strict {
                return Err(descriptor.malformed(format!("unknown parameter {key}")));
            }
            warn!(kind = %descriptor.type_name, key, "ignoring unknown descriptor parameter");
        }
        Ok(())
    }

    fn all_rules(
        &self,
        series: &Arc<BarSeries>,
        descriptor: &ComponentDescriptor,
    ) -> Result<Vec<RuleRef>, CodecError> {
        descriptor
            .components
            .iter()
            .map(|component| self.from_descriptor(series, component))
            .collect()
    }

    fn rules<const N: usize>(
        &self,
        series: &Arc<BarSeries>,
        descriptor: &ComponentDescriptor,
    ) -> Result<[RuleRef; N], CodecError> {
        let rules = self.all_rules(series, descriptor)?;
        let found = rules.len();
        rules.try_into().map_err(|_| {
            descriptor.malformed(format!("expected {N} rule components, found {found}"))
        })
    }
}

/// Describes `rule` with the default lenient codec.
pub fn describe(rule: &Rule) -> Result<ComponentDescriptor, CodecError> {
    RuleCodec::default().describe(rule)
}

/// Rebuilds a rule with the default lenient codec.
pub fn from_descriptor(
    series: &Arc<BarSeries>,
    descriptor: &ComponentDescriptor,
) -> Result<RuleRef, CodecError> {
    RuleCodec::default().from_descriptor(series, descriptor)
}

/// Capability check: whether `rule` has a descriptor form.
pub fn is_supported(rule: &Rule) -> bool {
    match describe(rule) {
        Ok(_) => true,
        Err(err) => {
            debug!(kind = rule.type_name(), error = %err, "rule has no descriptor form");
            false
        }
    }
}

fn unsupported(kind: &str) -> CodecError {
    CodecError::Unsupported {
        kind: kind.to_string(),
    }
}

fn describe_indicator(
    rule_type: &str,
    indicator: &IndicatorRef,
) -> Result<ComponentDescriptor, CodecError> {
    indicator.describe().ok_or_else(|| unsupported(rule_type))
}

fn index_value(descriptor: &ComponentDescriptor, value: &Param) -> Result<usize, CodecError> {
    int_value(value)
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| {
            descriptor.malformed(format!("expected a non-negative integer, found {value:?}"))
        })
}

fn indicators<const N: usize>(
    series: &Arc<BarSeries>,
    descriptor: &ComponentDescriptor,
) -> Result<[IndicatorRef; N], CodecError> {
    let indicators = descriptor
        .components
        .iter()
        .map(|component| indicator_from_descriptor(series, component))
        .collect::<Result<Vec<_>, _>>()?;
    let found = indicators.len();
    indicators.try_into().map_err(|_| {
        descriptor.malformed(format!("expected {N} indicator components, found {found}"))
    })
}

fn stop_from_descriptor(
    series: &Arc<BarSeries>,
    descriptor: &ComponentDescriptor,
    side: StopSide,
    kind: DistanceKind,
    trailing: bool,
) -> Result<StopRule, CodecError> {
    let [price] = indicators::<1>(series, descriptor)?;
    let factory = series.factory();
    let distance = match kind {
        DistanceKind::Percentage => {
            StopDistance::Percentage(descriptor.num_param("percentage", factory)?)
        }
        DistanceKind::Amount => StopDistance::Amount(descriptor.num_param("amount", factory)?),
        DistanceKind::AverageTrueRange => StopDistance::AverageTrueRange {
            bar_count: descriptor.usize_param("barCount")?,
            coefficient: descriptor.num_param("coefficient", factory)?,
        },
        DistanceKind::Volatility => StopDistance::Volatility {
            bar_count: descriptor.usize_param("barCount")?,
            coefficient: descriptor.num_param("coefficient", factory)?,
        },
    };
    Ok(StopRule::new(price, side, distance, trailing)?)
}

fn position_from_descriptor(
    factory: NumFactory,
    descriptor: &ComponentDescriptor,
) -> Result<PositionRule, CodecError> {
    let filter: PositionFilter = descriptor
        .text_param("positionFilter")?
        .parse()
        .map_err(|err: EngineError| descriptor.malformed(err.to_string()))?;
    let aggregation: PositionAggregation = descriptor
        .text_param("aggregationType")?
        .parse()
        .map_err(|err: EngineError| descriptor.malformed(err.to_string()))?;
    let bound = |key: &str| -> Result<Option<Num>, CodecError> {
        match descriptor.param(key) {
            Some(_) => descriptor.num_param(key, factory).map(Some),
            None => Ok(None),
        }
    };
    Ok(PositionRule::new(
        filter,
        aggregation,
        bound("requiredMinimum")?,
        bound("requiredMaximum")?,
    )?)
}

fn calendar_from_descriptor(
    series: &Arc<BarSeries>,
    descriptor: &ComponentDescriptor,
) -> Result<CalendarRule, CodecError> {
    let time = match descriptor.components.as_slice() {
        [time] => datetime_from_descriptor(series, time)?,
        other => {
            return Err(descriptor.malformed(format!(
                "expected 1 time component, found {}",
                other.len()
            )));
        }
    };
    let rule = match descriptor.type_name.as_str() {
        "HourOfDayRule" => CalendarRule::hours_of_day(time, int_list(descriptor, "hours")?)?,
        "MinuteOfHourRule" => CalendarRule::minutes_of_hour(time, int_list(descriptor, "minutes")?)?,
        "DayOfWeekRule" => {
            let days = text_list(descriptor, "days")?
                .into_iter()
                .map(parse_weekday)
                .collect::<Result<Vec<_>, _>>()?;
            CalendarRule::days_of_week(time, days)?
        }
        "TimeRangeRule" => {
            let ranges = text_list(descriptor, "ranges")?
                .into_iter()
                .map(TimeRange::parse)
                .collect::<Result<Vec<_>, _>>()?;
            CalendarRule::time_ranges(time, ranges)?
        }
        other => return Err(CodecError::UnknownType(other.to_string())),
    };
    Ok(rule)
}

fn int_list(descriptor: &ComponentDescriptor, key: &str) -> Result<Vec<i64>, CodecError> {
    descriptor
        .list_param(key)?
        .iter()
        .map(|p| int_value(p).ok_or_else(|| descriptor.malformed(format!("{key} must hold integers"))))
        .collect()
}

fn text_list<'a>(descriptor: &'a ComponentDescriptor, key: &str) -> Result<Vec<&'a str>, CodecError> {
    descriptor
        .list_param(key)?
        .iter()
        .map(|p| match p {
            Param::Text(s) => Ok(s.as_str()),
            _ => Err(descriptor.malformed(format!("{key} must hold strings"))),
        })
        .collect()
}

/// Parameter keys each rule type accepts, or `None` for unknown types.
fn known_parameters(type_name: &str) -> Option<&'static [&'static str]> {
    let keys: &'static [&'static str] = match type_name {
        "BooleanRule" => &["value"],
        "FixedRule" => &["indexes"],
        "AndRule" | "OrRule" | "XorRule" | "NotRule" | "JustOnceRule" | "InPipeRule"
        | "PredicateRule" => &[],
        "AndWithThresholdRule" | "OrWithThresholdRule" => &["threshold"],
        "VoteRule" => &["requiredVotes"],
        "ChainRule" => &["maxBars"],
        "WaitForRule" => &["tradeType", "barCount"],
        "PositionRule" => &[
            "positionFilter",
            "aggregationType",
            "requiredMinimum",
            "requiredMaximum",
        ],
        "HourOfDayRule" => &["hours"],
        "MinuteOfHourRule" => &["minutes"],
        "DayOfWeekRule" => &["days"],
        "TimeRangeRule" => &["ranges"],
        _ => {
            if Comparison::from_type_name(type_name).is_some() {
                &[]
            } else {
                let (_, kind, _) = parse_stop_type(type_name)?;
                match kind {
                    DistanceKind::Percentage => &["percentage"],
                    DistanceKind::Amount => &["amount"],
                    DistanceKind::AverageTrueRange | DistanceKind::Volatility => {
                        &["barCount", "coefficient"]
                    }
                }
            }
        }
    };
    Some(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::{ConstantIndicator, PriceIndicator, SmaIndicator};
    use crate::domain::num::NumFactory;
    use chrono::{Duration, TimeZone, Utc};

    fn make_series() -> Arc<BarSeries> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let mut series = BarSeries::new("codec", NumFactory::Decimal);
        for (i, c) in [10.0, 11.0, 12.0, 11.5, 13.0, 12.5].into_iter().enumerate() {
            series
                .add_bar(start + Duration::hours(i as i64), c, c + 0.5, c - 0.5, c, 100.0)
                .unwrap();
        }
        Arc::new(series)
    }

    fn assert_round_trip(series: &Arc<BarSeries>, rule: &Rule) -> ComponentDescriptor {
        let described = describe(rule).unwrap();
        let rebuilt = from_descriptor(series, &described).unwrap();
        let again = describe(&rebuilt).unwrap();
        assert!(
            described.structurally_eq(&again),
            "round trip changed {described} into {again}"
        );
        described
    }

    #[test]
    fn boolean_and_fixed() {
        let series = make_series();
        let d = assert_round_trip(&series, &Rule::boolean(true));
        assert_eq!(d.to_json().unwrap(), r#"{"type":"BooleanRule","parameters":{"value":true}}"#);
        let d = assert_round_trip(&series, &Rule::fixed([1, 3, 5]));
        assert_eq!(
            d.to_json().unwrap(),
            r#"{"type":"FixedRule","parameters":{"indexes":[1,3,5]}}"#
        );
    }

    #[test]
    fn label_travels_with_rule() {
        let series = make_series();
        let rule = Rule::boolean(true).and(Rule::fixed([2]).with_name("second bar"));
        rule.set_name(Some("entry"));
        let d = assert_round_trip(&series, &rule);
        assert_eq!(d.label.as_deref(), Some("entry"));
        assert_eq!(d.components[1].label.as_deref(), Some("second bar"));

        let rebuilt = from_descriptor(&series, &d).unwrap();
        assert_eq!(rebuilt.name(), "entry");
    }

    #[test]
    fn composites_keep_parameters() {
        let series = make_series();
        let threshold =
            Rule::and_with_threshold(Rule::fixed([1]), Rule::fixed([2]), 3).unwrap();
        let d = assert_round_trip(&series, &threshold);
        assert_eq!(d.param("threshold"), Some(&Param::Int(3)));

        let vote = Rule::vote(2, vec![Rule::boolean(true), Rule::fixed([0]), Rule::boolean(false)])
            .unwrap();
        let d = assert_round_trip(&series, &vote);
        assert_eq!(d.components.len(), 3);

        let chain = Rule::chain(
            Rule::fixed([0]),
            vec![
                ChainLink::new(Rule::fixed([2]), 2),
                ChainLink::new(Rule::fixed([4]), 3),
            ],
        );
        let d = assert_round_trip(&series, &chain);
        assert_eq!(d.param("maxBars"), Some(&Param::from(vec![2usize, 3])));

        assert_round_trip(&series, &Rule::just_once(Rule::boolean(true)));
        assert_round_trip(&series, &Rule::wait_for(TradeType::Sell, 4));
    }

    #[test]
    fn indicator_rules() {
        let series = make_series();
        let close = PriceIndicator::close(&series);
        let sma: IndicatorRef = Arc::new(SmaIndicator::new(Arc::clone(&close), 3).unwrap());
        let d = assert_round_trip(&series, &Rule::crossed_up(Arc::clone(&close), Arc::clone(&sma)));
        assert_eq!(d.components[1].type_name, "SMAIndicator");

        let pipe = Rule::in_pipe(
            Arc::clone(&close),
            ConstantIndicator::of(&series, 13.0),
            ConstantIndicator::of(&series, 11.0),
        );
        assert_round_trip(&series, &pipe);
        assert_round_trip(&series, &Rule::is_equal(close, sma));
    }

    #[test]
    fn stop_rules() {
        let series = make_series();
        let close = PriceIndicator::close(&series);
        let pct = series.factory().num_of(5.0);
        let stop = StopRule::trailing_stop_loss(Arc::clone(&close), pct).unwrap();
        let d = assert_round_trip(&series, &Rule::stop(stop));
        assert_eq!(d.type_name, "TrailingStopLossRule");
        assert_eq!(d.param("percentage"), Some(&Param::Text("5".into())));

        let atr = StopRule::new(
            close,
            StopSide::Gain,
            StopDistance::AverageTrueRange {
                bar_count: 3,
                coefficient: series.factory().num_of(1.5),
            },
            false,
        )
        .unwrap();
        let d = assert_round_trip(&series, &Rule::stop(atr));
        assert_eq!(d.type_name, "AverageTrueRangeStopGainRule");
    }

    #[test]
    fn volatility_stop_rules() {
        let series = make_series();
        let close = PriceIndicator::close(&series);
        for (side, trailing, name) in [
            (StopSide::Loss, false, "VolatilityStopLossRule"),
            (StopSide::Loss, true, "VolatilityTrailingStopLossRule"),
            (StopSide::Gain, false, "VolatilityStopGainRule"),
            (StopSide::Gain, true, "VolatilityTrailingStopGainRule"),
        ] {
            let stop = StopRule::new(
                Arc::clone(&close),
                side,
                StopDistance::Volatility {
                    bar_count: 3,
                    coefficient: series.factory().num_of(2.0),
                },
                trailing,
            )
            .unwrap();
            let d = assert_round_trip(&series, &Rule::stop(stop));
            assert_eq!(d.type_name, name);
            assert_eq!(d.param("barCount"), Some(&Param::Int(3)));
            assert_eq!(d.param("coefficient"), Some(&Param::Text("2".into())));
        }
    }

    #[test]
    fn position_rules() {
        let series = make_series();
        let factory = series.factory();
        let at_least = PositionRule::new(
            PositionFilter::Closed,
            PositionAggregation::NetProfit,
            Some(factory.num_of(1.5)),
            None,
        )
        .unwrap();
        let d = assert_round_trip(&series, &Rule::position(at_least));
        assert_eq!(
            d.to_json().unwrap(),
            r#"{"type":"PositionRule","parameters":{"positionFilter":"CLOSED","aggregationType":"NET_PROFIT","requiredMinimum":"1.5"}}"#
        );

        let between = PositionRule::new(
            PositionFilter::All,
            PositionAggregation::NumberOfPositions,
            Some(factory.zero()),
            Some(factory.num_of(2.0)),
        )
        .unwrap();
        let d = assert_round_trip(&series, &Rule::position(between));
        assert_eq!(d.param("requiredMaximum"), Some(&Param::Text("2".into())));
    }

    #[test]
    fn position_rule_needs_a_bound() {
        let series = make_series();
        let d = ComponentDescriptor::builder("PositionRule")
            .param("positionFilter", "OPEN")
            .param("aggregationType", "AMOUNT")
            .build();
        assert!(matches!(
            from_descriptor(&series, &d),
            Err(CodecError::InvalidRule(EngineError::RuleInvalid { .. }))
        ));
        let bad_filter = ComponentDescriptor::builder("PositionRule")
            .param("positionFilter", "SOME")
            .param("aggregationType", "AMOUNT")
            .param("requiredMaximum", "1")
            .build();
        assert!(matches!(
            from_descriptor(&series, &bad_filter),
            Err(CodecError::Malformed { .. })
        ));
    }

    #[test]
    fn calendar_rules() {
        let series = make_series();
        let time = crate::domain::indicator::DateTimeIndicator::new(&series);
        let hours = CalendarRule::hours_of_day(Arc::clone(&time), [9, 10]).unwrap();
        let d = assert_round_trip(&series, &Rule::calendar(hours));
        assert_eq!(
            d.to_json().unwrap(),
            r#"{"type":"HourOfDayRule","parameters":{"hours":[9,10]},"components":[{"type":"DateTimeIndicator"}]}"#
        );
        let days = CalendarRule::days_of_week(Arc::clone(&time), [chrono::Weekday::Mon]).unwrap();
        assert_round_trip(&series, &Rule::calendar(days));
        let ranges =
            CalendarRule::time_ranges(time, [TimeRange::parse("09:00:00-11:00:00").unwrap()])
                .unwrap();
        assert_round_trip(&series, &Rule::calendar(ranges));
    }

    #[test]
    fn numeric_formatting_is_tolerated() {
        let series = make_series();
        let text = r#"{"type":"StopLossRule","parameters":{"percentage":"5.00"},
            "components":[{"type":"ClosePriceIndicator"}]}"#;
        let parsed = ComponentDescriptor::from_json(text).unwrap();
        let rebuilt = from_descriptor(&series, &parsed).unwrap();
        assert!(describe(&rebuilt).unwrap().structurally_eq(&parsed));
    }

    #[test]
    fn predicate_is_unsupported() {
        let rule = Rule::predicate("custom", |_, _| true);
        let err = describe(&rule).unwrap_err();
        assert!(err.is_unsupported());
        assert!(!is_supported(&rule));

        let nested = Rule::boolean(true).and(rule);
        assert!(describe(&nested).unwrap_err().is_unsupported());
        assert!(is_supported(&Rule::boolean(true)));
    }

    #[test]
    fn unknown_and_missing_types_are_hard_failures() {
        let series = make_series();
        let unknown = ComponentDescriptor::builder("MysteryRule").build();
        assert!(matches!(
            from_descriptor(&series, &unknown),
            Err(CodecError::UnknownType(name)) if name == "MysteryRule"
        ));
        let blank = ComponentDescriptor::builder("").build();
        assert!(matches!(from_descriptor(&series, &blank), Err(CodecError::MissingType)));
    }

    #[test]
    fn wrong_arity_is_malformed() {
        let series = make_series();
        let d = ComponentDescriptor::builder("AndRule")
            .component(describe(&Rule::boolean(true)).unwrap())
            .build();
        assert!(matches!(
            from_descriptor(&series, &d),
            Err(CodecError::Malformed { .. })
        ));
    }

    #[test]
    fn invalid_values_surface_as_rule_errors() {
        let series = make_series();
        let d = ComponentDescriptor::builder("OrWithThresholdRule")
            .param("threshold", 0usize)
            .components([
                describe(&Rule::boolean(true)).unwrap(),
                describe(&Rule::boolean(false)).unwrap(),
            ])
            .build();
        assert!(matches!(
            from_descriptor(&series, &d),
            Err(CodecError::InvalidRule(EngineError::RuleInvalid { .. }))
        ));
    }

    #[test]
    fn unknown_parameters_strict_vs_lenient() {
        let series = make_series();
        let d = ComponentDescriptor::builder("BooleanRule")
            .param("value", false)
            .param("colour", "blue")
            .build();
        assert!(RuleCodec::default().from_descriptor(&series, &d).is_ok());
        assert!(matches!(
            RuleCodec::new(true).from_descriptor(&series, &d),
            Err(CodecError::Malformed { .. })
        ));
    }
}
