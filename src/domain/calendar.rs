//! Calendar filters over bar end times.
//!
//! Stateless membership tests: a bar matches when its end time falls in one
//! of the configured time ranges, weekdays, hours or minutes. Constructors
//! validate each value against its unit's domain, de-duplicate repeats and
//! reject empty sets.

use crate::domain::error::EngineError;
use crate::domain::indicator::{DateTimeIndicator, Indicator};
use chrono::{Datelike, NaiveTime, Timelike, Weekday};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

const TIME_FORMAT: &str = "%H:%M:%S";

const WEEKDAYS: [(Weekday, &str); 7] = [
    (Weekday::Mon, "MONDAY"),
    (Weekday::Tue, "TUESDAY"),
    (Weekday::Wed, "WEDNESDAY"),
    (Weekday::Thu, "THURSDAY"),
    (Weekday::Fri, "FRIDAY"),
    (Weekday::Sat, "SATURDAY"),
    (Weekday::Sun, "SUNDAY"),
];

pub fn weekday_name(day: Weekday) -> &'static str {
    WEEKDAYS[day.num_days_from_monday() as usize].1
}

pub fn parse_weekday(text: &str) -> Result<Weekday, EngineError> {
    let upper = text.trim().to_uppercase();
    WEEKDAYS
        .iter()
        .find(|(_, name)| *name == upper || name[..3] == upper)
        .map(|(day, _)| *day)
        .ok_or_else(|| EngineError::rule(format!("unknown day of week {text:?}")))
}

/// Inclusive time-of-day window. A window whose start is after its end wraps
/// past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeRange {
    pub from: NaiveTime,
    pub to: NaiveTime,
}

impl TimeRange {
    pub fn new(from: NaiveTime, to: NaiveTime) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.from <= self.to {
            self.from <= time && time <= self.to
        } else {
            time >= self.from || time <= self.to
        }
    }

    /// Parses `HH:MM:SS-HH:MM:SS`.
    pub fn parse(text: &str) -> Result<Self, EngineError> {
        let invalid = || EngineError::rule(format!("invalid time range {text:?}"));
        let (from, to) = text.split_once('-').ok_or_else(invalid)?;
        let from = NaiveTime::parse_from_str(from.trim(), TIME_FORMAT).map_err(|_| invalid())?;
        let to = NaiveTime::parse_from_str(to.trim(), TIME_FORMAT).map_err(|_| invalid())?;
        Ok(Self { from, to })
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.from.format(TIME_FORMAT),
            self.to.format(TIME_FORMAT)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarFilter {
    TimeRanges(Vec<TimeRange>),
    DaysOfWeek(Vec<Weekday>),
    HoursOfDay(BTreeSet<u32>),
    MinutesOfHour(BTreeSet<u32>),
}

#[derive(Debug)]
pub struct CalendarRule {
    time: Arc<DateTimeIndicator>,
    filter: CalendarFilter,
}

impl CalendarRule {
    pub fn time_ranges(
        time: Arc<DateTimeIndicator>,
        ranges: impl IntoIterator<Item = TimeRange>,
    ) -> Result<Self, EngineError> {
        let ranges: BTreeSet<TimeRange> = ranges.into_iter().collect();
        if ranges.is_empty() {
            return Err(EngineError::rule("at least one time range is required"));
        }
        Ok(Self {
            time,
            filter: CalendarFilter::TimeRanges(ranges.into_iter().collect()),
        })
    }

    pub fn days_of_week(
        time: Arc<DateTimeIndicator>,
        days: impl IntoIterator<Item = Weekday>,
    ) -> Result<Self, EngineError> {
        let mut days: Vec<Weekday> = days.into_iter().collect();
        days.sort_by_key(|d| d.num_days_from_monday());
        days.dedup();
        if days.is_empty() {
            return Err(EngineError::rule("at least one day of week is required"));
        }
        Ok(Self {
            time,
            filter: CalendarFilter::DaysOfWeek(days),
        })
    }

    pub fn hours_of_day(
        time: Arc<DateTimeIndicator>,
        hours: impl IntoIterator<Item = i64>,
    ) -> Result<Self, EngineError> {
        let hours = validated(hours, "Hour of day", "0-23", 23)?;
        Ok(Self {
            time,
            filter: CalendarFilter::HoursOfDay(hours),
        })
    }

    pub fn minutes_of_hour(
        time: Arc<DateTimeIndicator>,
        minutes: impl IntoIterator<Item = i64>,
    ) -> Result<Self, EngineError> {
        let minutes = validated(minutes, "Minute of hour", "0-59", 59)?;
        Ok(Self {
            time,
            filter: CalendarFilter::MinutesOfHour(minutes),
        })
    }

    pub fn time(&self) -> &Arc<DateTimeIndicator> {
        &self.time
    }

    pub fn filter(&self) -> &CalendarFilter {
        &self.filter
    }

    pub fn type_name(&self) -> &'static str {
        match self.filter {
            CalendarFilter::TimeRanges(_) => "TimeRangeRule",
            CalendarFilter::DaysOfWeek(_) => "DayOfWeekRule",
            CalendarFilter::HoursOfDay(_) => "HourOfDayRule",
            CalendarFilter::MinutesOfHour(_) => "MinuteOfHourRule",
        }
    }

    pub fn is_satisfied(&self, index: usize) -> bool {
        let at = self.time.value(index);
        match &self.filter {
            CalendarFilter::TimeRanges(ranges) => ranges.iter().any(|r| r.contains(at.time())),
            CalendarFilter::DaysOfWeek(days) => days.contains(&at.weekday()),
            CalendarFilter::HoursOfDay(hours) => hours.contains(&at.hour()),
            CalendarFilter::MinutesOfHour(minutes) => minutes.contains(&at.minute()),
        }
    }
}

fn validated(
    values: impl IntoIterator<Item = i64>,
    unit: &'static str,
    range: &'static str,
    max: i64,
) -> Result<BTreeSet<u32>, EngineError> {
    let mut set = BTreeSet::new();
    for value in values {
        if !(0..=max).contains(&value) {
            return Err(EngineError::CalendarValue { unit, range, value });
        }
        set.insert(value as u32);
    }
    if set.is_empty() {
        return Err(EngineError::rule(format!("{unit} requires at least one value")));
    }
    Ok(set)
}
