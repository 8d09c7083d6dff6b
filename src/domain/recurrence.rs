//! Recurrence rules
//!
//! A small RFC 5545 (`RRULE`) model restricted to date granularity, with two
//! textual forms:
//!
//! - a natural-language phrase, as written after `;` or `📅` in a task line
//!   (`every week on Sunday`, `every 2 months on the last day`)
//! - the canonical machine form (`RRULE:FREQ=WEEKLY;BYDAY=SU`)
//!
//! [`RecurrenceRule::parse`] accepts both, and [`RecurrenceRule::to_text`]
//! falls back to the machine form whenever the phrase grammar cannot express
//! the rule, so rendering a rule into a line and parsing it back never loses
//! information.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Periods scanned before occurrence expansion gives up on a rule that never matches
const MAX_PERIODS: u32 = 10_000;

const WEEKDAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

const WEEKDAY_CODES: [&str; 7] = ["MO", "TU", "WE", "TH", "FR", "SA", "SU"];

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RecurrenceError {
    #[error("Recurrence phrase is empty")]
    Empty,

    #[error("Unexpected '{0}' in recurrence phrase")]
    UnexpectedToken(String),

    #[error("Recurrence phrase ended early: expected {0}")]
    UnexpectedEnd(&'static str),

    #[error("Invalid RRULE part '{0}'")]
    InvalidRulePart(String),

    #[error("Invalid {field}: {value}")]
    InvalidValue { field: &'static str, value: String },

    #[error("Frequency {0} is not supported for dated notes")]
    UnsupportedFrequency(Frequency),

    #[error("More than one recurrence marker on the line")]
    MultipleMarkers,
}

/// Rule frequency (`FREQ=`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Yearly,
    Monthly,
    Weekly,
    Daily,
    Hourly,
    Minutely,
    Secondly,
}

impl Frequency {
    /// Returns the RRULE keyword
    pub fn as_rrule(&self) -> &'static str {
        match self {
            Frequency::Yearly => "YEARLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Daily => "DAILY",
            Frequency::Hourly => "HOURLY",
            Frequency::Minutely => "MINUTELY",
            Frequency::Secondly => "SECONDLY",
        }
    }

    /// Returns true for the frequencies that produce whole dates
    pub fn is_date_based(&self) -> bool {
        matches!(
            self,
            Frequency::Yearly | Frequency::Monthly | Frequency::Weekly | Frequency::Daily
        )
    }

    fn unit(&self) -> &'static str {
        match self {
            Frequency::Yearly => "year",
            Frequency::Monthly => "month",
            Frequency::Weekly => "week",
            Frequency::Daily => "day",
            Frequency::Hourly => "hour",
            Frequency::Minutely => "minute",
            Frequency::Secondly => "second",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_rrule())
    }
}

impl FromStr for Frequency {
    type Err = RecurrenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "YEARLY" => Ok(Frequency::Yearly),
            "MONTHLY" => Ok(Frequency::Monthly),
            "WEEKLY" => Ok(Frequency::Weekly),
            "DAILY" => Ok(Frequency::Daily),
            "HOURLY" => Ok(Frequency::Hourly),
            "MINUTELY" => Ok(Frequency::Minutely),
            "SECONDLY" => Ok(Frequency::Secondly),
            _ => Err(RecurrenceError::InvalidValue {
                field: "frequency",
                value: s.to_string(),
            }),
        }
    }
}

/// A `BYDAY` entry: a weekday, optionally restricted to its nth occurrence
/// in the month (or year). Negative ordinals count from the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NthWeekday {
    pub weekday: Weekday,
    pub nth: Option<i8>,
}

impl NthWeekday {
    /// Every occurrence of the weekday
    pub fn every(weekday: Weekday) -> Self {
        Self { weekday, nth: None }
    }

    /// Only the nth occurrence of the weekday
    pub fn nth(weekday: Weekday, nth: i8) -> Self {
        Self {
            weekday,
            nth: Some(nth),
        }
    }

    fn to_rrule(self) -> String {
        let code = WEEKDAY_CODES[self.weekday.num_days_from_monday() as usize];
        match self.nth {
            Some(n) if n > 0 => format!("+{}{}", n, code),
            Some(n) => format!("{}{}", n, code),
            None => code.to_string(),
        }
    }
}

/// Maps `0 = Monday .. 6 = Sunday` to a weekday
pub fn weekday_from_index(index: u8) -> Option<Weekday> {
    match index {
        0 => Some(Weekday::Mon),
        1 => Some(Weekday::Tue),
        2 => Some(Weekday::Wed),
        3 => Some(Weekday::Thu),
        4 => Some(Weekday::Fri),
        5 => Some(Weekday::Sat),
        6 => Some(Weekday::Sun),
        _ => None,
    }
}

/// English name of a weekday
pub fn weekday_name(weekday: Weekday) -> &'static str {
    WEEKDAY_NAMES[weekday.num_days_from_monday() as usize]
}

/// English name of a month (1-12)
pub fn month_name(month: u8) -> &'static str {
    MONTH_NAMES[(month.clamp(1, 12) - 1) as usize]
}

/// A recurrence rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub freq: Frequency,
    pub interval: u32,
    pub by_weekday: Vec<NthWeekday>,
    pub by_month_day: Vec<i8>,
    pub by_month: Vec<u8>,
    pub count: Option<u32>,
    pub until: Option<NaiveDate>,
    pub dtstart: Option<NaiveDate>,
}

impl RecurrenceRule {
    /// Creates a rule repeating every period of the given frequency
    pub fn new(freq: Frequency) -> Self {
        Self {
            freq,
            interval: 1,
            by_weekday: Vec::new(),
            by_month_day: Vec::new(),
            by_month: Vec::new(),
            count: None,
            until: None,
            dtstart: None,
        }
    }

    /// Parses a natural-language phrase or an `RRULE:` string
    pub fn parse(input: &str) -> Result<Self, RecurrenceError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(RecurrenceError::Empty);
        }

        let upper = trimmed.to_ascii_uppercase();
        let rule = if upper.starts_with("RRULE:") || upper.starts_with("FREQ=") {
            Self::parse_rrule(trimmed)?
        } else {
            PhraseParser::new(trimmed).parse()?
        };

        rule.validate()?;
        Ok(rule)
    }

    /// Parses the machine form (`RRULE:FREQ=...;BYDAY=...`)
    pub fn parse_rrule(input: &str) -> Result<Self, RecurrenceError> {
        let body = input.trim();
        let body = body
            .get(..6)
            .filter(|prefix| prefix.eq_ignore_ascii_case("RRULE:"))
            .map_or(body, |_| &body[6..]);

        let mut freq = None;
        let mut rule = Self::new(Frequency::Daily);

        for part in body.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| RecurrenceError::InvalidRulePart(part.to_string()))?;

            match key.trim().to_ascii_uppercase().as_str() {
                "FREQ" => freq = Some(value.parse::<Frequency>()?),
                "INTERVAL" => rule.interval = parse_number("interval", value)?,
                "COUNT" => rule.count = Some(parse_number("count", value)?),
                "UNTIL" => rule.until = Some(parse_compact_date("until", value)?),
                "DTSTART" => rule.dtstart = Some(parse_compact_date("dtstart", value)?),
                "BYMONTH" => {
                    rule.by_month = value
                        .split(',')
                        .map(|m| parse_number("month", m))
                        .collect::<Result<_, _>>()?
                }
                "BYMONTHDAY" => {
                    rule.by_month_day = value
                        .split(',')
                        .map(|d| parse_number("day of month", d))
                        .collect::<Result<_, _>>()?
                }
                "BYDAY" => {
                    rule.by_weekday = value
                        .split(',')
                        .map(parse_byday)
                        .collect::<Result<_, _>>()?
                }
                // Weeks always start on Monday here
                "WKST" => {}
                _ => return Err(RecurrenceError::InvalidRulePart(part.to_string())),
            }
        }

        rule.freq = freq.ok_or_else(|| RecurrenceError::InvalidRulePart(body.to_string()))?;
        Ok(rule)
    }

    /// Checks ranges of every facet
    pub fn validate(&self) -> Result<(), RecurrenceError> {
        if self.interval == 0 {
            return Err(RecurrenceError::InvalidValue {
                field: "interval",
                value: "0".to_string(),
            });
        }
        if let Some(0) = self.count {
            return Err(RecurrenceError::InvalidValue {
                field: "count",
                value: "0".to_string(),
            });
        }
        if let Some(month) = self.by_month.iter().find(|m| !(1..=12).contains(*m)) {
            return Err(RecurrenceError::InvalidValue {
                field: "month",
                value: month.to_string(),
            });
        }
        if let Some(day) = self
            .by_month_day
            .iter()
            .find(|d| **d == 0 || !(-31..=31).contains(*d))
        {
            return Err(RecurrenceError::InvalidValue {
                field: "day of month",
                value: day.to_string(),
            });
        }
        if let Some(spec) = self
            .by_weekday
            .iter()
            .find(|s| matches!(s.nth, Some(n) if n == 0 || !(-53..=53).contains(&n)))
        {
            return Err(RecurrenceError::InvalidValue {
                field: "weekday ordinal",
                value: spec.to_rrule(),
            });
        }
        Ok(())
    }

    /// Returns true if the rule serializes to a non-empty canonical form
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok() && !self.to_rrule().is_empty()
    }

    /// Canonical machine form
    pub fn to_rrule(&self) -> String {
        let mut parts = vec![format!("FREQ={}", self.freq.as_rrule())];

        if self.interval != 1 {
            parts.push(format!("INTERVAL={}", self.interval));
        }
        if let Some(count) = self.count {
            parts.push(format!("COUNT={}", count));
        }
        if let Some(until) = self.until {
            parts.push(format!("UNTIL={}", until.format("%Y%m%d")));
        }
        if !self.by_month.is_empty() {
            parts.push(format!("BYMONTH={}", join_numbers(&self.by_month)));
        }
        if !self.by_month_day.is_empty() {
            parts.push(format!("BYMONTHDAY={}", join_numbers(&self.by_month_day)));
        }
        if !self.by_weekday.is_empty() {
            let days: Vec<String> = self.by_weekday.iter().map(|d| d.to_rrule()).collect();
            parts.push(format!("BYDAY={}", days.join(",")));
        }

        format!("RRULE:{}", parts.join(";"))
    }

    /// Returns true if [`to_text`](Self::to_text) produces a phrase rather than the machine form
    pub fn is_fully_convertible_to_text(&self) -> bool {
        if !self.freq.is_date_based() {
            return false;
        }
        let has_nth = self.by_weekday.iter().any(|d| d.nth.is_some());
        if has_nth && !matches!(self.freq, Frequency::Monthly | Frequency::Yearly) {
            return false;
        }
        if has_nth && self.by_weekday.iter().any(|d| d.nth.is_none()) {
            return false;
        }
        if self
            .by_weekday
            .iter()
            .any(|d| matches!(d.nth, Some(n) if n < -1 || n > 5))
        {
            return false;
        }
        if !self.by_month_day.is_empty() && !self.by_weekday.is_empty() {
            return false;
        }
        if !self.by_month_day.is_empty()
            && !matches!(self.freq, Frequency::Monthly | Frequency::Yearly)
        {
            return false;
        }
        self.by_month_day.iter().all(|d| *d > 0 || *d == -1)
    }

    /// Natural-language rendering, or the machine form when no phrase fits
    pub fn to_text(&self) -> String {
        if !self.is_fully_convertible_to_text() {
            return self.to_rrule();
        }

        let mut text = String::from("every");
        let weekdays_only = self.by_weekday.iter().all(|d| d.nth.is_none());
        let plain_weekdays: Vec<Weekday> = self.by_weekday.iter().map(|d| d.weekday).collect();

        if self.freq == Frequency::Weekly && self.interval == 1 && is_work_week(&plain_weekdays) {
            text.push_str(" weekday");
        } else {
            if self.interval == 1 {
                text.push(' ');
                text.push_str(self.freq.unit());
            } else {
                text.push_str(&format!(" {} {}s", self.interval, self.freq.unit()));
            }

            if !self.by_weekday.is_empty() && weekdays_only {
                let names: Vec<String> = plain_weekdays
                    .iter()
                    .map(|d| weekday_name(*d).to_string())
                    .collect();
                text.push_str(" on ");
                text.push_str(&list_text(&names));
            }
        }

        if !self.by_month.is_empty() {
            let names: Vec<String> = self
                .by_month
                .iter()
                .map(|m| month_name(*m).to_string())
                .collect();
            text.push_str(" in ");
            text.push_str(&list_text(&names));
        }

        if !self.by_month_day.is_empty() {
            let days: Vec<String> = self
                .by_month_day
                .iter()
                .map(|d| {
                    if *d == -1 {
                        "last day".to_string()
                    } else {
                        ordinal(*d as i32)
                    }
                })
                .collect();
            text.push_str(" on the ");
            text.push_str(&list_text(&days));
        } else if !weekdays_only {
            let days: Vec<String> = self
                .by_weekday
                .iter()
                .map(|d| {
                    let n = d.nth.unwrap_or(1);
                    let ord = if n == -1 {
                        "last".to_string()
                    } else {
                        ordinal(n as i32)
                    };
                    format!("{} {}", ord, weekday_name(d.weekday))
                })
                .collect();
            text.push_str(" on the ");
            text.push_str(&list_text(&days));
        }

        if let Some(count) = self.count {
            let unit = if count == 1 { "time" } else { "times" };
            text.push_str(&format!(" for {} {}", count, unit));
        }

        if let Some(until) = self.until {
            text.push_str(&format!(
                " until {} {}, {}",
                month_name(until.month() as u8),
                until.day(),
                until.year()
            ));
        }

        text
    }

    /// Returns the next `n` occurrences strictly after `after`.
    ///
    /// The series starts at `dtstart`, or at `after` when the rule has none.
    /// `COUNT` is counted from the series start.
    pub fn occurrences_after(&self, after: NaiveDate, n: usize) -> Vec<NaiveDate> {
        let mut out = Vec::new();
        if n == 0 || !self.freq.is_date_based() || self.validate().is_err() {
            return out;
        }

        let start = self.dtstart.unwrap_or(after);
        let mut emitted: u32 = 0;
        let mut period: u32 = 0;

        while period < MAX_PERIODS {
            let offset = period.saturating_mul(self.interval);
            let dates = match self.dates_in_period(start, offset) {
                Some(dates) => dates,
                None => break,
            };

            for date in dates {
                if date < start {
                    continue;
                }
                if matches!(self.until, Some(until) if date > until) {
                    return out;
                }
                emitted += 1;
                if matches!(self.count, Some(count) if emitted > count) {
                    return out;
                }
                if date > after {
                    out.push(date);
                    if out.len() == n {
                        return out;
                    }
                }
            }

            period += 1;
        }

        out
    }

    /// Candidate dates for the period `offset` periods after the one holding `start`.
    /// Returns `None` once the calendar runs out.
    fn dates_in_period(&self, start: NaiveDate, offset: u32) -> Option<Vec<NaiveDate>> {
        let mut dates = match self.freq {
            Frequency::Daily => {
                let date = start.checked_add_days(Days::new(offset as u64))?;
                if self.matches_day_filters(date) {
                    vec![date]
                } else {
                    vec![]
                }
            }
            Frequency::Weekly => {
                let monday = start
                    .checked_sub_days(Days::new(start.weekday().num_days_from_monday() as u64))?
                    .checked_add_days(Days::new(offset as u64 * 7))?;
                let weekdays: Vec<Weekday> = if self.by_weekday.is_empty() {
                    vec![start.weekday()]
                } else {
                    self.by_weekday.iter().map(|d| d.weekday).collect()
                };
                weekdays
                    .into_iter()
                    .filter_map(|wd| {
                        monday.checked_add_days(Days::new(wd.num_days_from_monday() as u64))
                    })
                    .filter(|d| self.by_month.is_empty() || self.by_month.contains(&(d.month() as u8)))
                    .collect()
            }
            Frequency::Monthly => {
                let (year, month) = add_months(start.year(), start.month(), offset)?;
                if !self.by_month.is_empty() && !self.by_month.contains(&(month as u8)) {
                    vec![]
                } else {
                    self.days_in_month(year, month, start.day())
                }
            }
            Frequency::Yearly => {
                let year = start.year().checked_add(offset as i32)?;
                NaiveDate::from_ymd_opt(year, 1, 1)?;
                self.days_in_year(year, start)
            }
            _ => return None,
        };

        dates.sort();
        dates.dedup();
        Some(dates)
    }

    fn matches_day_filters(&self, date: NaiveDate) -> bool {
        if !self.by_month.is_empty() && !self.by_month.contains(&(date.month() as u8)) {
            return false;
        }
        if !self.by_month_day.is_empty() {
            let dim = days_in_month(date.year(), date.month());
            let matched = self
                .by_month_day
                .iter()
                .any(|d| resolve_month_day(*d, dim) == Some(date.day()));
            if !matched {
                return false;
            }
        }
        if !self.by_weekday.is_empty()
            && !self.by_weekday.iter().any(|d| d.weekday == date.weekday())
        {
            return false;
        }
        true
    }

    fn days_in_year(&self, year: i32, start: NaiveDate) -> Vec<NaiveDate> {
        let has_nth = self.by_weekday.iter().any(|d| d.nth.is_some());

        if self.by_month.is_empty() && has_nth && self.by_month_day.is_empty() {
            return self
                .by_weekday
                .iter()
                .filter_map(|spec| match spec.nth {
                    Some(n) => nth_weekday_of_year(year, spec.weekday, n),
                    None => None,
                })
                .collect();
        }

        let months: Vec<u32> = if !self.by_month.is_empty() {
            self.by_month.iter().map(|m| *m as u32).collect()
        } else if self.by_month_day.is_empty() && self.by_weekday.is_empty() {
            vec![start.month()]
        } else {
            (1..=12).collect()
        };

        months
            .into_iter()
            .flat_map(|month| self.days_in_month(year, month, start.day()))
            .collect()
    }

    fn days_in_month(&self, year: i32, month: u32, default_day: u32) -> Vec<NaiveDate> {
        let dim = days_in_month(year, month);

        if !self.by_month_day.is_empty() {
            return self
                .by_month_day
                .iter()
                .filter_map(|d| resolve_month_day(*d, dim))
                .filter_map(|day| NaiveDate::from_ymd_opt(year, month, day))
                .filter(|date| {
                    self.by_weekday.is_empty()
                        || self.by_weekday.iter().any(|d| d.weekday == date.weekday())
                })
                .collect();
        }

        if !self.by_weekday.is_empty() {
            let mut dates = Vec::new();
            for spec in &self.by_weekday {
                match spec.nth {
                    Some(n) => dates.extend(nth_weekday_of_month(year, month, spec.weekday, n)),
                    None => dates.extend(
                        (1..=dim)
                            .filter_map(|day| NaiveDate::from_ymd_opt(year, month, day))
                            .filter(|date| date.weekday() == spec.weekday),
                    ),
                }
            }
            return dates;
        }

        NaiveDate::from_ymd_opt(year, month, default_day)
            .into_iter()
            .collect()
    }
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl FromStr for RecurrenceRule {
    type Err = RecurrenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn is_work_week(days: &[Weekday]) -> bool {
    use Weekday::*;
    days.len() == 5 && [Mon, Tue, Wed, Thu, Fri].iter().all(|d| days.contains(d))
}

fn join_numbers<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// `a`, `a and b`, `a, b and c`
fn list_text(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [one] => one.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

/// `1st`, `2nd`, `3rd`, `11th`, `22nd`
fn ordinal(n: i32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}

fn parse_number<T: FromStr>(field: &'static str, value: &str) -> Result<T, RecurrenceError> {
    value
        .trim()
        .trim_start_matches('+')
        .parse()
        .map_err(|_| RecurrenceError::InvalidValue {
            field,
            value: value.to_string(),
        })
}

/// `20210105` or `20210105T000000Z`
fn parse_compact_date(field: &'static str, value: &str) -> Result<NaiveDate, RecurrenceError> {
    let value = value.trim();
    let digits = value.get(..8).unwrap_or(value);
    NaiveDate::parse_from_str(digits, "%Y%m%d").map_err(|_| RecurrenceError::InvalidValue {
        field,
        value: value.to_string(),
    })
}

fn parse_byday(value: &str) -> Result<NthWeekday, RecurrenceError> {
    let value = value.trim().to_ascii_uppercase();
    if value.len() < 2 {
        return Err(RecurrenceError::InvalidValue {
            field: "weekday",
            value,
        });
    }

    let (ordinal, code) = value.split_at(value.len() - 2);
    let weekday = WEEKDAY_CODES
        .iter()
        .position(|c| *c == code)
        .and_then(|i| weekday_from_index(i as u8))
        .ok_or_else(|| RecurrenceError::InvalidValue {
            field: "weekday",
            value: value.clone(),
        })?;

    if ordinal.is_empty() {
        Ok(NthWeekday::every(weekday))
    } else {
        Ok(NthWeekday::nth(weekday, parse_number("weekday ordinal", ordinal)?))
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

/// Resolves a possibly negative month day against the month length
fn resolve_month_day(day: i8, dim: u32) -> Option<u32> {
    let resolved = if day > 0 {
        day as i64
    } else {
        dim as i64 + 1 + day as i64
    };
    if resolved >= 1 && resolved <= dim as i64 {
        Some(resolved as u32)
    } else {
        None
    }
}

fn add_months(year: i32, month: u32, offset: u32) -> Option<(i32, u32)> {
    let total = (year as i64) * 12 + (month as i64 - 1) + offset as i64;
    let year = i32::try_from(total.div_euclid(12)).ok()?;
    let month = (total.rem_euclid(12) + 1) as u32;
    Some((year, month))
}

fn nth_weekday_of_month(year: i32, month: u32, weekday: Weekday, n: i8) -> Option<NaiveDate> {
    let dim = days_in_month(year, month);
    let matching: Vec<u32> = (1..=dim)
        .filter(|day| {
            NaiveDate::from_ymd_opt(year, month, *day).map(|d| d.weekday()) == Some(weekday)
        })
        .collect();
    pick_nth(&matching, n).and_then(|day| NaiveDate::from_ymd_opt(year, month, day))
}

fn nth_weekday_of_year(year: i32, weekday: Weekday, n: i8) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let matching: Vec<NaiveDate> = first
        .iter_days()
        .take_while(|d| d.year() == year)
        .filter(|d| d.weekday() == weekday)
        .collect();
    pick_nth(&matching, n)
}

fn pick_nth<T: Copy>(items: &[T], n: i8) -> Option<T> {
    if n > 0 {
        items.get(n as usize - 1).copied()
    } else {
        let back = n.unsigned_abs() as usize;
        items.len().checked_sub(back).and_then(|i| items.get(i).copied())
    }
}

/* ----------------------------- Phrase parsing ----------------------------- */

struct PhraseParser {
    tokens: Vec<String>,
    pos: usize,
}

impl PhraseParser {
    fn new(input: &str) -> Self {
        let tokens = input
            .to_lowercase()
            .replace(',', " , ")
            .split_whitespace()
            .map(str::to_string)
            .collect();
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn peek_at(&self, ahead: usize) -> Option<&str> {
        self.tokens.get(self.pos + ahead).map(String::as_str)
    }

    fn next(&mut self) -> Option<String> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn unexpected(&self) -> RecurrenceError {
        match self.peek() {
            Some(token) => RecurrenceError::UnexpectedToken(token.to_string()),
            None => RecurrenceError::UnexpectedEnd("more words"),
        }
    }

    fn parse(mut self) -> Result<RecurrenceRule, RecurrenceError> {
        let first = self.next().ok_or(RecurrenceError::Empty)?;

        let mut rule = match first.as_str() {
            "daily" => RecurrenceRule::new(Frequency::Daily),
            "weekly" => RecurrenceRule::new(Frequency::Weekly),
            "monthly" => RecurrenceRule::new(Frequency::Monthly),
            "yearly" | "annually" => RecurrenceRule::new(Frequency::Yearly),
            "every" => self.parse_every()?,
            other => return Err(RecurrenceError::UnexpectedToken(other.to_string())),
        };

        self.parse_modifiers(&mut rule)?;
        Ok(rule)
    }

    /// Everything after `every` up to the first modifier
    fn parse_every(&mut self) -> Result<RecurrenceRule, RecurrenceError> {
        let mut interval = 1;
        match self.peek() {
            Some("other") => {
                self.pos += 1;
                interval = 2;
            }
            Some(token) if token.chars().all(|c| c.is_ascii_digit()) => {
                interval = parse_number("interval", token)?;
                self.pos += 1;
            }
            _ => {}
        }

        let token = self
            .next()
            .ok_or(RecurrenceError::UnexpectedEnd("a period such as 'day' or 'week'"))?;

        let mut rule = match token.as_str() {
            "day" | "days" => RecurrenceRule::new(Frequency::Daily),
            "weekday" | "weekdays" => {
                let mut rule = RecurrenceRule::new(Frequency::Weekly);
                rule.by_weekday = [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri]
                    .into_iter()
                    .map(NthWeekday::every)
                    .collect();
                rule
            }
            "week" | "weeks" => RecurrenceRule::new(Frequency::Weekly),
            "month" | "months" => RecurrenceRule::new(Frequency::Monthly),
            "year" | "years" => RecurrenceRule::new(Frequency::Yearly),
            "hour" | "hours" => RecurrenceRule::new(Frequency::Hourly),
            "minute" | "minutes" => RecurrenceRule::new(Frequency::Minutely),
            other => {
                if parse_weekday(other).is_some() {
                    self.pos -= 1;
                    let mut rule = RecurrenceRule::new(Frequency::Weekly);
                    rule.by_weekday = self.parse_weekday_list()?;
                    rule
                } else if parse_month(other).is_some() {
                    self.pos -= 1;
                    let mut rule = RecurrenceRule::new(Frequency::Yearly);
                    rule.by_month = self.parse_month_list()?;
                    rule
                } else {
                    return Err(RecurrenceError::UnexpectedToken(other.to_string()));
                }
            }
        };

        rule.interval = interval;
        Ok(rule)
    }

    fn parse_modifiers(&mut self, rule: &mut RecurrenceRule) -> Result<(), RecurrenceError> {
        while let Some(token) = self.next() {
            match token.as_str() {
                "," | "and" => {}
                "on" => {
                    if self.peek() == Some("the") {
                        self.pos += 1;
                        self.parse_ordinal_clause(rule)?;
                    } else {
                        rule.by_weekday = self.parse_weekday_list()?;
                    }
                }
                "the" => self.parse_ordinal_clause(rule)?,
                "in" => rule.by_month = self.parse_month_list()?,
                "for" => {
                    let count = self.next().ok_or(RecurrenceError::UnexpectedEnd("a count"))?;
                    rule.count = Some(parse_number("count", &count)?);
                    if matches!(self.peek(), Some("times") | Some("time")) {
                        self.pos += 1;
                    }
                }
                "until" => rule.until = Some(self.parse_until()?),
                other => return Err(RecurrenceError::UnexpectedToken(other.to_string())),
            }
        }
        Ok(())
    }

    /// `1st`, `1st and 15th`, `last day`, `2nd tuesday`, `last friday`
    fn parse_ordinal_clause(&mut self, rule: &mut RecurrenceRule) -> Result<(), RecurrenceError> {
        let mut month_days = Vec::new();
        let mut weekdays = Vec::new();

        loop {
            let token = self
                .next()
                .ok_or(RecurrenceError::UnexpectedEnd("an ordinal such as '1st'"))?;
            let n = parse_ordinal(&token)
                .ok_or_else(|| RecurrenceError::UnexpectedToken(token.clone()))?;

            match self.peek().and_then(parse_weekday) {
                Some(weekday) => {
                    self.pos += 1;
                    weekdays.push(NthWeekday::nth(weekday, n));
                }
                None => {
                    if self.peek() == Some("day") {
                        self.pos += 1;
                    }
                    month_days.push(n);
                }
            }

            let continues = matches!(self.peek(), Some(",") | Some("and"))
                && self
                    .peek_at(1)
                    .map(|t| t == "the" || parse_ordinal(t).is_some())
                    .unwrap_or(false);
            if !continues {
                break;
            }
            self.pos += 1;
            if self.peek() == Some("the") {
                self.pos += 1;
            }
        }

        if !month_days.is_empty() {
            rule.by_month_day = month_days;
        }
        if !weekdays.is_empty() {
            rule.by_weekday = weekdays;
        }
        Ok(())
    }

    fn parse_weekday_list(&mut self) -> Result<Vec<NthWeekday>, RecurrenceError> {
        let mut days = Vec::new();
        loop {
            let weekday = self.peek().and_then(parse_weekday).ok_or_else(|| self.unexpected())?;
            self.pos += 1;
            days.push(NthWeekday::every(weekday));

            let continues = matches!(self.peek(), Some(",") | Some("and"))
                && self.peek_at(1).and_then(parse_weekday).is_some();
            if !continues {
                return Ok(days);
            }
            self.pos += 1;
        }
    }

    fn parse_month_list(&mut self) -> Result<Vec<u8>, RecurrenceError> {
        let mut months = Vec::new();
        loop {
            let month = self.peek().and_then(parse_month).ok_or_else(|| self.unexpected())?;
            self.pos += 1;
            months.push(month);

            let continues = matches!(self.peek(), Some(",") | Some("and"))
                && self.peek_at(1).and_then(parse_month).is_some();
            if !continues {
                return Ok(months);
            }
            self.pos += 1;
        }
    }

    /// `2021-01-05` or `january 5, 2021`
    fn parse_until(&mut self) -> Result<NaiveDate, RecurrenceError> {
        let first = self.next().ok_or(RecurrenceError::UnexpectedEnd("a date"))?;

        if let Ok(date) = NaiveDate::parse_from_str(&first, "%Y-%m-%d") {
            return Ok(date);
        }

        let month = parse_month(&first).ok_or_else(|| RecurrenceError::InvalidValue {
            field: "until",
            value: first.clone(),
        })?;
        let day: u32 = parse_number(
            "until",
            &self.next().ok_or(RecurrenceError::UnexpectedEnd("a day"))?,
        )?;
        if self.peek() == Some(",") {
            self.pos += 1;
        }
        let year: i32 = parse_number(
            "until",
            &self.next().ok_or(RecurrenceError::UnexpectedEnd("a year"))?,
        )?;

        NaiveDate::from_ymd_opt(year, month as u32, day).ok_or(RecurrenceError::InvalidValue {
            field: "until",
            value: format!("{}-{}-{}", year, month, day),
        })
    }
}

fn parse_weekday(token: &str) -> Option<Weekday> {
    let token = token.trim_end_matches('s');
    let index = match token {
        "monday" | "mon" | "mo" => 0,
        "tuesday" | "tue" | "tues" | "tu" => 1,
        "wednesday" | "wed" | "we" => 2,
        "thursday" | "thu" | "thur" | "thurs" | "th" => 3,
        "friday" | "fri" | "fr" => 4,
        "saturday" | "sat" | "sa" => 5,
        "sunday" | "sun" | "su" => 6,
        _ => return None,
    };
    weekday_from_index(index)
}

fn parse_month(token: &str) -> Option<u8> {
    let index = MONTH_NAMES.iter().position(|name| {
        let name = name.to_lowercase();
        token == name || (token.len() >= 3 && name.starts_with(token))
    })?;
    Some(index as u8 + 1)
}

fn parse_ordinal(token: &str) -> Option<i8> {
    match token {
        "first" => return Some(1),
        "second" => return Some(2),
        "third" => return Some(3),
        "fourth" => return Some(4),
        "fifth" => return Some(5),
        "last" => return Some(-1),
        _ => {}
    }

    let digits = token
        .strip_suffix("st")
        .or_else(|| token.strip_suffix("nd"))
        .or_else(|| token.strip_suffix("rd"))
        .or_else(|| token.strip_suffix("th"))
        .unwrap_or(token);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().filter(|n: &i8| *n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn parse_every_sunday() {
        let rule = RecurrenceRule::parse("Every Sunday").unwrap();
        assert_eq!(rule.freq, Frequency::Weekly);
        assert_eq!(rule.by_weekday, vec![NthWeekday::every(Weekday::Sun)]);
        assert_eq!(rule.to_text(), "every week on Sunday");
        assert_eq!(rule.to_rrule(), "RRULE:FREQ=WEEKLY;BYDAY=SU");
    }

    #[test]
    fn parse_interval_and_weekday_list() {
        let rule = RecurrenceRule::parse("every 2 weeks on Monday, Wednesday and Friday").unwrap();
        assert_eq!(rule.interval, 2);
        assert_eq!(rule.by_weekday.len(), 3);
        assert_eq!(
            rule.to_text(),
            "every 2 weeks on Monday, Wednesday and Friday"
        );
    }

    #[test]
    fn parse_every_other_day() {
        let rule = RecurrenceRule::parse("every other day").unwrap();
        assert_eq!(rule.freq, Frequency::Daily);
        assert_eq!(rule.interval, 2);
        assert_eq!(rule.to_text(), "every 2 days");
    }

    #[test]
    fn parse_weekday_shortcut() {
        let rule = RecurrenceRule::parse("every weekday").unwrap();
        assert_eq!(rule.to_rrule(), "RRULE:FREQ=WEEKLY;BYDAY=MO,TU,WE,TH,FR");
        assert_eq!(rule.to_text(), "every weekday");
    }

    #[test]
    fn parse_month_day_and_last_day() {
        let rule = RecurrenceRule::parse("every month on the 15th").unwrap();
        assert_eq!(rule.by_month_day, vec![15]);
        assert_eq!(rule.to_text(), "every month on the 15th");

        let last = RecurrenceRule::parse("every month on the last day").unwrap();
        assert_eq!(last.by_month_day, vec![-1]);
        assert_eq!(last.to_text(), "every month on the last day");
    }

    #[test]
    fn parse_nth_weekday_of_month() {
        let rule = RecurrenceRule::parse("every month on the 2nd Tuesday").unwrap();
        assert_eq!(rule.by_weekday, vec![NthWeekday::nth(Weekday::Tue, 2)]);
        assert_eq!(rule.to_rrule(), "RRULE:FREQ=MONTHLY;BYDAY=+2TU");
        assert_eq!(rule.to_text(), "every month on the 2nd Tuesday");
    }

    #[test]
    fn parse_yearly_with_month() {
        let rule = RecurrenceRule::parse("every year in March on the 21st").unwrap();
        assert_eq!(rule.by_month, vec![3]);
        assert_eq!(rule.by_month_day, vec![21]);
        assert_eq!(rule.to_text(), "every year in March on the 21st");
    }

    #[test]
    fn parse_count_and_until() {
        let rule = RecurrenceRule::parse("every day for 3 times").unwrap();
        assert_eq!(rule.count, Some(3));

        let until = RecurrenceRule::parse("every week until January 5, 2021").unwrap();
        assert_eq!(until.until, Some(date("2021-01-05")));
        assert_eq!(until.to_text(), "every week until January 5, 2021");

        let iso = RecurrenceRule::parse("every week until 2021-01-05").unwrap();
        assert_eq!(iso.until, until.until);
    }

    #[test]
    fn parse_rejects_nonsense() {
        assert_eq!(RecurrenceRule::parse("  "), Err(RecurrenceError::Empty));
        assert!(matches!(
            RecurrenceRule::parse("buy milk"),
            Err(RecurrenceError::UnexpectedToken(_))
        ));
        assert!(RecurrenceRule::parse("every").is_err());
        assert!(RecurrenceRule::parse("every sunday at noon").is_err());
    }

    #[test]
    fn parse_rrule_form() {
        let rule = RecurrenceRule::parse("RRULE:FREQ=MONTHLY;INTERVAL=3;BYMONTHDAY=-1").unwrap();
        assert_eq!(rule.freq, Frequency::Monthly);
        assert_eq!(rule.interval, 3);
        assert_eq!(rule.by_month_day, vec![-1]);
        assert_eq!(rule.to_rrule(), "RRULE:FREQ=MONTHLY;INTERVAL=3;BYMONTHDAY=-1");
    }

    #[test]
    fn rrule_rejects_bad_parts() {
        assert!(RecurrenceRule::parse("RRULE:FREQ=WEEKLY;BYDAY=XX").is_err());
        assert!(RecurrenceRule::parse("RRULE:BYDAY=MO").is_err());
        assert!(RecurrenceRule::parse("RRULE:FREQ=WEEKLY;FOO=1").is_err());
        assert!(RecurrenceRule::parse("RRULE:FREQ=MONTHLY;BYMONTHDAY=40").is_err());
    }

    #[test]
    fn rrule_with_multibyte_text_is_an_error() {
        assert!(RecurrenceRule::parse("FREQ=é").is_err());
        assert!(RecurrenceRule::parse("FREQ=DAILY;é").is_err());
        assert!(RecurrenceRule::parse_rrule("RRULé:FREQ=DAILY").is_err());
        assert!(RecurrenceRule::parse_rrule("é").is_err());

        let rule = RecurrenceRule::parse_rrule("rrule:FREQ=DAILY").unwrap();
        assert_eq!(rule.freq, Frequency::Daily);
    }

    #[test]
    fn text_falls_back_to_rrule() {
        let rule = RecurrenceRule::parse("RRULE:FREQ=WEEKLY;BYDAY=-1FR").unwrap();
        assert!(!rule.is_fully_convertible_to_text());
        assert_eq!(rule.to_text(), "RRULE:FREQ=WEEKLY;BYDAY=-1FR");

        let reparsed = RecurrenceRule::parse(&rule.to_text()).unwrap();
        assert_eq!(reparsed, rule);
    }

    #[test]
    fn hourly_is_parsed_but_not_date_based() {
        let rule = RecurrenceRule::parse("every hour").unwrap();
        assert_eq!(rule.freq, Frequency::Hourly);
        assert!(!rule.freq.is_date_based());
        assert!(rule.occurrences_after(date("2021-01-01"), 3).is_empty());
    }

    #[test]
    fn next_sunday_after_new_years_eve() {
        let rule = RecurrenceRule::parse("Every Sunday").unwrap();
        let next = rule.occurrences_after(date("2020-12-31"), 3);
        assert_eq!(
            next,
            vec![date("2021-01-03"), date("2021-01-10"), date("2021-01-17")]
        );
    }

    #[test]
    fn occurrences_are_strictly_after_reference() {
        let rule = RecurrenceRule::parse("every day").unwrap();
        assert_eq!(
            rule.occurrences_after(date("2021-02-27"), 3),
            vec![date("2021-02-28"), date("2021-03-01"), date("2021-03-02")]
        );
    }

    #[test]
    fn biweekly_uses_start_week() {
        let mut rule = RecurrenceRule::parse("every 2 weeks on Monday").unwrap();
        rule.dtstart = Some(date("2021-01-04"));
        assert_eq!(
            rule.occurrences_after(date("2021-01-04"), 2),
            vec![date("2021-01-18"), date("2021-02-01")]
        );
    }

    #[test]
    fn monthly_last_day_handles_short_months() {
        let rule = RecurrenceRule::parse("every month on the last day").unwrap();
        assert_eq!(
            rule.occurrences_after(date("2021-01-15"), 3),
            vec![date("2021-01-31"), date("2021-02-28"), date("2021-03-31")]
        );
    }

    #[test]
    fn monthly_day_31_skips_short_months() {
        let rule = RecurrenceRule::parse("every month on the 31st").unwrap();
        assert_eq!(
            rule.occurrences_after(date("2021-01-31"), 2),
            vec![date("2021-03-31"), date("2021-05-31")]
        );
    }

    #[test]
    fn nth_weekday_occurrences() {
        let rule = RecurrenceRule::parse("every month on the last Friday").unwrap();
        assert_eq!(
            rule.occurrences_after(date("2021-01-01"), 2),
            vec![date("2021-01-29"), date("2021-02-26")]
        );
    }

    #[test]
    fn yearly_defaults_to_start_date() {
        let rule = RecurrenceRule::parse("every year").unwrap();
        assert_eq!(
            rule.occurrences_after(date("2020-03-21"), 2),
            vec![date("2021-03-21"), date("2022-03-21")]
        );
    }

    #[test]
    fn count_limits_series_from_start() {
        let mut rule = RecurrenceRule::parse("every day for 3 times").unwrap();
        rule.dtstart = Some(date("2021-01-01"));
        assert_eq!(
            rule.occurrences_after(date("2021-01-01"), 10),
            vec![date("2021-01-02"), date("2021-01-03")]
        );
    }

    #[test]
    fn until_is_inclusive() {
        let rule = RecurrenceRule::parse("every day until 2021-01-03").unwrap();
        assert_eq!(
            rule.occurrences_after(date("2021-01-01"), 10),
            vec![date("2021-01-02"), date("2021-01-03")]
        );
    }

    #[test]
    fn impossible_rule_terminates() {
        let rule = RecurrenceRule::parse("RRULE:FREQ=YEARLY;BYMONTH=2;BYMONTHDAY=30").unwrap();
        assert!(rule.occurrences_after(date("2021-01-01"), 1).is_empty());
    }

    #[test]
    fn ordinals() {
        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(2), "2nd");
        assert_eq!(ordinal(3), "3rd");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(22), "22nd");
    }
}
