//! Editable view over a recurrence rule
//!
//! [`RepeatAdapter`] owns a [`RecurrenceRule`] and exposes its facets with
//! the exclusion rules of the RRULE grammar applied: a rule is driven either
//! by plain weekdays, by days of the month, or by nth weekdays of the month.
//! Every mutation bumps a revision counter and calls the optional change hook,
//! which lets the owning task line know its phrase must be re-rendered.

use chrono::{Local, NaiveDate, Weekday};
use std::fmt;

use super::recurrence::{Frequency, NthWeekday, RecurrenceError, RecurrenceRule};

type ChangeHook = Box<dyn FnMut(&RecurrenceRule)>;

/// Day-of-month facet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthDay {
    Day(u8),
    Last,
}

pub struct RepeatAdapter {
    rule: RecurrenceRule,
    revision: u64,
    on_change: Option<ChangeHook>,
}

impl RepeatAdapter {
    pub fn new(rule: RecurrenceRule) -> Self {
        Self {
            rule,
            revision: 0,
            on_change: None,
        }
    }

    /// Parses a phrase or `RRULE:` string
    pub fn parse(input: &str) -> Result<Self, RecurrenceError> {
        RecurrenceRule::parse(input).map(Self::new)
    }

    /// Registers a hook called after every facet change
    pub fn with_hook(mut self, hook: impl FnMut(&RecurrenceRule) + 'static) -> Self {
        self.on_change = Some(Box::new(hook));
        self
    }

    pub fn rule(&self) -> &RecurrenceRule {
        &self.rule
    }

    /// Number of facet changes since construction
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_valid(&self) -> bool {
        self.rule.is_valid()
    }

    pub fn to_text(&self) -> String {
        self.rule.to_text()
    }

    pub fn to_rrule(&self) -> String {
        self.rule.to_rrule()
    }

    /// Next `n` dates strictly after the rule's start date (today when unset)
    pub fn next(&self, n: usize) -> Vec<NaiveDate> {
        let start = self
            .rule
            .dtstart
            .unwrap_or_else(|| Local::now().date_naive());
        self.rule.occurrences_after(start, n)
    }

    /// Next `n` dates strictly after `date`
    pub fn next_after(&self, date: NaiveDate, n: usize) -> Vec<NaiveDate> {
        self.rule.occurrences_after(date, n)
    }

    /// Returns the frequency, failing for sub-daily rules
    pub fn frequency(&self) -> Result<Frequency, RecurrenceError> {
        if self.rule.freq.is_date_based() {
            Ok(self.rule.freq)
        } else {
            Err(RecurrenceError::UnsupportedFrequency(self.rule.freq))
        }
    }

    /// Sets the frequency and drops every by-facet
    pub fn set_frequency(&mut self, freq: Frequency) {
        self.rule.freq = freq;
        self.rule.by_month.clear();
        self.rule.by_month_day.clear();
        self.rule.by_weekday.clear();
        self.changed();
    }

    pub fn interval(&self) -> u32 {
        self.rule.interval
    }

    /// Sets the interval; zero is stored as one
    pub fn set_interval(&mut self, interval: u32) {
        self.rule.interval = interval.max(1);
        self.changed();
    }

    /// Plain weekdays (without an ordinal)
    pub fn days_of_week(&self) -> Vec<Weekday> {
        self.rule
            .by_weekday
            .iter()
            .filter(|d| d.nth.is_none())
            .map(|d| d.weekday)
            .collect()
    }

    /// Replaces the weekday facet with plain weekdays and clears days of month
    pub fn set_days_of_week(&mut self, days: &[Weekday]) {
        let mut seen = Vec::new();
        for day in days {
            if !seen.contains(day) {
                seen.push(*day);
            }
        }
        seen.sort_by_key(|d| d.num_days_from_monday());

        self.rule.by_weekday = seen.into_iter().map(NthWeekday::every).collect();
        self.rule.by_month_day.clear();
        self.changed();
    }

    pub fn day_of_month(&self) -> Option<MonthDay> {
        match self.rule.by_month_day.first() {
            Some(-1) => Some(MonthDay::Last),
            Some(d) if *d > 0 => Some(MonthDay::Day(*d as u8)),
            _ => None,
        }
    }

    /// Sets a single day of the month and clears the weekday facet
    pub fn set_day_of_month(&mut self, day: MonthDay) -> Result<(), RecurrenceError> {
        let value = match day {
            MonthDay::Last => -1,
            MonthDay::Day(d) if (1..=31).contains(&d) => d as i8,
            MonthDay::Day(d) => {
                return Err(RecurrenceError::InvalidValue {
                    field: "day of month",
                    value: d.to_string(),
                })
            }
        };

        self.rule.by_month_day = vec![value];
        self.rule.by_weekday.clear();
        self.changed();
        Ok(())
    }

    pub fn months_of_year(&self) -> &[u8] {
        &self.rule.by_month
    }

    pub fn set_months_of_year(&mut self, months: &[u8]) -> Result<(), RecurrenceError> {
        if let Some(month) = months.iter().find(|m| !(1..=12).contains(*m)) {
            return Err(RecurrenceError::InvalidValue {
                field: "month",
                value: month.to_string(),
            });
        }

        let mut months = months.to_vec();
        months.sort_unstable();
        months.dedup();
        self.rule.by_month = months;
        self.changed();
        Ok(())
    }

    /// Weekday entries carrying an ordinal (`2nd Tuesday`)
    pub fn weekdays_of_month(&self) -> Vec<NthWeekday> {
        self.rule
            .by_weekday
            .iter()
            .filter(|d| d.nth.is_some())
            .copied()
            .collect()
    }

    /// Replaces the weekday facet with nth weekdays and clears days of month
    pub fn set_weekdays_of_month(&mut self, days: &[NthWeekday]) -> Result<(), RecurrenceError> {
        if let Some(day) = days
            .iter()
            .find(|d| !matches!(d.nth, Some(n) if (1..=5).contains(&n) || n == -1))
        {
            return Err(RecurrenceError::InvalidValue {
                field: "weekday ordinal",
                value: format!("{:?}", day.nth),
            });
        }

        self.rule.by_weekday = days.to_vec();
        self.rule.by_month_day.clear();
        self.changed();
        Ok(())
    }

    pub fn set_count(&mut self, count: Option<u32>) {
        self.rule.count = count.filter(|c| *c > 0);
        self.changed();
    }

    pub fn set_until(&mut self, until: Option<NaiveDate>) {
        self.rule.until = until;
        self.changed();
    }

    pub fn set_start(&mut self, start: Option<NaiveDate>) {
        self.rule.dtstart = start;
        self.changed();
    }

    fn changed(&mut self) {
        self.revision += 1;
        if let Some(hook) = self.on_change.as_mut() {
            hook(&self.rule);
        }
    }
}

impl Clone for RepeatAdapter {
    /// Clones the rule and revision; the hook stays with the original
    fn clone(&self) -> Self {
        Self {
            rule: self.rule.clone(),
            revision: self.revision,
            on_change: None,
        }
    }
}

impl fmt::Debug for RepeatAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepeatAdapter")
            .field("rule", &self.rule.to_rrule())
            .field("revision", &self.revision)
            .field("hook", &self.on_change.is_some())
            .finish()
    }
}

impl PartialEq for RepeatAdapter {
    fn eq(&self, other: &Self) -> bool {
        self.rule == other.rule
    }
}
