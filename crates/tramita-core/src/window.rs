//! Date windows: the inclusive range of days a run looks at.
//!
//! The chamber API only answers step queries one day at a time, so a window
//! is also the list of per-day query boundaries.

use std::fmt;

use chrono::NaiveDate;

use crate::CoreError;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, CoreError> {
        if start > end {
            return Err(CoreError::InvalidWindow(format!(
                "start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn single_day(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    /// Parse a day selector.
    ///
    /// - nothing: `today` only
    /// - `YYYY-MM-DD`: that day through `today`
    /// - `YYYY-MM-DD:YYYY-MM-DD`: the inclusive pair
    pub fn parse(selector: Option<&str>, today: NaiveDate) -> Result<Self, CoreError> {
        let Some(selector) = selector.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(Self::single_day(today));
        };

        let parts: Vec<&str> = selector.split(':').collect();
        match parts.as_slice() {
            [day] => Self::new(parse_date(day)?, today),
            [start, end] => Self::new(parse_date(start)?, parse_date(end)?),
            _ => Err(CoreError::InvalidWindow(format!(
                "expected YYYY-MM-DD or YYYY-MM-DD:YYYY-MM-DD, got {selector:?}"
            ))),
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Every day of the window, oldest first.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |day| *day <= end)
    }

    pub fn len_days(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    pub fn is_before_start(&self, day: NaiveDate) -> bool {
        day < self.start
    }

    pub fn is_after_end(&self, day: NaiveDate) -> bool {
        day > self.end
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT)
        )
    }
}

fn parse_date(input: &str) -> Result<NaiveDate, CoreError> {
    let input = input.trim();
    NaiveDate::parse_from_str(input, DATE_FORMAT).map_err(|source| CoreError::InvalidDate {
        input: input.to_string(),
        source,
    })
}
