//! Calendar date parsing and construction.
//!
//! Every date in the application is a [time::Date]: a calendar date with no
//! time of day and no UTC offset. Dates are stored as `YYYY-MM-DD` text, so a
//! date written to the database and a date re-derived for a projected
//! occurrence always agree on their year, month and day.

use std::fmt::Display;

use time::{
    Date, Month, OffsetDateTime, PrimitiveDateTime, format_description::well_known::Rfc3339,
    macros::format_description,
};

use crate::Error;

/// The earliest year accepted by the `YYYY-MM-DD` fast path.
pub const MIN_YEAR: i32 = 1900;
/// The latest year accepted by the `YYYY-MM-DD` fast path.
pub const MAX_YEAR: i32 = 2100;

/// A (year, month, day) triple extracted from user input.
///
/// The day is only checked to be within 1-31, so a triple such as 2024-02-31
/// is representable. [make_local_date] clamps such days when building a
/// [Date].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarDate {
    /// The year, e.g. 2024.
    pub year: i32,
    /// The month number, 1-12.
    pub month: u8,
    /// The day of the month, 1-31.
    pub day: u8,
}

impl CalendarDate {
    /// Build the [Date] for this triple, clamping the day to the end of the month.
    pub fn to_date(self) -> Result<Date, Error> {
        make_local_date(self.year, self.month, self.day)
    }
}

/// Input accepted by [parse_calendar_date].
#[derive(Debug, Clone, Copy)]
pub enum DateInput<'a> {
    /// An already parsed date.
    Date(Date),
    /// Free text, ideally in the `YYYY-MM-DD` format.
    Text(&'a str),
}

impl From<Date> for DateInput<'_> {
    fn from(date: Date) -> Self {
        Self::Date(date)
    }
}

impl<'a> From<&'a str> for DateInput<'a> {
    fn from(text: &'a str) -> Self {
        Self::Text(text)
    }
}

/// Extract a (year, month, day) triple from `input`.
///
/// Strings in the exact `YYYY-MM-DD` format take a fast path which only
/// accepts years 1900-2100, months 1-12 and days 1-31. Any other string is
/// tried against a few common date and date-time formats (RFC 3339,
/// `YYYY-MM-DDTHH:MM[:SS]`, `YYYY/MM/DD` and `DD/MM/YYYY`).
///
/// Returns `None` if the input cannot be understood as a date.
pub fn parse_calendar_date<'a>(input: impl Into<DateInput<'a>>) -> Option<CalendarDate> {
    match input.into() {
        DateInput::Date(date) => Some(CalendarDate {
            year: date.year(),
            month: date.month() as u8,
            day: date.day(),
        }),
        DateInput::Text(text) => {
            let text = text.trim();

            if is_iso_date_shape(text) {
                parse_iso_date(text)
            } else {
                parse_fallback(text)
            }
        }
    }
}

/// Parse `text` into a [Date], clamping out-of-range days.
///
/// # Errors
/// Returns [Error::InvalidDate] if `text` is not a recognisable date.
pub fn parse_date(text: &str) -> Result<Date, Error> {
    parse_calendar_date(text)
        .ok_or_else(|| Error::InvalidDate(text.to_owned()))?
        .to_date()
}

/// Build the calendar date `year`-`month`-`day`.
///
/// If `day` is past the end of the month (e.g. the 31st in February), the
/// last day of that month is used instead.
///
/// # Errors
/// Returns [Error::InvalidDate] if `month` is not in 1-12, `day` is zero or
/// the year is outside the range supported by [time::Date].
pub fn make_local_date(year: i32, month: u8, day: u8) -> Result<Date, Error> {
    let invalid = || Error::InvalidDate(format!("{year:04}-{month:02}-{day:02}"));

    let month = Month::try_from(month).map_err(|_| invalid())?;

    if day == 0 {
        return Err(invalid());
    }

    let day = day.min(last_day_of_month(year, month));

    Date::from_calendar_date(year, month, day).map_err(|_| invalid())
}

/// The number of days in `month` of `year`.
pub fn last_day_of_month(year: i32, month: Month) -> u8 {
    month.length(year)
}

fn is_iso_date_shape(text: &str) -> bool {
    let bytes = text.as_bytes();

    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, byte)| match i {
            4 | 7 => *byte == b'-',
            _ => byte.is_ascii_digit(),
        })
}

fn parse_iso_date(text: &str) -> Option<CalendarDate> {
    let year: i32 = text[0..4].parse().ok()?;
    let month: u8 = text[5..7].parse().ok()?;
    let day: u8 = text[8..10].parse().ok()?;

    if !(MIN_YEAR..=MAX_YEAR).contains(&year) || !(1..=12).contains(&month) || !(1..=31).contains(&day)
    {
        return None;
    }

    Some(CalendarDate { year, month, day })
}

fn parse_fallback(text: &str) -> Option<CalendarDate> {
    let date = OffsetDateTime::parse(text, &Rfc3339)
        .map(|date_time| date_time.date())
        .or_else(|_| {
            PrimitiveDateTime::parse(
                text,
                format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
            )
            .map(|date_time| date_time.date())
        })
        .or_else(|_| {
            PrimitiveDateTime::parse(
                text,
                format_description!("[year]-[month]-[day]T[hour]:[minute]"),
            )
            .map(|date_time| date_time.date())
        })
        .or_else(|_| Date::parse(text, format_description!("[year]/[month]/[day]")))
        .or_else(|_| Date::parse(text, format_description!("[day]/[month]/[year]")))
        .ok()?;

    parse_calendar_date(date)
}

/// An inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    /// The first date in the range.
    pub start: Date,
    /// The last date in the range.
    pub end: Date,
}

impl DateRange {
    /// Whether `date` lies within the range, including both ends.
    pub fn contains(&self, date: Date) -> bool {
        self.start <= date && date <= self.end
    }
}

/// A validated calendar month of a specific year.
///
/// Months order chronologically, so `MonthPeriod::of(a) <= MonthPeriod::of(b)`
/// whenever `a <= b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthPeriod {
    year: i32,
    month: u8,
}

impl MonthPeriod {
    /// Create a month period.
    ///
    /// # Errors
    /// Returns [Error::InvalidPeriod] if `month` is not in 1-12 or `year` is
    /// outside 1900-2100.
    pub fn new(year: i32, month: u8) -> Result<Self, Error> {
        if !(1..=12).contains(&month) || !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(Error::InvalidPeriod(format!("{month}/{year}")));
        }

        Ok(Self { year, month })
    }

    /// The month that `date` falls in.
    pub fn of(date: Date) -> Self {
        Self {
            year: date.year(),
            month: date.month() as u8,
        }
    }

    /// The year of the period.
    pub fn year(&self) -> i32 {
        self.year
    }

    /// The month number, 1-12.
    pub fn month(&self) -> u8 {
        self.month
    }

    /// The first and last day of the month.
    pub fn bounds(&self) -> DateRange {
        DateRange {
            start: self.day_clamped(1),
            end: self.day_clamped(31),
        }
    }

    /// Whether `date` falls within this month.
    pub fn contains(&self, date: Date) -> bool {
        Self::of(date) == *self
    }

    /// The date with day-of-month `day` in this month, clamped to the last
    /// day of the month.
    pub fn day_clamped(&self, day: u8) -> Date {
        let month = self.time_month();
        let day = day.clamp(1, last_day_of_month(self.year, month));

        // Both the month and the clamped day are valid by construction.
        Date::from_calendar_date(self.year, month, day).unwrap_or(Date::MIN)
    }

    fn time_month(&self) -> Month {
        Month::try_from(self.month).unwrap_or(Month::January)
    }
}

impl Display for MonthPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[cfg(test)]
mod parse_tests {
    use time::macros::date;

    use super::{CalendarDate, parse_calendar_date, parse_date};

    #[test]
    fn parses_iso_date() {
        let got = parse_calendar_date("2024-03-10");

        assert_eq!(
            got,
            Some(CalendarDate {
                year: 2024,
                month: 3,
                day: 10
            })
        );
    }

    #[test]
    fn iso_fast_path_does_not_check_days_per_month() {
        let got = parse_calendar_date("2023-02-31");

        assert_eq!(
            got,
            Some(CalendarDate {
                year: 2023,
                month: 2,
                day: 31
            })
        );
    }

    #[test]
    fn iso_fast_path_rejects_out_of_range_components() {
        for text in ["1899-01-01", "2101-01-01", "2024-13-01", "2024-00-10", "2024-01-32"] {
            assert_eq!(parse_calendar_date(text), None, "{text} should be rejected");
        }
    }

    #[test]
    fn trims_whitespace() {
        assert!(parse_calendar_date("  2024-03-10\n").is_some());
    }

    #[test]
    fn falls_back_to_date_time_formats() {
        let want = Some(CalendarDate {
            year: 2024,
            month: 6,
            day: 15,
        });

        assert_eq!(parse_calendar_date("2024-06-15T10:30:00Z"), want);
        assert_eq!(parse_calendar_date("2024-06-15T10:30:00"), want);
        assert_eq!(parse_calendar_date("2024-06-15T10:30"), want);
        assert_eq!(parse_calendar_date("2024/06/15"), want);
        assert_eq!(parse_calendar_date("15/06/2024"), want);
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_calendar_date("next tuesday"), None);
        assert_eq!(parse_calendar_date(""), None);
    }

    #[test]
    fn accepts_date_values() {
        let got = parse_calendar_date(date!(2025 - 12 - 31));

        assert_eq!(
            got,
            Some(CalendarDate {
                year: 2025,
                month: 12,
                day: 31
            })
        );
    }

    #[test]
    fn parse_date_clamps_day() {
        assert_eq!(parse_date("2023-02-31"), Ok(date!(2023 - 02 - 28)));
    }
}

#[cfg(test)]
mod make_local_date_tests {
    use time::macros::date;

    use crate::Error;

    use super::make_local_date;

    #[test]
    fn round_trips_components() {
        let date = make_local_date(2024, 1, 10).unwrap();

        assert_eq!(date.year(), 2024);
        assert_eq!(date.month() as u8, 1);
        assert_eq!(date.day(), 10);
    }

    #[test]
    fn clamps_to_end_of_february() {
        assert_eq!(make_local_date(2023, 2, 31), Ok(date!(2023 - 02 - 28)));
        assert_eq!(make_local_date(2024, 2, 31), Ok(date!(2024 - 02 - 29)));
    }

    #[test]
    fn clamps_february_of_century_years() {
        assert_eq!(make_local_date(1900, 2, 29), Ok(date!(1900 - 02 - 28)));
        assert_eq!(make_local_date(2000, 2, 30), Ok(date!(2000 - 02 - 29)));
    }

    #[test]
    fn clamps_to_end_of_thirty_day_month() {
        assert_eq!(make_local_date(2024, 4, 31), Ok(date!(2024 - 04 - 30)));
    }

    #[test]
    fn rejects_invalid_month_and_day() {
        assert!(matches!(make_local_date(2024, 13, 1), Err(Error::InvalidDate(_))));
        assert!(matches!(make_local_date(2024, 1, 0), Err(Error::InvalidDate(_))));
    }
}
