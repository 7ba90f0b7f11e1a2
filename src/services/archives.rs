//! Archive periods and previous/next navigation
//!
//! Archive pages are addressed by a year, a month, a `%W` week (weeks start
//! on Monday, week 0 holds the days before the first Monday of the year) or
//! a day. Each period covers a half-open range of local dates.
//!
//! Navigation links only point at periods that actually contain entries:
//! they are computed from the ascending list of days with entries.

use chrono::{Datelike, Duration, FixedOffset, NaiveDate, TimeZone, Utc, DateTime};
use once_cell::sync::OnceCell;
use serde::Serialize;

/// Errors raised while reading archive URL components
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PeriodError {
    #[error("Invalid year: {0}")]
    InvalidYear(String),
    #[error("Invalid month: {0}")]
    InvalidMonth(String),
    #[error("Invalid week: {0}")]
    InvalidWeek(String),
    #[error("Invalid day: {0}")]
    InvalidDay(String),
    #[error("Invalid date: {0}")]
    InvalidDate(String),
}

/// An archive period, as requested in a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchivePeriod {
    Year(i32),
    Month(i32, u32),
    /// Year and `%W` week number
    Week(i32, u32),
    Day(NaiveDate),
}

impl ArchivePeriod {
    pub fn year(year: &str) -> Result<Self, PeriodError> {
        Ok(Self::Year(parse_year(year)?))
    }

    pub fn month(year: &str, month: &str) -> Result<Self, PeriodError> {
        let year = parse_year(year)?;
        let month = parse_month(month)?;
        Ok(Self::Month(year, month))
    }

    pub fn week(year: &str, week: &str) -> Result<Self, PeriodError> {
        let year = parse_year(year)?;
        let week: u32 = week
            .parse()
            .map_err(|_| PeriodError::InvalidWeek(week.to_string()))?;
        if week > 53 {
            return Err(PeriodError::InvalidWeek(week.to_string()));
        }
        Ok(Self::Week(year, week))
    }

    pub fn day(year: &str, month: &str, day: &str) -> Result<Self, PeriodError> {
        let y = parse_year(year)?;
        let m = parse_month(month)?;
        let d: u32 = day
            .parse()
            .map_err(|_| PeriodError::InvalidDay(day.to_string()))?;
        NaiveDate::from_ymd_opt(y, m, d)
            .map(Self::Day)
            .ok_or_else(|| PeriodError::InvalidDate(format!("{}-{}-{}", year, month, day)))
    }

    /// First local day of the period
    pub fn start(&self) -> NaiveDate {
        match *self {
            Self::Year(y) => first_day(y, 1),
            Self::Month(y, m) => first_day(y, m),
            Self::Week(y, w) => week_start(y, w),
            Self::Day(d) => d,
        }
    }

    /// First local day after the period
    pub fn end(&self) -> NaiveDate {
        match *self {
            Self::Year(y) => first_day(y + 1, 1),
            Self::Month(y, 12) => first_day(y + 1, 1),
            Self::Month(y, m) => first_day(y, m + 1),
            Self::Week(..) => self.start() + Duration::days(7),
            Self::Day(d) => d + Duration::days(1),
        }
    }

    /// `[start, end)` as UTC instants for the given time zone
    pub fn utc_range(&self, tz: &FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
        (local_midnight(self.start(), tz), local_midnight(self.end(), tz))
    }

    /// URL components used to pick the most specific template
    pub fn template_parts(&self) -> TemplateParts {
        match *self {
            Self::Year(y) => TemplateParts {
                year: Some(y),
                ..TemplateParts::default()
            },
            Self::Month(y, m) => TemplateParts {
                year: Some(y),
                month: Some(m),
                ..TemplateParts::default()
            },
            Self::Week(y, w) => TemplateParts {
                year: Some(y),
                week: Some(w),
                ..TemplateParts::default()
            },
            Self::Day(d) => TemplateParts::for_day(d),
        }
    }
}

/// Date components of an archive URL
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TemplateParts {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub week: Option<u32>,
    pub day: Option<u32>,
}

impl TemplateParts {
    pub fn for_day(date: NaiveDate) -> Self {
        Self {
            year: Some(date.year()),
            month: Some(date.month()),
            week: None,
            day: Some(date.day()),
        }
    }
}

fn parse_year(raw: &str) -> Result<i32, PeriodError> {
    match raw.parse::<i32>() {
        Ok(year) if (1..=9999).contains(&year) && raw.len() == 4 => Ok(year),
        _ => Err(PeriodError::InvalidYear(raw.to_string())),
    }
}

fn parse_month(raw: &str) -> Result<u32, PeriodError> {
    match raw.parse::<u32>() {
        Ok(month) if (1..=12).contains(&month) => Ok(month),
        _ => Err(PeriodError::InvalidMonth(raw.to_string())),
    }
}

fn first_day(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

/// Monday starting week `week` of `year` in `%W` numbering.
///
/// Week 0 starts on the Monday on or before January 1st, so it may begin in
/// the previous year.
pub fn week_start(year: i32, week: u32) -> NaiveDate {
    let jan1 = first_day(year, 1);
    let first_monday = jan1 + Duration::days(i64::from((7 - jan1.weekday().num_days_from_monday()) % 7));
    first_monday + Duration::weeks(i64::from(week) - 1)
}

/// `%W` week number of a date
pub fn week_number(date: NaiveDate) -> u32 {
    date.format("%W").to_string().parse().unwrap_or(0)
}

/// Monday of the week containing `date`
pub fn monday_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// UTC instant of local midnight starting `date`
pub fn local_midnight(date: NaiveDate, tz: &FixedOffset) -> DateTime<Utc> {
    let naive = date.and_time(chrono::NaiveTime::MIN);
    match tz.from_local_datetime(&naive).single() {
        Some(local) => local.with_timezone(&Utc),
        None => Utc.from_utc_datetime(&naive),
    }
}

/// Distinct local days, in ascending order, of a list of instants
pub fn distinct_days(dates: &[DateTime<Utc>], tz: &FixedOffset) -> Vec<NaiveDate> {
    let mut days: Vec<NaiveDate> = dates
        .iter()
        .map(|d| d.with_timezone(tz).date_naive())
        .collect();
    days.sort_unstable();
    days.dedup();
    days
}

/// Granularity of an archive `date_list`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateKind {
    Year,
    Month,
    Day,
}

/// Distinct periods of the given kind, represented by their first day
pub fn date_list(days: &[NaiveDate], kind: DateKind) -> Vec<NaiveDate> {
    let mut list: Vec<NaiveDate> = days
        .iter()
        .map(|d| match kind {
            DateKind::Year => first_day(d.year(), 1),
            DateKind::Month => first_day(d.year(), d.month()),
            DateKind::Day => *d,
        })
        .collect();
    list.sort_unstable();
    list.dedup();
    list
}

/// `(previous, next)` for one kind of period
pub type Slot = (Option<NaiveDate>, Option<NaiveDate>);

/// Nearest periods with entries around a date
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PreviousNext {
    pub year: Slot,
    pub month: Slot,
    pub week: Slot,
    pub day: Slot,
}

/// Compute the nearest previous and next year, month, week and day holding
/// entries, from the ascending list of days with entries.
///
/// The next week is the Monday of the first day with entries at or after
/// `date + 7 days`, so asking from a week's Monday yields the following week
/// when it has entries.
pub fn previous_next_published(date: NaiveDate, days: &[NaiveDate]) -> PreviousNext {
    let date_year = first_day(date.year(), 1);
    let date_month = first_day(date.year(), date.month());
    let date_next_week = date + Duration::weeks(1);

    let mut result = PreviousNext::default();
    for &d in days {
        let d_year = first_day(d.year(), 1);
        let d_month = first_day(d.year(), d.month());

        if d_year < date_year {
            result.year.0 = Some(d_year);
        } else if d_year > date_year && result.year.1.is_none() {
            result.year.1 = Some(d_year);
        }

        if d_month < date_month {
            result.month.0 = Some(d_month);
        } else if d_month > date_month && result.month.1.is_none() {
            result.month.1 = Some(d_month);
        }

        if d < date {
            result.day.0 = Some(d);
            result.week.0 = Some(monday_of(d));
        } else if d > date && result.day.1.is_none() {
            result.day.1 = Some(d);
        }

        if d >= date_next_week && result.week.1.is_none() {
            result.week.1 = Some(monday_of(d));
        }
    }
    result
}

/// Request-scoped navigation around one archive date.
///
/// The previous/next computation runs at most once however many getters a
/// view reads.
#[derive(Debug)]
pub struct ArchiveNavigator {
    date: NaiveDate,
    days: Vec<NaiveDate>,
    computed: OnceCell<PreviousNext>,
}

impl ArchiveNavigator {
    pub fn new(date: NaiveDate, days: Vec<NaiveDate>) -> Self {
        Self {
            date,
            days,
            computed: OnceCell::new(),
        }
    }

    pub fn previous_next(&self) -> &PreviousNext {
        self.computed
            .get_or_init(|| previous_next_published(self.date, &self.days))
    }

    pub fn next_year(&self) -> Option<NaiveDate> {
        self.previous_next().year.1
    }

    pub fn previous_year(&self) -> Option<NaiveDate> {
        self.previous_next().year.0
    }

    pub fn next_month(&self) -> Option<NaiveDate> {
        self.previous_next().month.1
    }

    pub fn previous_month(&self) -> Option<NaiveDate> {
        self.previous_next().month.0
    }

    pub fn next_week(&self) -> Option<NaiveDate> {
        self.previous_next().week.1
    }

    pub fn previous_week(&self) -> Option<NaiveDate> {
        self.previous_next().week.0
    }

    pub fn next_day(&self) -> Option<NaiveDate> {
        self.previous_next().day.1
    }

    pub fn previous_day(&self) -> Option<NaiveDate> {
        self.previous_next().day.0
    }

    #[cfg(test)]
    fn is_computed(&self) -> bool {
        self.computed.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;
    use proptest::prelude::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_parse_periods() {
        assert_eq!(ArchivePeriod::year("2024"), Ok(ArchivePeriod::Year(2024)));
        assert_eq!(ArchivePeriod::month("2024", "03"), Ok(ArchivePeriod::Month(2024, 3)));
        assert_eq!(ArchivePeriod::week("2024", "10"), Ok(ArchivePeriod::Week(2024, 10)));
        assert_eq!(
            ArchivePeriod::day("2024", "02", "29"),
            Ok(ArchivePeriod::Day(d(2024, 2, 29)))
        );

        assert!(ArchivePeriod::year("24").is_err());
        assert!(ArchivePeriod::year("abcd").is_err());
        assert!(ArchivePeriod::month("2024", "13").is_err());
        assert!(ArchivePeriod::month("2024", "0").is_err());
        assert!(ArchivePeriod::week("2024", "54").is_err());
        assert!(ArchivePeriod::day("2023", "02", "29").is_err());
    }

    #[test]
    fn test_period_ranges() {
        let year = ArchivePeriod::Year(2024);
        assert_eq!((year.start(), year.end()), (d(2024, 1, 1), d(2025, 1, 1)));

        let december = ArchivePeriod::Month(2024, 12);
        assert_eq!((december.start(), december.end()), (d(2024, 12, 1), d(2025, 1, 1)));

        let day = ArchivePeriod::Day(d(2024, 2, 29));
        assert_eq!(day.end(), d(2024, 3, 1));
    }

    #[test]
    fn test_week_numbering_starts_on_monday() {
        // 2024-01-01 is a Monday: week 1 starts on it, week 0 the week before
        assert_eq!(week_start(2024, 1), d(2024, 1, 1));
        assert_eq!(week_start(2024, 0), d(2023, 12, 25));
        assert_eq!(week_number(d(2024, 1, 1)), 1);

        // 2023-01-01 is a Sunday: it belongs to week 0
        assert_eq!(week_number(d(2023, 1, 1)), 0);
        assert_eq!(week_start(2023, 1), d(2023, 1, 2));

        let week = ArchivePeriod::Week(2023, 1);
        assert_eq!(week.end(), d(2023, 1, 9));
    }

    #[test]
    fn test_utc_range_shifts_with_offset() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let (start, end) = ArchivePeriod::Day(d(2024, 3, 10)).utc_range(&tz);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 9, 22, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 3, 10, 22, 0, 0).unwrap());
    }

    #[test]
    fn test_distinct_days_and_date_lists() {
        let tz = FixedOffset::east_opt(0).unwrap();
        let instants = vec![
            Utc.with_ymd_and_hms(2024, 3, 9, 8, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 9, 20, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2023, 7, 1, 0, 0, 0).unwrap(),
        ];
        let days = distinct_days(&instants, &tz);
        assert_eq!(days, vec![d(2023, 7, 1), d(2024, 3, 9)]);
        assert_eq!(date_list(&days, DateKind::Year), vec![d(2023, 1, 1), d(2024, 1, 1)]);
        assert_eq!(date_list(&days, DateKind::Month), vec![d(2023, 7, 1), d(2024, 3, 1)]);
    }

    #[test]
    fn test_previous_next_empty() {
        assert_eq!(previous_next_published(d(2024, 1, 1), &[]), PreviousNext::default());
    }

    #[test]
    fn test_previous_next_published() {
        let days = vec![d(2023, 6, 15), d(2024, 3, 4), d(2024, 3, 9), d(2024, 3, 20), d(2025, 2, 1)];
        let pn = previous_next_published(d(2024, 3, 9), &days);

        assert_eq!(pn.year, (Some(d(2023, 1, 1)), Some(d(2025, 1, 1))));
        assert_eq!(pn.month, (Some(d(2023, 6, 1)), Some(d(2025, 2, 1))));
        assert_eq!(pn.day, (Some(d(2024, 3, 4)), Some(d(2024, 3, 20))));
        // 2024-03-04 is a Monday; 2024-03-20 is a Wednesday in the week of the 18th
        assert_eq!(pn.week, (Some(d(2024, 3, 4)), Some(d(2024, 3, 18))));
    }

    #[test]
    fn test_next_week_includes_following_monday() {
        let days = vec![d(2024, 3, 11)];
        let pn = previous_next_published(d(2024, 3, 4), &days);
        assert_eq!(pn.week.1, Some(d(2024, 3, 11)));
        assert_eq!(pn.day.1, Some(d(2024, 3, 11)));
    }

    #[test]
    fn test_next_week_boundary_is_inclusive() {
        // exactly seven days later counts as the next week
        let pn = previous_next_published(d(2024, 3, 6), &[d(2024, 3, 13)]);
        assert_eq!(pn.week.1, Some(d(2024, 3, 11)));

        // six days later from a Wednesday is already next week's Tuesday,
        // but stays below the date + 7 threshold
        let pn = previous_next_published(d(2024, 3, 6), &[d(2024, 3, 12)]);
        assert_eq!(pn.week.1, None);
        assert_eq!(pn.day.1, Some(d(2024, 3, 12)));

        let pn = previous_next_published(d(2024, 3, 6), &[d(2024, 3, 12), d(2024, 3, 13)]);
        assert_eq!(pn.week.1, Some(d(2024, 3, 11)));
    }

    #[test]
    fn test_navigator_computes_lazily_once() {
        let nav = ArchiveNavigator::new(d(2024, 3, 9), vec![d(2024, 1, 1), d(2024, 5, 1)]);
        assert!(!nav.is_computed());
        assert_eq!(nav.previous_month(), Some(d(2024, 1, 1)));
        assert!(nav.is_computed());
        assert_eq!(nav.next_month(), Some(d(2024, 5, 1)));
        assert_eq!(nav.previous_year(), None);
        assert_eq!(nav.next_year(), None);
        assert_eq!(nav.previous_day(), Some(d(2024, 1, 1)));
        assert_eq!(nav.next_day(), Some(d(2024, 5, 1)));
        assert_eq!(nav.previous_week(), Some(d(2024, 1, 1)));
        assert_eq!(nav.next_week(), Some(d(2024, 4, 29)));
    }

    fn arb_days() -> impl Strategy<Value = Vec<NaiveDate>> {
        prop::collection::vec(0i64..2000, 0..30).prop_map(|offsets| {
            let base = d(2020, 1, 1);
            let mut days: Vec<NaiveDate> = offsets.into_iter().map(|o| base + Duration::days(o)).collect();
            days.sort_unstable();
            days.dedup();
            days
        })
    }

    proptest! {
        #[test]
        fn prop_previous_is_before_and_next_after(days in arb_days(), offset in 0i64..2000) {
            let date = d(2020, 1, 1) + Duration::days(offset);
            let pn = previous_next_published(date, &days);

            if let Some(prev) = pn.day.0 {
                prop_assert!(prev < date);
                prop_assert!(days.contains(&prev));
                prop_assert!(!days.iter().any(|x| *x > prev && *x < date));
            }
            if let Some(next) = pn.day.1 {
                prop_assert!(next > date);
                prop_assert!(!days.iter().any(|x| *x > date && *x < next));
            }
            if let Some(prev) = pn.year.0 {
                prop_assert!(prev.year() < date.year());
            }
            if let Some(next) = pn.month.1 {
                prop_assert!(next > date);
                prop_assert_eq!(next.day(), 1);
            }
            if let Some(next) = pn.week.1 {
                prop_assert_eq!(next.weekday(), Weekday::Mon);
                prop_assert!(next + Duration::days(6) >= date + Duration::weeks(1));
            }
            prop_assert_eq!(pn.day.0.is_some(), days.iter().any(|x| *x < date));
        }
    }
}
