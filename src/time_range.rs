use std::convert::TryFrom;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc};

use crate::error::CostNotifierError;

const API_DATE_FORMAT: &str = "%Y-%m-%d";

/// Half-open date interval `[start, end)`, the way Cost Explorer reads `TimePeriod`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn start_param(&self) -> String {
        self.start.format(API_DATE_FORMAT).to_string()
    }

    pub fn end_param(&self) -> String {
        self.end.format(API_DATE_FORMAT).to_string()
    }
}

/// The two windows queried for one report: spend so far and the forecast for the rest
/// of the month.
#[derive(Debug, PartialEq)]
pub struct ReportWindow {
    pub month_to_date: DateRange,
    pub forecast: DateRange,
}

impl TryFrom<NaiveDate> for ReportWindow {
    type Error = CostNotifierError;

    fn try_from(reference_date: NaiveDate) -> Result<Self, Self::Error> {
        let first_of_month = first_day_of_month(reference_date.year(), reference_date.month())?;
        let first_of_next_month = first_day_of_next_month(reference_date)?;

        // On the 1st nothing of the current month has been billed yet.
        let month_to_date_start = if reference_date == first_of_month {
            let last_of_previous_month = first_of_month.pred_opt().ok_or_else(|| {
                CostNotifierError::InvalidReport(format!("no month before {}", reference_date))
            })?;
            first_day_of_month(last_of_previous_month.year(), last_of_previous_month.month())?
        } else {
            first_of_month
        };

        Ok(ReportWindow {
            month_to_date: DateRange {
                start: month_to_date_start,
                end: reference_date,
            },
            forecast: DateRange {
                start: reference_date,
                end: first_of_next_month,
            },
        })
    }
}

impl ReportWindow {
    /// Last day covered by the forecast, inclusive.
    pub fn forecast_last_day(&self) -> NaiveDate {
        self.forecast.end.pred_opt().unwrap_or(self.forecast.end)
    }
}

/// Calendar date of `instant` as seen at `offset`.
pub fn reference_date(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    instant.with_timezone(&offset).date_naive()
}

fn first_day_of_month(year: i32, month: u32) -> Result<NaiveDate, CostNotifierError> {
    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
        CostNotifierError::InvalidReport(format!("invalid month {}-{}", year, month))
    })
}

fn first_day_of_next_month(date: NaiveDate) -> Result<NaiveDate, CostNotifierError> {
    if date.month() == 12 {
        first_day_of_month(date.year() + 1, 1)
    } else {
        first_day_of_month(date.year(), date.month() + 1)
    }
}

#[cfg(test)]
mod tests {
    use crate::time_range::{reference_date, DateRange, ReportWindow};
    use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
    use std::convert::TryFrom;
    use std::str::FromStr;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_try_from_mid_month() {
        let window = ReportWindow::try_from(date(2024, 3, 15)).unwrap();
        assert_eq!(
            window,
            ReportWindow {
                month_to_date: DateRange {
                    start: date(2024, 3, 1),
                    end: date(2024, 3, 15),
                },
                forecast: DateRange {
                    start: date(2024, 3, 15),
                    end: date(2024, 4, 1),
                },
            }
        );
        assert_eq!(window.forecast_last_day(), date(2024, 3, 31));
        assert_eq!(window.month_to_date.start_param(), "2024-03-01");
        assert_eq!(window.forecast.end_param(), "2024-04-01");
    }

    #[test]
    fn test_try_from_first_day_covers_previous_month() {
        let window = ReportWindow::try_from(date(2021, 1, 1)).unwrap();
        assert_eq!(
            window.month_to_date,
            DateRange {
                start: date(2020, 12, 1),
                end: date(2021, 1, 1),
            }
        );
        assert_eq!(window.forecast.end, date(2021, 2, 1));
    }

    #[test]
    fn test_try_from_december() {
        let window = ReportWindow::try_from(date(2020, 12, 31)).unwrap();
        assert_eq!(window.forecast.end, date(2021, 1, 1));
        assert_eq!(window.forecast_last_day(), date(2020, 12, 31));
    }

    #[test]
    fn test_reference_date_never_precedes_utc_date_east_of_utc() {
        for raw in &["2024-03-15T00:30:00Z", "2024-03-15T01:00:00Z", "2024-03-31T23:59:59Z"] {
            let instant = DateTime::<Utc>::from_str(raw).unwrap();
            for hours in 0..=14 {
                let offset = FixedOffset::east_opt(hours * 3600).unwrap();
                let local = reference_date(instant, offset);
                assert!(local >= instant.date_naive(), "{} at +{}", raw, hours);
                let window = ReportWindow::try_from(local).unwrap();
                assert!(window.forecast.start >= instant.date_naive());
            }
        }
    }

    #[test]
    fn test_reference_date_west_of_utc_is_the_previous_day() {
        let instant = DateTime::<Utc>::from_str("2024-03-15T01:00:00Z").unwrap();
        let new_york = FixedOffset::west_opt(5 * 3600).unwrap();
        assert_eq!(reference_date(instant, new_york), date(2024, 3, 14));
    }

    #[test]
    fn test_reference_date_uses_offset() {
        let instant = DateTime::<Utc>::from_str("2020-12-01T15:00:00.0+00:00").unwrap();
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let utc = FixedOffset::east_opt(0).unwrap();

        assert_eq!(reference_date(instant, tokyo), date(2020, 12, 2));
        assert_eq!(reference_date(instant, utc), date(2020, 12, 1));
    }
}
