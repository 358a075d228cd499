use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveDateTime};

/// Last calendar day of the month containing `date`.
pub fn month_end(date: NaiveDate) -> NaiveDate {
    let mut current = date;
    while let Some(next) = current.succ_opt() {
        if next.month() != current.month() {
            break;
        }
        current = next;
    }
    current
}

pub fn next_month_end(date: NaiveDate) -> NaiveDate {
    match month_end(date).succ_opt() {
        Some(first_of_next) => month_end(first_of_next),
        None => month_end(date),
    }
}

pub fn is_same_month(a: NaiveDate, b: NaiveDate) -> bool {
    a.year() == b.year() && a.month() == b.month()
}

/// Every month end from the month of `start` through the month of `end`.
pub fn get_month_ends_in_period(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let last = month_end(end);

    let mut current = month_end(start);
    while current <= last {
        dates.push(current);
        let next = next_month_end(current);
        if next == current {
            break;
        }
        current = next;
    }

    dates
}

/// The same day `months` calendar months earlier, clamped to the end of a
/// shorter month (May 31 minus 3 months is Feb 28/29).
pub fn months_before(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(months)).unwrap_or(NaiveDate::MIN)
}

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%d %b %Y"];
const DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parses the date formats upstream records are known to carry.
/// Any time component is discarded.
pub fn parse_flexible_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.date_naive());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|dt| dt.date())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_month_end() {
        assert_eq!(month_end(ymd(2023, 2, 3)), ymd(2023, 2, 28));
        assert_eq!(month_end(ymd(2024, 2, 29)), ymd(2024, 2, 29));
        assert_eq!(month_end(ymd(2023, 12, 1)), ymd(2023, 12, 31));
    }

    #[test]
    fn test_next_month_end() {
        assert_eq!(next_month_end(ymd(2023, 1, 31)), ymd(2023, 2, 28));
        assert_eq!(next_month_end(ymd(2023, 12, 31)), ymd(2024, 1, 31));
    }

    #[test]
    fn test_month_ends_span_partial_months() {
        let dates = get_month_ends_in_period(ymd(2023, 11, 15), ymd(2024, 2, 2));
        assert_eq!(
            dates,
            vec![ymd(2023, 11, 30), ymd(2023, 12, 31), ymd(2024, 1, 31), ymd(2024, 2, 29)]
        );
        assert_eq!(get_month_ends_in_period(ymd(2023, 5, 9), ymd(2023, 5, 20)).len(), 1);
    }

    #[test]
    fn test_months_before() {
        assert_eq!(months_before(ymd(2024, 5, 10), 3), ymd(2024, 2, 10));
        assert_eq!(months_before(ymd(2024, 5, 31), 3), ymd(2024, 2, 29));
        assert_eq!(months_before(ymd(2024, 2, 15), 3), ymd(2023, 11, 15));
        assert_eq!(months_before(ymd(2024, 2, 15), 0), ymd(2024, 2, 15));
    }

    #[test]
    fn test_parse_flexible_date() {
        assert_eq!(parse_flexible_date("2024-03-07"), Some(ymd(2024, 3, 7)));
        assert_eq!(parse_flexible_date("2024-03-07 14:22:01"), Some(ymd(2024, 3, 7)));
        assert_eq!(parse_flexible_date("2024-03-07T14:22:01Z"), Some(ymd(2024, 3, 7)));
        assert_eq!(parse_flexible_date("2024-03-07T14:22:01.250"), Some(ymd(2024, 3, 7)));
        assert_eq!(parse_flexible_date("03/07/2024"), Some(ymd(2024, 3, 7)));
        assert_eq!(parse_flexible_date("  "), None);
        assert_eq!(parse_flexible_date("not a date"), None);
    }
}
