//! Civil-calendar date math.
//!
//! All arithmetic runs on calendar days via `NaiveDate`, never on elapsed
//! seconds, so leap years, month lengths, and DST transitions cannot shift
//! a schedule by a day.

use chrono::{DateTime, Days, NaiveTime, Utc};

/// Midnight at the start of the instant's calendar day.
pub fn start_of_day(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// The scheduled date for a dose: `start_of_day(dob) + weeks * 7` days.
///
/// Pure and total; on (absurd) calendar overflow the birth day itself is
/// returned rather than panicking.
pub fn scheduled_date(dob: DateTime<Utc>, weeks: u32) -> DateTime<Utc> {
    let birth_day = dob.date_naive();
    let day = birth_day
        .checked_add_days(Days::new(u64::from(weeks) * 7))
        .unwrap_or(birth_day);
    day.and_time(NaiveTime::MIN).and_utc()
}

/// Signed calendar-day distance from `now` to `target`.
pub fn days_until(target: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    target
        .date_naive()
        .signed_duration_since(now.date_naive())
        .num_days()
}

/// Human label for a date relative to `now`: "Today", "In N days",
/// "N days ago".
pub fn relative_days(target: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let days = days_until(target, now);
    if days == 0 {
        "Today".to_string()
    } else if days > 0 {
        format!("In {days} days")
    } else {
        format!("{} days ago", -days)
    }
}

/// Milestone label for an age offset: "Birth" or "N Weeks".
pub fn milestone_label(weeks: u32) -> String {
    if weeks == 0 {
        "Birth".to_string()
    } else {
        format!("{weeks} Weeks")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_week_offsets_are_exact_day_counts() {
        let dob = at("2023-01-01T00:00:00Z");
        assert_eq!(scheduled_date(dob, 0), start_of_day(dob));
        assert_eq!(days_until(scheduled_date(dob, 6), dob), 42);
        assert_eq!(days_until(scheduled_date(dob, 10), dob), 70);
        assert_eq!(scheduled_date(dob, 6), at("2023-02-12T00:00:00Z"));
    }

    #[test]
    fn test_start_of_day_strips_time() {
        let dob = at("2023-01-01T17:45:12Z");
        assert_eq!(start_of_day(dob), at("2023-01-01T00:00:00Z"));
        assert_eq!(scheduled_date(dob, 0), at("2023-01-01T00:00:00Z"));
    }

    #[test]
    fn test_leap_boundary() {
        let dob = at("2024-02-28T00:00:00Z");
        let week_later = scheduled_date(dob, 1);
        assert!(week_later > dob);
        assert_eq!(week_later, at("2024-03-06T00:00:00Z"));
    }

    #[test]
    fn test_relative_days_labels() {
        let now = at("2024-03-10T08:00:00Z");
        assert_eq!(relative_days(at("2024-03-10T23:59:00Z"), now), "Today");
        assert_eq!(relative_days(at("2024-03-15T00:00:00Z"), now), "In 5 days");
        assert_eq!(relative_days(at("2024-03-07T00:00:00Z"), now), "3 days ago");
    }

    #[test]
    fn test_milestone_labels() {
        assert_eq!(milestone_label(0), "Birth");
        assert_eq!(milestone_label(6), "6 Weeks");
    }

    proptest! {
        // The offset must always come out as exactly 7*weeks calendar days,
        // over a couple of centuries of possible birth dates.
        #[test]
        fn prop_scheduled_date_is_exact(epoch_days in -20_000i64..40_000, weeks in 0u32..1100) {
            let dob = at("1970-01-01T00:00:00Z") + chrono::Duration::days(epoch_days);
            let scheduled = scheduled_date(dob, weeks);
            prop_assert_eq!(days_until(scheduled, dob), i64::from(weeks) * 7);
            prop_assert_eq!(scheduled, start_of_day(scheduled));
        }
    }
}
