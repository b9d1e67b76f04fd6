use time::macros::offset;
use time::{Month, OffsetDateTime, UtcOffset};

/// US Eastern offset at `at`, with daylight time approximated as
/// March 8 through November 7 rather than the exact Sunday rules.
pub fn eastern_offset(at: OffsetDateTime) -> UtcOffset {
    let utc = at.to_offset(UtcOffset::UTC);
    let day = utc.day();
    let daylight = match utc.month() {
        Month::April | Month::May | Month::June | Month::July | Month::August | Month::September
        | Month::October => true,
        Month::March => day >= 8,
        Month::November => day <= 7,
        _ => false,
    };
    if daylight {
        offset!(-4)
    } else {
        offset!(-5)
    }
}

/// Whether `at` falls within `[start, end)` Eastern hours.
pub fn within_active_hours(at: OffsetDateTime, (start, end): (u8, u8)) -> bool {
    let hour = at.to_offset(eastern_offset(at)).hour();
    (start..end).contains(&hour)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const WINDOW: (u8, u8) = (6, 18);

    #[test]
    fn summer_window_uses_daylight_offset() {
        // 10:00 UTC is 06:00 EDT.
        assert!(within_active_hours(datetime!(2025-09-14 10:00 UTC), WINDOW));
        assert!(!within_active_hours(datetime!(2025-09-14 09:59 UTC), WINDOW));
        // 22:00 UTC is 18:00 EDT, the exclusive end.
        assert!(!within_active_hours(datetime!(2025-09-14 22:00 UTC), WINDOW));
        assert!(within_active_hours(datetime!(2025-09-14 21:59 UTC), WINDOW));
    }

    #[test]
    fn winter_window_uses_standard_offset() {
        assert!(!within_active_hours(datetime!(2025-12-07 10:30 UTC), WINDOW));
        assert!(within_active_hours(datetime!(2025-12-07 11:00 UTC), WINDOW));
        assert!(within_active_hours(datetime!(2025-12-07 22:30 UTC), WINDOW));
    }

    #[test]
    fn daylight_boundaries_are_approximate() {
        assert_eq!(eastern_offset(datetime!(2025-03-07 12:00 UTC)), offset!(-5));
        assert_eq!(eastern_offset(datetime!(2025-03-08 12:00 UTC)), offset!(-4));
        assert_eq!(eastern_offset(datetime!(2025-11-07 12:00 UTC)), offset!(-4));
        assert_eq!(eastern_offset(datetime!(2025-11-08 12:00 UTC)), offset!(-5));
    }
}
