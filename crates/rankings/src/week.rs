use time::Date;

pub const FIRST_WEEK: u8 = 1;
pub const LAST_WEEK: u8 = 18;

/// Regular-season week for `today`, counting 7-day blocks from `season_start`.
/// An explicit override wins. Both are clamped to weeks 1 through 18.
pub fn week_number(season_start: Date, today: Date, override_week: Option<u8>) -> u8 {
    if let Some(week) = override_week {
        return week.clamp(FIRST_WEEK, LAST_WEEK);
    }
    let days = (today - season_start).whole_days();
    let week = days.div_euclid(7) + 1;
    week.clamp(FIRST_WEEK as i64, LAST_WEEK as i64) as u8
}
