use chrono::{DateTime, NaiveDate, TimeZone};

const RECORD_NAME_FORMAT: &str = "%Y-%m-%d";

/// This is the standard way of converting a date to a string in daytally.
pub fn date_to_record_name(date: NaiveDate) -> String {
    date.format(RECORD_NAME_FORMAT).to_string()
}

pub fn record_name_to_date(name: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(name.trim(), RECORD_NAME_FORMAT).ok()
}

/// Returns start of the next day in the timezone of `date`.
///
/// Some timezones move their clocks at midnight, so 00:00 might not exist on the next day. In
/// that case the first existing full hour of the day is used. `None` is only returned at the
/// end of representable time.
pub fn next_day_start<Tz: TimeZone>(date: DateTime<Tz>) -> Option<DateTime<Tz>> {
    let timezone = date.timezone();
    let next_day = date.date_naive().succ_opt()?;
    (0..24).find_map(|hour| {
        timezone
            .from_local_datetime(&next_day.and_hms_opt(hour, 0, 0)?)
            .earliest()
    })
}
