//! FILETIME and SYSTEMTIME conversion.
//!
//! EVTX timestamps are FILETIME values: 100-nanosecond ticks since
//! 1601-01-01 UTC. The canonical text rendering is ISO-8601 with
//! millisecond precision and a trailing `Z`.

use jiff::Timestamp;
use jiff::tz::Offset;

/// Seconds between 1601-01-01 and 1970-01-01.
const EPOCH_DIFFERENCE_SECONDS: i64 = 11_644_473_600;

/// Convert a FILETIME tick count to a UTC timestamp.
///
/// Returns `None` for values outside the representable range.
pub fn timestamp_from_filetime(ticks: u64) -> Option<Timestamp> {
    let micros_since_1601 = (ticks / 10) as i64;
    let unix_micros = micros_since_1601.checked_sub(EPOCH_DIFFERENCE_SECONDS * 1_000_000)?;
    Timestamp::from_microsecond(unix_micros).ok()
}

/// `YYYY-MM-DDThh:mm:ss.mmmZ`
pub fn render_timestamp_millis(ts: Timestamp) -> String {
    let dt = Offset::UTC.to_datetime(ts);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        dt.year(),
        dt.month(),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second(),
        dt.subsec_nanosecond() / 1_000_000
    )
}

/// Render a FILETIME as ISO-8601 with millisecond precision.
///
/// Out-of-range tick counts render the raw tick value so that bogus
/// timestamps remain visible instead of failing the record.
pub fn render_filetime(ticks: u64) -> String {
    match timestamp_from_filetime(ticks) {
        Some(ts) => render_timestamp_millis(ts),
        None => ticks.to_string(),
    }
}

/// Render the eight u16 fields of a SYSTEMTIME as ISO-8601 with
/// milliseconds.
///
/// Field order is year, month, day-of-week, day, hour, minute, second,
/// millisecond; day-of-week is derivable and ignored. Fields are not
/// range-validated, out-of-range input renders as stored.
pub fn render_systemtime(fields: [u16; 8]) -> String {
    let [year, month, _day_of_week, day, hour, minute, second, millis] = fields;
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        year, month, day, hour, minute, second, millis
    )
}
