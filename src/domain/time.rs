use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

/// Injectable clock. Production code uses [`now`]; tests pin instants.
pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
const SPACED_OFFSET_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%:z";

/// An instant as it arrives from storage or input, before normalisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawInstant {
    Naive(NaiveDateTime),
    Aware(DateTime<FixedOffset>),
}

impl From<NaiveDateTime> for RawInstant {
    fn from(value: NaiveDateTime) -> Self {
        Self::Naive(value)
    }
}

impl From<DateTime<FixedOffset>> for RawInstant {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Self::Aware(value)
    }
}

impl From<DateTime<Utc>> for RawInstant {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Aware(value.fixed_offset())
    }
}

impl From<DateTime<Tz>> for RawInstant {
    fn from(value: DateTime<Tz>) -> Self {
        Self::Aware(value.fixed_offset())
    }
}

/// Coerce any instant to UTC. Values without offset information are legacy
/// rows written as UTC, so they are tagged rather than shifted.
pub fn normalize(instant: impl Into<RawInstant>) -> DateTime<Utc> {
    match instant.into() {
        RawInstant::Naive(naive) => Utc.from_utc_datetime(&naive),
        RawInstant::Aware(aware) => aware.with_timezone(&Utc),
    }
}

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Whole seconds from `start` to `end`, clamped at zero.
///
/// A negative span means the wall clock moved backwards between the two
/// readings. It is logged and contributes nothing.
pub fn elapsed_seconds(start: impl Into<RawInstant>, end: impl Into<RawInstant>) -> i64 {
    let start = normalize(start);
    let end = normalize(end);
    let seconds = (end - start).num_seconds();
    if seconds < 0 {
        tracing::warn!(
            target: "clock_skew",
            start = %start.to_rfc3339(),
            end = %end.to_rfc3339(),
            skew_seconds = -seconds,
            "negative elapsed interval clamped to zero"
        );
        return 0;
    }
    seconds
}

/// Parse a stored instant. Accepts RFC 3339 and the naive forms SQLite and
/// older builds wrote, which are UTC.
pub fn parse_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    let trimmed = raw.trim();
    if let Ok(aware) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(normalize(aware));
    }
    if let Ok(aware) = DateTime::parse_from_str(trimmed, SPACED_OFFSET_FORMAT) {
        return Ok(normalize(aware));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(normalize(naive));
        }
    }
    Err(format!("unrecognised instant '{raw}'"))
}

/// `HH:MM:SS`, hours unbounded.
pub fn format_duration(seconds: i64) -> String {
    let total = seconds.max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}

pub fn to_display(instant: DateTime<Utc>, timezone: Tz) -> DateTime<Tz> {
    instant.with_timezone(&timezone)
}
