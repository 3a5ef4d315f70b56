//! `SystemTime` and `Duration` on the wire.
//!
//! Wire times count seconds from 0001-01-01T00:00:00Z, with a separate
//! non-negative nanosecond part.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::Native;
use crate::error::ConversionError;
use crate::vdl_struct;

/// Seconds from 0001-01-01 to 1970-01-01.
const UNIX_TO_WIRE: i64 = 62_135_596_800;
const NANOS_PER_SECOND: i32 = 1_000_000_000;
const SECONDS_PER_DAY: i64 = 86_400;

/// `time.Time` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct WireTime {
    pub seconds: i64,
    pub nanos: i32,
}

vdl_struct!(WireTime = "time.Time" { seconds: i64 as "Seconds", nanos: i32 as "Nanos" });

/// `time.Duration` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WireDuration {
    pub seconds: i64,
    pub nanos: i32,
}

vdl_struct!(WireDuration = "time.Duration" { seconds: i64 as "Seconds", nanos: i32 as "Nanos" });

fn invalid(native: &'static str, reason: impl Into<String>) -> ConversionError {
    ConversionError::Native {
        native,
        reason: reason.into(),
    }
}

fn check_nanos(native: &'static str, nanos: i32) -> Result<u32, ConversionError> {
    if (0..NANOS_PER_SECOND).contains(&nanos) {
        Ok(nanos as u32)
    } else {
        Err(invalid(native, format!("nanoseconds {nanos} out of range")))
    }
}

impl Native for SystemTime {
    type Wire = WireTime;

    fn to_wire(&self) -> WireTime {
        let (unix, nanos) = match self.duration_since(UNIX_EPOCH) {
            Ok(after) => (
                i64::try_from(after.as_secs()).unwrap_or(i64::MAX),
                after.subsec_nanos() as i32,
            ),
            Err(before) => {
                let before = before.duration();
                let secs = -i64::try_from(before.as_secs()).unwrap_or(i64::MAX);
                match before.subsec_nanos() {
                    0 => (secs, 0),
                    n => (secs - 1, NANOS_PER_SECOND - n as i32),
                }
            }
        };
        WireTime {
            seconds: unix.saturating_add(UNIX_TO_WIRE),
            nanos,
        }
    }

    fn from_wire(wire: WireTime) -> Result<Self, ConversionError> {
        const NATIVE: &str = "std::time::SystemTime";
        let nanos = check_nanos(NATIVE, wire.nanos)?;
        let unix = wire
            .seconds
            .checked_sub(UNIX_TO_WIRE)
            .ok_or_else(|| invalid(NATIVE, "seconds out of range"))?;
        let time = if unix >= 0 {
            UNIX_EPOCH.checked_add(Duration::new(unix as u64, nanos))
        } else {
            UNIX_EPOCH
                .checked_sub(Duration::from_secs(unix.unsigned_abs()))
                .and_then(|t| t.checked_add(Duration::from_nanos(nanos as u64)))
        };
        time.ok_or_else(|| invalid(NATIVE, format!("{} is not representable", format_rfc3339(&wire))))
    }
}

impl Native for Duration {
    type Wire = WireDuration;

    fn to_wire(&self) -> WireDuration {
        WireDuration {
            seconds: i64::try_from(self.as_secs()).unwrap_or(i64::MAX),
            nanos: self.subsec_nanos() as i32,
        }
    }

    fn from_wire(wire: WireDuration) -> Result<Self, ConversionError> {
        const NATIVE: &str = "std::time::Duration";
        if wire.seconds < 0 || wire.nanos < 0 {
            return Err(invalid(NATIVE, "negative duration"));
        }
        let nanos = check_nanos(NATIVE, wire.nanos)?;
        Ok(Duration::new(wire.seconds as u64, nanos))
    }
}

// =============================================================================
// RFC 3339
// =============================================================================

fn is_leap_year(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: i64, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

/// Days since 1970-01-01 for a proleptic Gregorian date.
fn date_to_days(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let m = if month <= 2 { month + 9 } else { month - 3 } as i64;
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let doy = (153 * m + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Inverse of [`date_to_days`].
fn days_to_date(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// Renders a wire time as an RFC 3339 UTC timestamp, with as many
/// fractional digits as needed.
pub fn format_rfc3339(time: &WireTime) -> String {
    let unix = time.seconds.saturating_sub(UNIX_TO_WIRE);
    let (days, secs) = (unix.div_euclid(SECONDS_PER_DAY), unix.rem_euclid(SECONDS_PER_DAY));
    let (year, month, day) = days_to_date(days);
    let mut out = format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
        year,
        month,
        day,
        secs / 3600,
        secs % 3600 / 60,
        secs % 60
    );
    if time.nanos != 0 {
        let frac = format!("{:09}", time.nanos);
        out.push('.');
        out.push_str(frac.trim_end_matches('0'));
    }
    out.push('Z');
    out
}

/// Parses an RFC 3339 timestamp (`T` or space separator, optional
/// fraction, `Z` or `±HH:MM` offset) into a wire time.
pub fn parse_rfc3339(text: &str) -> Result<WireTime, ConversionError> {
    const NATIVE: &str = "time.Time";
    let bad = |what: &str| invalid(NATIVE, format!("invalid {what} in {text:?}"));
    let bytes = text.as_bytes();
    if bytes.len() < 20 || !text.is_ascii() {
        return Err(bad("timestamp"));
    }
    let sep_ok = bytes[4] == b'-'
        && bytes[7] == b'-'
        && matches!(bytes[10], b'T' | b't' | b' ')
        && bytes[13] == b':'
        && bytes[16] == b':';
    if !sep_ok {
        return Err(bad("timestamp"));
    }
    let number = |range: std::ops::Range<usize>, what: &str| -> Result<u32, ConversionError> {
        let digits = &text[range];
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad(what));
        }
        digits.parse().map_err(|_| bad(what))
    };
    let year = number(0..4, "year")? as i64;
    let month = number(5..7, "month")?;
    let day = number(8..10, "day")?;
    let hour = number(11..13, "hour")?;
    let minute = number(14..16, "minute")?;
    let second = number(17..19, "second")?;
    if !(1..=12).contains(&month) {
        return Err(bad("month"));
    }
    if day == 0 || day > days_in_month(year, month) {
        return Err(bad("day"));
    }
    if hour > 23 || minute > 59 || second > 59 {
        return Err(bad("time of day"));
    }

    let mut rest = &text[19..];
    let mut nanos = 0i32;
    if let Some(frac) = rest.strip_prefix('.') {
        let digits = frac.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return Err(bad("fraction"));
        }
        let mut scaled = String::from(&frac[..digits.min(9)]);
        while scaled.len() < 9 {
            scaled.push('0');
        }
        nanos = scaled.parse().map_err(|_| bad("fraction"))?;
        rest = &frac[digits..];
    }

    let offset = match rest {
        "Z" | "z" => 0,
        _ if rest.len() == 6 && rest.as_bytes()[3] == b':' => {
            let sign = match rest.as_bytes()[0] {
                b'+' => 1,
                b'-' => -1,
                _ => return Err(bad("offset")),
            };
            let digits_ok = rest[1..3].bytes().chain(rest[4..6].bytes()).all(|b| b.is_ascii_digit());
            let hours: i64 = rest[1..3].parse().map_err(|_| bad("offset"))?;
            let minutes: i64 = rest[4..6].parse().map_err(|_| bad("offset"))?;
            if !digits_ok || hours > 23 || minutes > 59 {
                return Err(bad("offset"));
            }
            sign * (hours * 3600 + minutes * 60)
        }
        _ => return Err(bad("offset")),
    };

    let unix = date_to_days(year, month, day) * SECONDS_PER_DAY
        + i64::from(hour) * 3600
        + i64::from(minute) * 60
        + i64::from(second)
        - offset;
    Ok(WireTime {
        seconds: unix + UNIX_TO_WIRE,
        nanos,
    })
}
