//! Text-format timestamp parsing.
//!
//! This is specific to the Postgres default `DateStyle` setting
//! (`ISO, MDY`), the only one the driver supports. The shape on the wire is
//! `YYYY-MM-DD[ HH:MM:SS[.fff...][{+|-}HH[:MM[:SS]]][ BC]]`; years may run
//! past four digits, which is why the parser is index-based rather than a
//! format string.
use chrono::{DateTime, FixedOffset, LocalResult, NaiveDate};

use crate::error::DecodeError;

fn malformed(s: &str, what: &str) -> DecodeError {
    DecodeError::Timestamp(format!("{what} in {s:?}"))
}

fn atoi(s: &str, start: usize, end: usize) -> Result<i64, DecodeError> {
    let digits = s.get(start..end).ok_or_else(|| malformed(s, "unexpected end of input"))?;
    digits.parse().map_err(|_| DecodeError::Int(digits.into()))
}

fn expect(s: &str, pos: usize, want: u8) -> Result<(), DecodeError> {
    if s.as_bytes().get(pos) != Some(&want) {
        return Err(malformed(s, &format!("expected {:?} at position {pos}", want as char)));
    }
    Ok(())
}

/// Fractional seconds: `digits * 10^(9 - digit_count)` nanoseconds, zero
/// once the count runs past nanosecond resolution.
fn fraction(s: &str, start: usize, len: usize) -> Result<u32, DecodeError> {
    let frac = atoi(s, start, start + len)?;
    if len > 9 {
        return Ok(0);
    }
    Ok(frac as u32 * 10u32.pow(9 - len as u32))
}

/// Offset suffix `{+|-}HH[:MM[:SS]]` starting at `start`.
///
/// Returns the offset in seconds and the bytes consumed. The sign applies
/// to the hour field only, matching how the values round-trip through the
/// driver's own tests of record.
fn offset(s: &str, start: usize) -> Result<(i32, usize), DecodeError> {
    let bytes = s.as_bytes();
    let sign: i64 = match bytes[start] {
        b'-' => -1,
        _ => 1,
    };
    let hours = atoi(s, start + 1, start + 3)?;
    let mut consumed = 3;
    let mut minutes = 0;
    let mut seconds = 0;
    if bytes.get(start + 3) == Some(&b':') {
        minutes = atoi(s, start + 4, start + 6)?;
        consumed += 3;
    }
    if bytes.get(start + 6) == Some(&b':') {
        seconds = atoi(s, start + 7, start + 9)?;
        consumed += 3;
    }
    Ok(((sign * hours * 3600 + minutes * 60 + seconds) as i32, consumed))
}

fn build(
    s: &str,
    year: i32,
    month: i64,
    day: i64,
    hour: i64,
    minute: i64,
    second: i64,
    nanos: u32,
    tz_off: i32,
) -> Result<DateTime<FixedOffset>, DecodeError> {
    let date = NaiveDate::from_ymd_opt(year, month as u32, day as u32)
        .ok_or_else(|| malformed(s, "date out of range"))?;
    let time = date
        .and_hms_nano_opt(hour as u32, minute as u32, second as u32, nanos)
        .ok_or_else(|| malformed(s, "time of day out of range"))?;
    let zone = FixedOffset::east_opt(tz_off).ok_or_else(|| malformed(s, "offset out of range"))?;
    match time.and_local_timezone(zone) {
        LocalResult::Single(t) => Ok(t),
        _ => Err(malformed(s, "datetime out of range")),
    }
}

/// Parse a `timestamp`, `timestamptz` or `date` text value.
pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<FixedOffset>, DecodeError> {
    let bytes = s.as_bytes();

    let mon_sep = s.find('-').ok_or_else(|| malformed(s, "no date separator"))?;
    let year = atoi(s, 0, mon_sep)?;
    let day_sep = mon_sep + 3;
    let month = atoi(s, mon_sep + 1, day_sep)?;
    expect(s, day_sep, b'-')?;
    let time_sep = day_sep + 3;
    let day = atoi(s, day_sep + 1, time_sep)?;

    let (mut hour, mut minute, mut second) = (0, 0, 0);
    if s.len() > mon_sep + 6 {
        expect(s, time_sep, b' ')?;
        let min_sep = time_sep + 3;
        expect(s, min_sep, b':')?;
        hour = atoi(s, time_sep + 1, min_sep)?;
        let sec_sep = min_sep + 3;
        expect(s, sec_sep, b':')?;
        minute = atoi(s, min_sep + 1, sec_sep)?;
        second = atoi(s, sec_sep + 1, sec_sep + 3)?;
    }

    // Three optional but ordered sections follow: fractional seconds, the
    // time zone offset, and the BC designation.
    let mut remainder = mon_sep + "01-01 00:00:00".len() + 1;
    let mut nanos = 0;
    let mut tz_off = 0;
    let mut bc = false;

    if remainder < s.len() && bytes[remainder] == b'.' {
        let frac_start = remainder + 1;
        let tail = s.get(frac_start..).unwrap_or("");
        let frac_len = tail.find(['-', '+', ' ']).unwrap_or(tail.len());
        nanos = fraction(s, frac_start, frac_len)?;
        remainder += frac_len + 1;
    }

    if remainder < s.len() && matches!(bytes[remainder], b'-' | b'+') {
        let (off, consumed) = offset(s, remainder)?;
        tz_off = off;
        remainder += consumed;
    }

    if s.get(remainder..).is_some_and(|tail| tail.starts_with(" BC")) {
        bc = true;
        remainder += 3;
    }

    if remainder < s.len() {
        return Err(malformed(s, "expected end of input"));
    }

    let year = i32::try_from(year).map_err(|_| malformed(s, "year out of range"))?;
    let year = if bc { -year } else { year };
    build(s, year, month, day, hour, minute, second, nanos, tz_off)
}

/// Parse a `time` or `timetz` text value: `HH:MM:SS[.fff...]` with an
/// offset suffix when `with_offset` is set.
///
/// A bare time of day anchors to the zero date `0000-01-01`. Offsets with a
/// minutes field (the 30-minute zones) and a seconds field both parse.
pub(crate) fn parse_time_of_day(
    s: &str,
    with_offset: bool,
) -> Result<DateTime<FixedOffset>, DecodeError> {
    let bytes = s.as_bytes();

    expect(s, 2, b':')?;
    let hour = atoi(s, 0, 2)?;
    expect(s, 5, b':')?;
    let minute = atoi(s, 3, 5)?;
    let second = atoi(s, 6, 8)?;

    let mut idx = 8;
    let mut nanos = 0;
    if bytes.get(idx) == Some(&b'.') {
        let frac_start = idx + 1;
        let tail = s.get(frac_start..).unwrap_or("");
        let frac_len = tail.find(['-', '+']).unwrap_or(tail.len());
        nanos = fraction(s, frac_start, frac_len)?;
        idx += frac_len + 1;
    }

    let mut tz_off = 0;
    if with_offset && idx < s.len() && matches!(bytes[idx], b'-' | b'+') {
        let (off, consumed) = offset(s, idx)?;
        tz_off = off;
        idx += consumed;
    }

    if idx < s.len() {
        return Err(malformed(s, "expected end of input"));
    }

    build(s, 0, 1, 1, hour, minute, second, nanos, tz_off)
}

#[cfg(test)]
mod test {
    use super::*;

    fn ts(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
        nanos: u32,
        off: i32,
    ) -> DateTime<FixedOffset> {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_nano_opt(hour, minute, second, nanos)
            .unwrap()
            .and_local_timezone(FixedOffset::east_opt(off).unwrap())
            .unwrap()
    }

    #[test]
    fn parse_iso_mdy() {
        let cases = [
            ("22001-02-03", ts(22001, 2, 3, 0, 0, 0, 0, 0)),
            ("2001-02-03", ts(2001, 2, 3, 0, 0, 0, 0, 0)),
            ("2001-02-03 04:05:06", ts(2001, 2, 3, 4, 5, 6, 0, 0)),
            ("2001-02-03 04:05:06.000001", ts(2001, 2, 3, 4, 5, 6, 1_000, 0)),
            ("2001-02-03 04:05:06.00001", ts(2001, 2, 3, 4, 5, 6, 10_000, 0)),
            ("2001-02-03 04:05:06.0001", ts(2001, 2, 3, 4, 5, 6, 100_000, 0)),
            ("2001-02-03 04:05:06.001", ts(2001, 2, 3, 4, 5, 6, 1_000_000, 0)),
            ("2001-02-03 04:05:06.01", ts(2001, 2, 3, 4, 5, 6, 10_000_000, 0)),
            ("2001-02-03 04:05:06.1", ts(2001, 2, 3, 4, 5, 6, 100_000_000, 0)),
            ("2001-02-03 04:05:06.12", ts(2001, 2, 3, 4, 5, 6, 120_000_000, 0)),
            ("2001-02-03 04:05:06.123", ts(2001, 2, 3, 4, 5, 6, 123_000_000, 0)),
            ("2001-02-03 04:05:06.1234", ts(2001, 2, 3, 4, 5, 6, 123_400_000, 0)),
            ("2001-02-03 04:05:06.12345", ts(2001, 2, 3, 4, 5, 6, 123_450_000, 0)),
            ("2001-02-03 04:05:06.123456", ts(2001, 2, 3, 4, 5, 6, 123_456_000, 0)),
            ("2001-02-03 04:05:06.123-07", ts(2001, 2, 3, 4, 5, 6, 123_000_000, -7 * 3600)),
            ("2001-02-03 04:05:06-07", ts(2001, 2, 3, 4, 5, 6, 0, -7 * 3600)),
            ("2001-02-03 04:05:06-07:42", ts(2001, 2, 3, 4, 5, 6, 0, -7 * 3600 + 42 * 60)),
            ("2001-02-03 04:05:06-07:30:09", ts(2001, 2, 3, 4, 5, 6, 0, -7 * 3600 + 30 * 60 + 9)),
            ("2001-02-03 04:05:06+07", ts(2001, 2, 3, 4, 5, 6, 0, 7 * 3600)),
            ("10000-02-03 04:05:06", ts(10000, 2, 3, 4, 5, 6, 0, 0)),
            ("10000-02-03 04:05:06 BC", ts(-10000, 2, 3, 4, 5, 6, 0, 0)),
            ("0010-02-03 04:05:06 BC", ts(-10, 2, 3, 4, 5, 6, 0, 0)),
            ("0010-02-03 04:05:06.123 BC", ts(-10, 2, 3, 4, 5, 6, 123_000_000, 0)),
            ("0010-02-03 04:05:06.123-07 BC", ts(-10, 2, 3, 4, 5, 6, 123_000_000, -7 * 3600)),
        ];
        for (input, want) in cases {
            let got = parse_timestamp(input).unwrap();
            assert_eq!(got, want, "parsing {input:?}");
        }
    }

    #[test]
    fn bc_with_fraction_and_offset() {
        let t = parse_timestamp("2001-02-03 04:05:06.123-07 BC").unwrap();
        assert_eq!(t, ts(-2001, 2, 3, 4, 5, 6, 123_000_000, -7 * 3600));
        assert_eq!(t.offset().local_minus_utc(), -7 * 3600);
    }

    #[test]
    fn offset_is_retained() {
        let t = parse_timestamp("2001-02-03 04:05:06-07").unwrap();
        assert_eq!(t.offset().local_minus_utc(), -7 * 3600);
        let t = parse_timestamp("2001-02-03 04:05:06+05:30").unwrap();
        assert_eq!(t.offset().local_minus_utc(), 5 * 3600 + 30 * 60);
    }

    #[test]
    fn rejects_deviations() {
        for input in [
            "",
            "2001",
            "2001-02",
            "2001-02-03x",
            "2001-02-03 04",
            "2001-02-03 04:05",
            "2001-02-03T04:05:06",
            "2001-02-03 04-05-06",
            "2001-02-03 04:05:06 AD",
            "2001-02-03 04:05:06.",
            "2001-13-44 04:05:06",
        ] {
            assert!(parse_timestamp(input).is_err(), "accepted {input:?}");
        }
    }

    #[test]
    fn fraction_past_nanoseconds_is_dropped() {
        let t = parse_timestamp("2001-02-03 04:05:06.1234567891").unwrap();
        assert_eq!(t, ts(2001, 2, 3, 4, 5, 6, 0, 0));
    }

    #[test]
    fn time_of_day() {
        assert_eq!(parse_time_of_day("04:05:06", false).unwrap(), ts(0, 1, 1, 4, 5, 6, 0, 0));
        assert_eq!(
            parse_time_of_day("04:05:06.123", false).unwrap(),
            ts(0, 1, 1, 4, 5, 6, 123_000_000, 0),
        );
        assert_eq!(
            parse_time_of_day("04:05:06-07", true).unwrap(),
            ts(0, 1, 1, 4, 5, 6, 0, -7 * 3600),
        );
        // a 30-minute-offset zone
        assert_eq!(
            parse_time_of_day("04:05:06+09:30", true).unwrap(),
            ts(0, 1, 1, 4, 5, 6, 0, 9 * 3600 + 30 * 60),
        );
        assert!(parse_time_of_day("04:05:06-07", false).is_err());
        assert!(parse_time_of_day("04:05", false).is_err());
    }
}
