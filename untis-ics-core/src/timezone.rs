//! School timezone handling.
//!
//! Lesson times are wall-clock times in the school's civil timezone, so the
//! calendar carries them with a `TZID` and a matching `VTIMEZONE`. The
//! observances of that `VTIMEZONE` are read off the tz database by probing the
//! zone's UTC offset over the years the calendar covers.

use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc,
};
use chrono_tz::{OffsetComponents, Tz};

use crate::{Error, Result};

/// Resolve an IANA timezone name such as `Europe/Brussels`.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| Error::Timezone(name.to_string()))
}

/// Attach the school timezone to a wall-clock time.
///
/// Ambiguous times (the repeated hour in autumn) resolve to the earlier
/// instant. Times that do not exist (the skipped hour in spring) yield `None`.
pub fn localize(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&naive).earliest()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservanceKind {
    Standard,
    Daylight,
}

impl ObservanceKind {
    pub const fn component_name(self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::Daylight => "DAYLIGHT",
        }
    }
}

/// One `STANDARD`/`DAYLIGHT` sub-component of a `VTIMEZONE`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observance {
    pub kind: ObservanceKind,
    /// Onset, expressed in the local time in force before it
    pub local_start: NaiveDateTime,
    pub offset_from: FixedOffset,
    pub offset_to: FixedOffset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OffsetState {
    utc: FixedOffset,
    daylight: bool,
}

impl OffsetState {
    fn at(tz: Tz, instant: DateTime<Utc>) -> Self {
        let offset = tz.offset_from_utc_datetime(&instant.naive_utc());
        Self {
            utc: offset.fix(),
            daylight: !offset.dst_offset().is_zero(),
        }
    }

    const fn kind(self) -> ObservanceKind {
        if self.daylight {
            ObservanceKind::Daylight
        } else {
            ObservanceKind::Standard
        }
    }
}

/// Observances needed to describe `tz` from local midnight on January 1st of
/// `first_year` up to the end of `last_year`.
///
/// The first entry is the rule in force at the start of the range; every
/// following entry is one real transition inside the range.
pub fn observances(tz: Tz, first_year: i32, last_year: i32) -> Vec<Observance> {
    let (Some(range_start), Some(range_end)) = (year_start(first_year), year_start(last_year + 1))
    else {
        return Vec::new();
    };

    let offset = OffsetState::at(tz, range_start).utc.local_minus_utc();
    let local_midnight = range_start - Duration::seconds(i64::from(offset));

    let mut state = OffsetState::at(tz, local_midnight);
    let mut result = vec![Observance {
        kind: state.kind(),
        local_start: range_start.naive_utc(),
        offset_from: state.utc,
        offset_to: state.utc,
    }];

    let mut cursor = local_midnight;
    while cursor < range_end {
        let next = cursor + Duration::days(1);
        let next_state = OffsetState::at(tz, next);
        if next_state != state {
            let onset = find_transition(tz, cursor, next, state);
            result.push(Observance {
                kind: next_state.kind(),
                local_start: onset.naive_utc() + state.utc,
                offset_from: state.utc,
                offset_to: next_state.utc,
            });
            state = next_state;
        }
        cursor = next;
    }

    result
}

/// First instant in `(lo, hi]` whose offset state differs from `before`.
fn find_transition(
    tz: Tz,
    lower: DateTime<Utc>,
    upper: DateTime<Utc>,
    before: OffsetState,
) -> DateTime<Utc> {
    let (mut lo, mut hi) = (lower.timestamp(), upper.timestamp());
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        let same = DateTime::from_timestamp(mid, 0)
            .is_some_and(|instant| OffsetState::at(tz, instant) == before);
        if same {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    DateTime::from_timestamp(hi, 0).unwrap_or(upper)
}

fn year_start(year: i32) -> Option<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// `+HHMM` (or `+HHMMSS`) as used by `TZOFFSETFROM`/`TZOFFSETTO`.
pub fn format_utc_offset(offset: FixedOffset) -> String {
    let total = offset.local_minus_utc();
    let sign = if total < 0 { '-' } else { '+' };
    let secs = total.unsigned_abs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if seconds == 0 {
        format!("{sign}{hours:02}{minutes:02}")
    } else {
        format!("{sign}{hours:02}{minutes:02}{seconds:02}")
    }
}
