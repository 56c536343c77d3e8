//! Civil (wall-clock) time in a fixed reference timezone.
//!
//! A [`CivilDateTime`] is a calendar/clock reading - year, month, day, hour,
//! minute - that only means something together with a [`ReferenceZone`].
//! It is deliberately a different type from `DateTime<Utc>` so that the
//! conversion between "what the operator typed" and "the machine instant"
//! happens exactly once, at the boundary, through [`CivilDateTime::from_utc`]
//! and [`CivilDateTime::to_utc`].
//!
//! # Wire format
//!
//! Timestamps received from the server are interpreted by
//! [`CivilDateTime::parse_wire`]:
//!
//! - a timestamp carrying an offset (`Z`, `+03:00`, ...) is an absolute
//!   instant and is converted into the reference zone;
//! - a naive timestamp (`2025-03-01T10:00:00`) is already a civil reading in
//!   the reference zone.

use core::fmt;
use core::ops::RangeInclusive;

use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeDelta, TimeZone,
    Timelike, Utc,
};
use serde::{Deserialize, Serialize};

/// Naive formats accepted on the wire, most specific first.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Format used by `Display`, serde and form input (`<input type="datetime-local">`).
const INPUT_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Years a civil reading may name.
const YEARS: RangeInclusive<i32> = 1..=9999;

/// Format shown to operators (`01.03.2025, 10:00`).
const DISPLAY_FORMAT: &str = "%d.%m.%Y, %H:%M";

/// Errors that can occur when building or parsing civil times.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CivilTimeError {
    /// Year/month/day/hour/minute do not form a valid calendar reading.
    #[error("invalid date or time components")]
    InvalidComponents,
    /// The input matched none of the accepted formats.
    #[error("unrecognised timestamp: {0:?}")]
    Unparseable(String),
    /// The year lies outside 1..=9999.
    #[error("year {0} is out of range")]
    YearOutOfRange(i32),
    /// A fixed offset must be strictly within one day.
    #[error("UTC offset out of range: {0} seconds")]
    OffsetOutOfRange(i32),
}

/// The single timezone in which civil times are defined.
///
/// Offsets are fixed: the business timezone (Moscow) has not observed daylight
/// saving since 2014, so a constant offset is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReferenceZone {
    name: &'static str,
    offset_seconds: i32,
}

impl ReferenceZone {
    /// Moscow time, UTC+03:00.
    pub const MOSCOW: Self = Self {
        name: "Europe/Moscow",
        offset_seconds: 3 * 3600,
    };

    /// UTC itself.
    pub const UTC: Self = Self {
        name: "UTC",
        offset_seconds: 0,
    };

    /// A custom fixed-offset zone.
    ///
    /// # Errors
    ///
    /// Returns [`CivilTimeError::OffsetOutOfRange`] unless the offset is
    /// strictly between -24h and +24h.
    pub const fn fixed(name: &'static str, offset_seconds: i32) -> Result<Self, CivilTimeError> {
        if offset_seconds <= -86_400 || offset_seconds >= 86_400 {
            return Err(CivilTimeError::OffsetOutOfRange(offset_seconds));
        }
        Ok(Self {
            name,
            offset_seconds,
        })
    }

    /// Zone name, for display.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Offset east of UTC in seconds.
    #[must_use]
    pub const fn offset_seconds(&self) -> i32 {
        self.offset_seconds
    }

    /// The offset as a chrono `FixedOffset`.
    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        // Range is validated on construction.
        FixedOffset::east_opt(self.offset_seconds).unwrap_or_else(|| Utc.fix())
    }
}

impl Default for ReferenceZone {
    fn default() -> Self {
        Self::MOSCOW
    }
}

/// A wall-clock reading at minute precision, in some [`ReferenceZone`].
///
/// Ordering compares the civil readings directly, which is only meaningful
/// between values defined in the same zone.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use resale_core::{CivilDateTime, ReferenceZone};
///
/// let civil = CivilDateTime::new(2025, 3, 1, 10, 0).unwrap();
/// let instant = civil.to_utc(ReferenceZone::MOSCOW);
/// assert_eq!(instant, Utc.with_ymd_and_hms(2025, 3, 1, 7, 0, 0).unwrap());
/// assert_eq!(CivilDateTime::from_utc(instant, ReferenceZone::MOSCOW), civil);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CivilDateTime(NaiveDateTime);

impl CivilDateTime {
    /// Build a civil time from its components.
    ///
    /// # Errors
    ///
    /// Returns [`CivilTimeError::InvalidComponents`] for impossible dates or
    /// times (e.g. February 30th, 25:00) and
    /// [`CivilTimeError::YearOutOfRange`] outside years 1..=9999.
    pub fn new(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
    ) -> Result<Self, CivilTimeError> {
        if !YEARS.contains(&year) {
            return Err(CivilTimeError::YearOutOfRange(year));
        }
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_opt(hour, minute, 0))
            .map(Self)
            .ok_or(CivilTimeError::InvalidComponents)
    }

    /// Wrap a naive reading, dropping seconds and below.
    #[must_use]
    pub fn from_naive(naive: NaiveDateTime) -> Self {
        let truncated = naive
            .with_second(0)
            .and_then(|dt| dt.with_nanosecond(0))
            .unwrap_or(naive);
        Self(truncated)
    }

    /// The civil reading of `instant` in `zone`.
    #[must_use]
    pub fn from_utc(instant: DateTime<Utc>, zone: ReferenceZone) -> Self {
        Self::from_naive(instant.with_timezone(&zone.offset()).naive_local())
    }

    /// The absolute instant this reading denotes in `zone`.
    ///
    /// Saturates at the ends of chrono's range.
    #[must_use]
    pub fn to_utc(self, zone: ReferenceZone) -> DateTime<Utc> {
        let offset = zone.offset_seconds();
        self.0
            .checked_sub_signed(TimeDelta::seconds(i64::from(offset)))
            .map_or_else(
                || {
                    if offset > 0 {
                        DateTime::<Utc>::MIN_UTC
                    } else {
                        DateTime::<Utc>::MAX_UTC
                    }
                },
                |shifted| Utc.from_utc_datetime(&shifted),
            )
    }

    /// Parse form input of the shape `YYYY-MM-DDTHH:MM` (seconds tolerated).
    ///
    /// # Errors
    ///
    /// Returns [`CivilTimeError::Unparseable`] if the input is not a naive
    /// date-time. Inputs with an offset are rejected: a form value is always
    /// a civil reading. Years outside 1..=9999 give
    /// [`CivilTimeError::YearOutOfRange`].
    pub fn parse_input(s: &str) -> Result<Self, CivilTimeError> {
        let s = s.trim();
        let naive = NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .ok_or_else(|| CivilTimeError::Unparseable(s.to_owned()))?;
        if !YEARS.contains(&naive.year()) {
            return Err(CivilTimeError::YearOutOfRange(naive.year()));
        }
        Ok(Self::from_naive(naive))
    }

    /// Parse a server timestamp into a civil reading in `zone`.
    ///
    /// # Errors
    ///
    /// Returns [`CivilTimeError::Unparseable`] if the input is neither an
    /// RFC 3339 instant nor a naive date-time.
    pub fn parse_wire(s: &str, zone: ReferenceZone) -> Result<Self, CivilTimeError> {
        let s = s.trim();
        if let Ok(instant) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self::from_utc(instant.with_timezone(&Utc), zone));
        }
        Self::parse_input(s)
    }

    /// The underlying naive reading.
    #[must_use]
    pub const fn naive(&self) -> NaiveDateTime {
        self.0
    }

    /// Operator-facing rendering, e.g. `01.03.2025, 10:00`.
    #[must_use]
    pub fn format_display(&self) -> String {
        self.0.format(DISPLAY_FORMAT).to_string()
    }
}

impl fmt::Debug for CivilDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CivilDateTime({})", self.0.format(INPUT_FORMAT))
    }
}

impl fmt::Display for CivilDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(INPUT_FORMAT))
    }
}

impl std::str::FromStr for CivilDateTime {
    type Err = CivilTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_input(s)
    }
}

impl TryFrom<String> for CivilDateTime {
    type Error = CivilTimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_input(&value)
    }
}

impl From<CivilDateTime> for String {
    fn from(value: CivilDateTime) -> Self {
        value.to_string()
    }
}
