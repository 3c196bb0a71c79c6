use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Status of a lesson as reported by the timetable service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LessonStatus {
    Regular,
    Cancelled,
    Substituted,
    Moved,
    Exam,
}

impl LessonStatus {
    /// Rank used when several records describe the same lesson; higher wins.
    pub const fn precedence(self) -> u8 {
        match self {
            Self::Cancelled => 3,
            Self::Substituted | Self::Moved => 2,
            Self::Exam => 1,
            Self::Regular => 0,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Cancelled => "cancelled",
            Self::Substituted => "substituted",
            Self::Moved => "moved",
            Self::Exam => "exam",
        }
    }

    /// Collapse into the two states a calendar entry can carry.
    pub const fn event_status(self) -> EventStatus {
        match self {
            Self::Cancelled => EventStatus::Cancelled,
            _ => EventStatus::Confirmed,
        }
    }
}

impl fmt::Display for LessonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LessonStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "regular" => Ok(Self::Regular),
            "cancelled" => Ok(Self::Cancelled),
            "substituted" => Ok(Self::Substituted),
            "moved" => Ok(Self::Moved),
            "exam" => Ok(Self::Exam),
            _ => Err(ValidationError::UnknownStatus(s.to_string())),
        }
    }
}

/// `STATUS` value of an emitted calendar entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Confirmed,
    Cancelled,
}

impl EventStatus {
    pub const fn as_ics_str(self) -> &'static str {
        match self {
            Self::Confirmed => "CONFIRMED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

/// One timetable entry as reported by the timetable service.
///
/// Every field is optional at this boundary; the normalizer decides what is
/// acceptable. `status` stays textual until validation so that an unknown tag
/// rejects only its own record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLessonRecord {
    /// Identifier assigned by the source system to this lesson occurrence
    #[serde(default)]
    pub remote_id: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub rooms: Vec<String>,
    #[serde(default)]
    pub teachers: Vec<String>,
    /// Class or student-group names attending the lesson
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub start: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub end: Option<DateTime<FixedOffset>>,
    /// Absent means `regular`
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub substitution_note: Option<String>,
    #[serde(default)]
    pub info: Option<String>,
}

impl RawLessonRecord {
    pub fn new(
        remote_id: impl Into<String>,
        subject: impl Into<String>,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            remote_id: Some(remote_id.into()),
            subject: Some(subject.into()),
            start: Some(start),
            end: Some(end),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: LessonStatus) -> Self {
        self.status = Some(status.as_str().to_string());
        self
    }

    pub fn with_rooms<I, S>(mut self, rooms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rooms = rooms.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_teachers<I, S>(mut self, teachers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.teachers = teachers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_substitution_note(mut self, note: impl Into<String>) -> Self {
        self.substitution_note = Some(note.into());
        self
    }
}

/// Deduplicated, validated and timezone-resolved lesson occurrence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalEvent {
    pub uid: String,
    pub remote_id: String,
    pub summary: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub status: EventStatus,
    /// Source status the event was built from
    pub lesson_status: LessonStatus,
    pub last_modified: DateTime<Utc>,
}

/// ICS generation options
#[derive(Debug, Clone)]
pub struct IcsOptions {
    /// Calendar display name (`X-WR-CALNAME`)
    pub calendar_name: String,
    /// School timezone, used for `TZID` and `VTIMEZONE`
    pub timezone: Tz,
    /// Whether teacher/class/note lines go into `DESCRIPTION`
    pub include_description: bool,
    pub reminder_minutes: Option<u32>,
}

impl Default for IcsOptions {
    fn default() -> Self {
        Self {
            calendar_name: "WebUntis Timetable".to_string(),
            timezone: chrono_tz::Europe::Brussels,
            include_description: true,
            reminder_minutes: None,
        }
    }
}

/// Inclusive date range requested from the timetable service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FetchWindow {
    pub fn around(today: NaiveDate, past_days: u32, future_days: u32) -> Self {
        Self {
            start: today - Duration::days(i64::from(past_days)),
            end: today + Duration::days(i64::from(future_days)),
        }
    }
}
