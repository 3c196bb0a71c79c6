//! Sync configuration.
//!
//! Settings come from `WEBUNTIS_*` environment variables when the four
//! credentials are all present, otherwise from a JSON file.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::{Error, FetchWindow, IcsOptions, Result, timezone};

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const DEFAULT_TIMEZONE: &str = "Europe/Brussels";
pub const DEFAULT_CALENDAR_NAME: &str = "WebUntis Timetable";
pub const DEFAULT_OUTPUT: &str = "docs/calendar.ics";
pub const DEFAULT_PAST_DAYS: u32 = 90;
pub const DEFAULT_FUTURE_DAYS: u32 = 180;

const ENV_PREFIX: &str = "WEBUNTIS_";

/// Whose timetable to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimetableTarget {
    Class(i64),
    /// First class whose name contains the pattern, case-insensitively
    ClassNamed(String),
    Student(i64),
    /// The logged-in student, falling back to the first listed class
    Auto,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Host name such as `mese.webuntis.com`
    pub server: String,
    pub school: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub class_id: Option<i64>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub student_id: Option<i64>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_calendar_name")]
    pub calendar_name: String,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default = "default_past_days")]
    pub past_days: u32,
    #[serde(default = "default_future_days")]
    pub future_days: u32,
    #[serde(default)]
    pub reminder_minutes: Option<u32>,
    #[serde(default = "default_true")]
    pub include_description: bool,
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

fn default_calendar_name() -> String {
    DEFAULT_CALENDAR_NAME.to_string()
}

fn default_output() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT)
}

fn default_past_days() -> u32 {
    DEFAULT_PAST_DAYS
}

fn default_future_days() -> u32 {
    DEFAULT_FUTURE_DAYS
}

fn default_true() -> bool {
    true
}

impl SyncConfig {
    pub fn new(
        server: impl Into<String>,
        school: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            school: school.into(),
            username: username.into(),
            password: password.into(),
            class_id: None,
            class_name: None,
            student_id: None,
            timezone: default_timezone(),
            calendar_name: default_calendar_name(),
            output: default_output(),
            past_days: DEFAULT_PAST_DAYS,
            future_days: DEFAULT_FUTURE_DAYS,
            reminder_minutes: None,
            include_description: true,
        }
    }

    /// Load settings, preferring an explicit file, then the environment,
    /// then `config.json` in the working directory.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        if let Some(config) = Self::from_env()? {
            tracing::debug!("Using configuration from environment");
            return Ok(config);
        }
        Self::from_file(Path::new(DEFAULT_CONFIG_FILE))
    }

    pub fn from_env() -> Result<Option<Self>> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from `WEBUNTIS_*` variables. `None` unless server, school,
    /// username and password are all set.
    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}")).filter(|value| !value.trim().is_empty())
        };

        let (Some(server), Some(school), Some(username), Some(password)) = (
            var("SERVER"),
            var("SCHOOL"),
            var("USERNAME"),
            var("PASSWORD"),
        ) else {
            return Ok(None);
        };

        let mut config = Self::new(server, school, username, password);
        config.class_id = parse_var("CLASS_ID", var("CLASS_ID"))?;
        config.student_id = parse_var("STUDENT_ID", var("STUDENT_ID"))?;
        config.class_name = var("CLASS_NAME");
        if let Some(tz) = var("TIMEZONE") {
            config.timezone = tz;
        }
        if let Some(name) = var("CALENDAR_NAME") {
            config.calendar_name = name;
        }
        if let Some(output) = var("OUTPUT") {
            config.output = PathBuf::from(output);
        }
        if let Some(days) = parse_var("PAST_DAYS", var("PAST_DAYS"))? {
            config.past_days = days;
        }
        if let Some(days) = parse_var("FUTURE_DAYS", var("FUTURE_DAYS"))? {
            config.future_days = days;
        }
        config.reminder_minutes = parse_var("REMINDER_MINUTES", var("REMINDER_MINUTES"))?;

        config.validate()?;
        Ok(Some(config))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("server", &self.server),
            ("school", &self.school),
            ("username", &self.username),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{field} must not be empty")));
            }
        }
        self.tz()?;
        Ok(())
    }

    pub fn target(&self) -> TimetableTarget {
        if let Some(id) = self.class_id {
            TimetableTarget::Class(id)
        } else if let Some(id) = self.student_id {
            TimetableTarget::Student(id)
        } else if let Some(ref pattern) = self.class_name {
            TimetableTarget::ClassNamed(pattern.clone())
        } else {
            TimetableTarget::Auto
        }
    }

    pub fn tz(&self) -> Result<Tz> {
        timezone::parse_timezone(&self.timezone)
    }

    pub fn ics_options(&self) -> Result<IcsOptions> {
        Ok(IcsOptions {
            calendar_name: self.calendar_name.clone(),
            timezone: self.tz()?,
            include_description: self.include_description,
            reminder_minutes: self.reminder_minutes,
        })
    }

    pub fn fetch_window(&self, today: NaiveDate) -> FetchWindow {
        FetchWindow::around(today, self.past_days, self.future_days)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: Option<String>) -> Result<Option<T>> {
    value
        .map(|v| {
            v.trim()
                .parse()
                .map_err(|_| Error::Config(format!("{ENV_PREFIX}{name} is not a valid number: {v}")))
        })
        .transpose()
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("server", &self.server)
            .field("school", &self.school)
            .field("username", &self.username)
            .field("password", &"***")
            .field("target", &self.target())
            .field("timezone", &self.timezone)
            .field("calendar_name", &self.calendar_name)
            .field("output", &self.output)
            .field("past_days", &self.past_days)
            .field("future_days", &self.future_days)
            .field("reminder_minutes", &self.reminder_minutes)
            .finish()
    }
}
