//! Untis ICS Core Library
//!
//! Turns WebUntis timetables into stable, standards-compliant ICS calendars:
//! raw lesson records are validated and deduplicated into canonical events,
//! then encoded with the school's timezone.

pub mod cache;
pub mod config;
pub mod error;
pub mod ics;
pub mod normalize;
pub mod pipeline;
pub mod providers;
pub mod published;
pub mod sink;
pub mod timezone;
pub mod types;

// Re-export core types and error handling
pub use error::{Error, Result, ValidationError};
pub use types::*;

/// Commonly used items
pub mod prelude {
    pub use crate::{
        cache::{CacheBackend, CacheStatus, CalendarCache},
        config::{SyncConfig, TimetableTarget},
        ics::IcsEncoder,
        normalize::{NormalizeOptions, NormalizeOutcome, normalize},
        pipeline::{CalendarBuild, SyncSummary, build_calendar, run_sync},
        providers::{JsonFileSource, TimetableSource, WebUntisProvider},
        sink::{FileSink, OutputSink},
        types::*,
    };
}
