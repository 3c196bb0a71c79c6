pub mod base;
pub mod file;
pub mod webuntis;

use async_trait::async_trait;

use crate::{RawLessonRecord, Result};

pub use base::*;
pub use file::JsonFileSource;
pub use webuntis::WebUntisProvider;

/// Source of raw lesson records
#[async_trait]
pub trait TimetableSource: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Fetch every lesson in the source's configured window.
    ///
    /// Any failure aborts the whole fetch so that a partial timetable is
    /// never published.
    async fn fetch_records(&self) -> Result<Vec<RawLessonRecord>>;

    /// Check that the source is reachable and the credentials work.
    async fn validate(&self) -> Result<()> {
        Ok(())
    }
}
