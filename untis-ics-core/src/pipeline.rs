//! Fetch, normalize, encode and publish.

use chrono::{DateTime, SubsecRound, Utc};

use crate::{
    IcsOptions, RawLessonRecord, Result,
    ics::IcsEncoder,
    normalize::{NormalizeOptions, NormalizeOutcome, normalize},
    providers::TimetableSource,
    published::PublishedCalendar,
    sink::OutputSink,
};

/// Result of turning one batch of records into calendar bytes
#[derive(Debug, Clone)]
pub struct CalendarBuild {
    pub bytes: Vec<u8>,
    pub outcome: NormalizeOutcome,
    /// Events whose content matched the previous calendar
    pub unchanged: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    pub events: usize,
    pub rejected: usize,
    pub duplicates: usize,
    pub unchanged: usize,
    /// False when the new calendar was byte-identical to the published one
    pub published: bool,
    pub destination: String,
}

/// Build calendar bytes from raw records.
///
/// When `previous` holds an earlier calendar, events that did not change
/// keep its `LAST-MODIFIED`, so an unchanged timetable encodes to the same
/// bytes on every run.
pub fn build_calendar(
    records: &[RawLessonRecord],
    options: &IcsOptions,
    generated_at: DateTime<Utc>,
    previous: Option<&[u8]>,
) -> Result<CalendarBuild> {
    let mut outcome = normalize(
        records,
        &NormalizeOptions {
            timezone: options.timezone,
            generated_at,
        },
    );
    let encoder = IcsEncoder::new(options.clone());

    let mut unchanged = 0;
    if let Some(previous) = previous {
        match PublishedCalendar::parse(previous) {
            Ok(previous) if !previous.is_empty() => {
                let draft = PublishedCalendar::parse(&encoder.encode(&outcome.events)?)?;
                unchanged = previous.carry_forward(&draft, &mut outcome.events);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Ignoring unreadable previous calendar: {}", e),
        }
    }

    let bytes = encoder.encode(&outcome.events)?;
    Ok(CalendarBuild {
        bytes,
        outcome,
        unchanged,
    })
}

/// One full sync stamped with the current time.
pub async fn run_sync<S, O>(source: &S, sink: &O, options: &IcsOptions) -> Result<SyncSummary>
where
    S: TimetableSource + ?Sized,
    O: OutputSink + ?Sized,
{
    run_sync_at(source, sink, options, Utc::now().trunc_subsecs(0)).await
}

/// One full sync. A failed fetch leaves the published calendar untouched.
pub async fn run_sync_at<S, O>(
    source: &S,
    sink: &O,
    options: &IcsOptions,
    generated_at: DateTime<Utc>,
) -> Result<SyncSummary>
where
    S: TimetableSource + ?Sized,
    O: OutputSink + ?Sized,
{
    let records = source.fetch_records().await?;
    tracing::info!("Fetched {} records from {}", records.len(), source.name());

    let previous = sink.read_current()?;
    let build = build_calendar(&records, options, generated_at, previous.as_deref())?;

    let published = if previous.as_deref() == Some(build.bytes.as_slice()) {
        tracing::info!("Calendar unchanged, not publishing");
        false
    } else {
        sink.publish(&build.bytes)?;
        tracing::info!(
            "Published {} events to {}",
            build.outcome.events.len(),
            sink.describe()
        );
        true
    };

    Ok(SyncSummary {
        events: build.outcome.events.len(),
        rejected: build.outcome.rejected.len(),
        duplicates: build.outcome.duplicates.len(),
        unchanged: build.unchanged,
        published,
        destination: sink.describe(),
    })
}
