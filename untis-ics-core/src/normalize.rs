//! Raw lesson records to canonical calendar events.
//!
//! [`normalize`] validates every record, collapses records describing the same
//! lesson occurrence, resolves display text and moves all instants into the
//! school timezone. It is a pure function of its inputs: the run timestamp is
//! passed in through [`NormalizeOptions`].

use std::collections::{BTreeMap, btree_map::Entry};

use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use crate::{
    CanonicalEvent, LessonStatus, RawLessonRecord,
    error::ValidationError,
};

/// Namespace for content-derived event uids
pub const UID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_93b7_5d08_a1e4_7c3f_52d9_0b16);

/// Right-hand side of every generated uid
pub const UID_DOMAIN: &str = "untis-ics";

const FALLBACK_SUBJECT: &str = "Lesson";

#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    pub timezone: Tz,
    /// Stamped into `last_modified` of every produced event
    pub generated_at: DateTime<Utc>,
}

/// A record dropped by validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRejection {
    /// Position of the record in the input batch
    pub index: usize,
    pub remote_id: Option<String>,
    pub error: ValidationError,
}

/// Two records resolved to the same lesson occurrence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateConflict {
    pub remote_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub kept_index: usize,
    pub kept_status: LessonStatus,
    pub dropped_index: usize,
    pub dropped_status: LessonStatus,
}

#[derive(Debug, Clone, Default)]
pub struct NormalizeOutcome {
    /// Sorted by start, then end, then uid
    pub events: Vec<CanonicalEvent>,
    pub rejected: Vec<RecordRejection>,
    pub duplicates: Vec<DuplicateConflict>,
}

struct ValidRecord<'a> {
    index: usize,
    record: &'a RawLessonRecord,
    remote_id: &'a str,
    status: LessonStatus,
}

type OccurrenceKey<'a> = (&'a str, DateTime<Utc>, DateTime<Utc>);

/// Normalize one fetched batch of raw records.
pub fn normalize(records: &[RawLessonRecord], options: &NormalizeOptions) -> NormalizeOutcome {
    let mut outcome = NormalizeOutcome::default();
    let mut occurrences: BTreeMap<OccurrenceKey<'_>, ValidRecord<'_>> = BTreeMap::new();

    for (index, record) in records.iter().enumerate() {
        let (key, valid) = match validate(index, record) {
            Ok(v) => v,
            Err(error) => {
                tracing::warn!(
                    index,
                    remote_id = record.remote_id.as_deref().unwrap_or(""),
                    "Skipping lesson record: {}",
                    error
                );
                outcome.rejected.push(RecordRejection {
                    index,
                    remote_id: record.remote_id.clone(),
                    error,
                });
                continue;
            }
        };

        match occurrences.entry(key) {
            Entry::Vacant(v) => {
                v.insert(valid);
            }
            Entry::Occupied(mut o) => {
                let (remote_id, start, end) = *o.key();
                let existing = o.get();
                // Ties go to the later record.
                let replace = valid.status.precedence() >= existing.status.precedence();
                let (kept, dropped) = if replace {
                    (&valid, existing)
                } else {
                    (existing, &valid)
                };
                let conflict = DuplicateConflict {
                    remote_id: remote_id.to_string(),
                    start,
                    end,
                    kept_index: kept.index,
                    kept_status: kept.status,
                    dropped_index: dropped.index,
                    dropped_status: dropped.status,
                };
                tracing::debug!(
                    remote_id,
                    kept = conflict.kept_index,
                    dropped = conflict.dropped_index,
                    "Collapsed duplicate lesson record ({} over {})",
                    conflict.kept_status,
                    conflict.dropped_status
                );
                outcome.duplicates.push(conflict);
                if replace {
                    o.insert(valid);
                }
            }
        }
    }

    outcome.events = occurrences
        .into_iter()
        .map(|((remote_id, start, end), valid)| build_event(remote_id, start, end, &valid, options))
        .collect();
    outcome
        .events
        .sort_by(|a, b| (a.start, a.end, &a.uid).cmp(&(b.start, b.end, &b.uid)));

    tracing::debug!(
        events = outcome.events.len(),
        rejected = outcome.rejected.len(),
        duplicates = outcome.duplicates.len(),
        "Normalized lesson batch"
    );

    outcome
}

fn validate(
    index: usize,
    record: &RawLessonRecord,
) -> Result<(OccurrenceKey<'_>, ValidRecord<'_>), ValidationError> {
    let remote_id = record
        .remote_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(ValidationError::MissingRemoteId)?;
    let start = record.start.ok_or(ValidationError::MissingStart)?;
    let end = record.end.ok_or(ValidationError::MissingEnd)?;
    if end <= start {
        return Err(ValidationError::NonPositiveDuration { start, end });
    }

    let status = match record.status.as_deref().map(str::trim) {
        None | Some("") => LessonStatus::Regular,
        Some(tag) => tag.parse()?,
    };

    let key = (remote_id, start.with_timezone(&Utc), end.with_timezone(&Utc));
    Ok((
        key,
        ValidRecord {
            index,
            record,
            remote_id,
            status,
        },
    ))
}

fn build_event(
    remote_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    valid: &ValidRecord<'_>,
    options: &NormalizeOptions,
) -> CanonicalEvent {
    let record = valid.record;
    CanonicalEvent {
        uid: event_uid(remote_id, start, end),
        remote_id: valid.remote_id.to_string(),
        summary: compose_summary(record, valid.status),
        location: compose_location(record),
        description: compose_description(record),
        start: start.with_timezone(&options.timezone),
        end: end.with_timezone(&options.timezone),
        status: valid.status.event_status(),
        lesson_status: valid.status,
        last_modified: options.generated_at,
    }
}

/// Stable uid for one lesson occurrence.
///
/// Depends only on the remote identifier and the time window, so a status
/// change updates the same calendar entry.
pub fn event_uid(remote_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    let name = format!(
        "{}|{}|{}",
        remote_id,
        start.to_rfc3339_opts(SecondsFormat::Secs, true),
        end.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    let id = Uuid::new_v5(&UID_NAMESPACE, name.as_bytes());
    format!("{id}@{UID_DOMAIN}")
}

fn compose_summary(record: &RawLessonRecord, status: LessonStatus) -> String {
    let subject = non_blank(record.subject.as_deref()).unwrap_or(FALLBACK_SUBJECT);
    let note = non_blank(record.substitution_note.as_deref());
    let rooms = cleaned(&record.rooms);

    let annotation = match status {
        LessonStatus::Regular => return subject.to_string(),
        LessonStatus::Cancelled => "cancelled".to_string(),
        LessonStatus::Exam => "exam".to_string(),
        LessonStatus::Substituted => match note {
            Some(note) => format!("substitution: {note}"),
            None => "substituted".to_string(),
        },
        LessonStatus::Moved => match (rooms.is_empty(), note) {
            (false, _) => format!("room changed → {}", rooms.join(", ")),
            (true, Some(note)) => format!("moved: {note}"),
            (true, None) => "moved".to_string(),
        },
    };

    format!("{subject} [{annotation}]")
}

fn compose_location(record: &RawLessonRecord) -> Option<String> {
    let rooms = cleaned(&record.rooms);
    (!rooms.is_empty()).then(|| rooms.join(", "))
}

fn compose_description(record: &RawLessonRecord) -> Option<String> {
    let mut parts = Vec::new();

    let teachers = cleaned(&record.teachers);
    if !teachers.is_empty() {
        parts.push(teachers.join(" / "));
    }
    let classes = cleaned(&record.classes);
    if !classes.is_empty() {
        parts.push(classes.join(" / "));
    }
    if let Some(info) = non_blank(record.info.as_deref()) {
        parts.push(info.to_string());
    }
    if let Some(note) = non_blank(record.substitution_note.as_deref()) {
        parts.push(note.to_string());
    }

    (!parts.is_empty()).then(|| parts.join("\n"))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn cleaned(values: &[String]) -> Vec<&str> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventStatus;
    use chrono::{FixedOffset, TimeZone, Timelike};

    fn at(rfc3339: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap()
    }

    fn options() -> NormalizeOptions {
        NormalizeOptions {
            timezone: chrono_tz::Europe::Brussels,
            generated_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    fn math(id: &str) -> RawLessonRecord {
        RawLessonRecord::new(
            id,
            "Math",
            at("2025-03-31T09:00:00+02:00"),
            at("2025-03-31T09:50:00+02:00"),
        )
    }

    #[test]
    fn later_cancellation_wins_over_regular() {
        let records = vec![
            math("L1").with_status(LessonStatus::Regular),
            math("L1").with_status(LessonStatus::Cancelled),
        ];

        let outcome = normalize(&records, &options());

        assert_eq!(outcome.events.len(), 1);
        let event = &outcome.events[0];
        assert_eq!(event.status, EventStatus::Cancelled);
        assert_eq!(event.summary, "Math [cancelled]");
        assert_eq!(outcome.duplicates.len(), 1);
        assert_eq!(outcome.duplicates[0].kept_index, 1);
        assert_eq!(outcome.duplicates[0].dropped_status, LessonStatus::Regular);
    }

    #[test]
    fn cancellation_wins_regardless_of_order() {
        let records = vec![
            math("L1").with_status(LessonStatus::Cancelled),
            math("L1").with_status(LessonStatus::Regular),
        ];

        let outcome = normalize(&records, &options());

        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].status, EventStatus::Cancelled);
        assert_eq!(outcome.duplicates[0].kept_index, 0);
    }

    #[test]
    fn precedence_ladder_is_respected() {
        let records = vec![
            math("L1").with_status(LessonStatus::Substituted),
            math("L1").with_status(LessonStatus::Exam),
            math("L1").with_status(LessonStatus::Regular),
        ];

        let outcome = normalize(&records, &options());

        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].lesson_status, LessonStatus::Substituted);
        assert_eq!(outcome.events[0].summary, "Math [substituted]");
    }

    #[test]
    fn equal_precedence_prefers_last_seen_record() {
        let records = vec![
            math("L1")
                .with_status(LessonStatus::Substituted)
                .with_substitution_note("Mr. A"),
            math("L1")
                .with_status(LessonStatus::Moved)
                .with_rooms(["204"]),
        ];

        let outcome = normalize(&records, &options());

        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].summary, "Math [room changed → 204]");
        assert_eq!(outcome.events[0].status, EventStatus::Confirmed);
    }

    #[test]
    fn duplicate_record_is_idempotent() {
        let record = math("L1").with_rooms(["101"]).with_teachers(["Smith"]);

        let single = normalize(std::slice::from_ref(&record), &options());
        let doubled = normalize(&[record.clone(), record], &options());

        assert_eq!(doubled.events, single.events);
        assert_eq!(single.events.len(), 1);
    }

    #[test]
    fn uid_is_stable_across_status_changes() {
        let regular = normalize(&[math("L1")], &options());
        let cancelled = normalize(&[math("L1").with_status(LessonStatus::Cancelled)], &options());

        assert_eq!(regular.events[0].uid, cancelled.events[0].uid);
        assert!(regular.events[0].uid.ends_with("@untis-ics"));
    }

    #[test]
    fn same_id_in_other_window_is_a_separate_event() {
        let later = RawLessonRecord::new(
            "L1",
            "Math",
            at("2025-04-07T09:00:00+02:00"),
            at("2025-04-07T09:50:00+02:00"),
        );

        let outcome = normalize(&[later, math("L1")], &options());

        assert_eq!(outcome.events.len(), 2);
        assert_ne!(outcome.events[0].uid, outcome.events[1].uid);
        assert!(outcome.events[0].start < outcome.events[1].start);
        assert!(outcome.duplicates.is_empty());
    }

    #[test]
    fn same_instant_in_different_offsets_collapses() {
        let utc = RawLessonRecord::new(
            "L1",
            "Math",
            at("2025-03-31T07:00:00Z"),
            at("2025-03-31T07:50:00Z"),
        )
        .with_status(LessonStatus::Cancelled);

        let outcome = normalize(&[math("L1"), utc], &options());

        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].status, EventStatus::Cancelled);
    }

    #[test]
    fn invalid_records_are_reported_and_skipped() {
        let mut missing_start = math("L2");
        missing_start.start = None;
        let mut missing_end = math("L3");
        missing_end.end = None;
        let zero = RawLessonRecord::new(
            "L4",
            "Art",
            at("2025-03-31T10:00:00+02:00"),
            at("2025-03-31T10:00:00+02:00"),
        );
        let inverted = RawLessonRecord::new(
            "L5",
            "Art",
            at("2025-03-31T11:00:00+02:00"),
            at("2025-03-31T10:00:00+02:00"),
        );
        let mut no_id = math("ignored");
        no_id.remote_id = Some("   ".to_string());
        let mut unknown = math("L6");
        unknown.status = Some("postponed".to_string());

        let records = vec![
            math("L1"),
            missing_start,
            missing_end,
            zero,
            inverted,
            no_id,
            unknown,
        ];
        let outcome = normalize(&records, &options());

        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].remote_id, "L1");

        let errors: Vec<_> = outcome
            .rejected
            .iter()
            .map(|r| (r.index, r.error.clone()))
            .collect();
        assert_eq!(errors.len(), 6);
        assert_eq!(errors[0], (1, ValidationError::MissingStart));
        assert_eq!(errors[1], (2, ValidationError::MissingEnd));
        assert!(matches!(
            errors[2],
            (3, ValidationError::NonPositiveDuration { .. })
        ));
        assert!(matches!(
            errors[3],
            (4, ValidationError::NonPositiveDuration { .. })
        ));
        assert_eq!(errors[4], (5, ValidationError::MissingRemoteId));
        assert_eq!(
            errors[5],
            (6, ValidationError::UnknownStatus("postponed".to_string()))
        );
    }

    #[test]
    fn all_events_have_positive_duration() {
        let records: Vec<_> = (0..5)
            .map(|i| {
                let start = at("2025-03-31T08:00:00+02:00") + chrono::Duration::hours(i);
                RawLessonRecord::new(format!("L{i}"), "Math", start, start + chrono::Duration::minutes(50))
            })
            .collect();

        let outcome = normalize(&records, &options());

        assert_eq!(outcome.events.len(), 5);
        assert!(outcome.events.iter().all(|e| e.end > e.start));
    }

    #[test]
    fn wall_clock_is_preserved_on_dst_transition_day() {
        // Europe/Brussels switches to summer time at 02:00 on 2025-03-30.
        let summer = RawLessonRecord::new(
            "D1",
            "Physics",
            at("2025-03-30T08:00:00+02:00"),
            at("2025-03-30T08:50:00+02:00"),
        );
        let from_utc = RawLessonRecord::new(
            "D2",
            "Physics",
            at("2025-03-30T06:00:00Z"),
            at("2025-03-30T06:50:00Z"),
        );
        let winter = RawLessonRecord::new(
            "D3",
            "Physics",
            at("2025-03-29T08:00:00+01:00"),
            at("2025-03-29T08:50:00+01:00"),
        );

        let outcome = normalize(&[summer, from_utc, winter], &options());

        assert_eq!(outcome.events.len(), 3);
        for event in &outcome.events {
            assert_eq!(event.start.hour(), 8);
            assert_eq!(event.start.minute(), 0);
            assert_eq!(event.end.minute(), 50);
            assert_eq!(event.start.timezone(), chrono_tz::Europe::Brussels);
        }
    }

    #[test]
    fn output_is_sorted_by_start() {
        let early = RawLessonRecord::new(
            "B",
            "Biology",
            at("2025-03-31T08:00:00+02:00"),
            at("2025-03-31T08:50:00+02:00"),
        );
        let late = RawLessonRecord::new(
            "A",
            "Art",
            at("2025-03-31T13:00:00+02:00"),
            at("2025-03-31T13:50:00+02:00"),
        );

        let outcome = normalize(&[late, math("C"), early], &options());

        let ids: Vec<_> = outcome.events.iter().map(|e| e.remote_id.as_str()).collect();
        assert_eq!(ids, ["B", "C", "A"]);
    }

    #[test]
    fn display_text_is_composed_from_record() {
        let mut record = math("L1")
            .with_status(LessonStatus::Substituted)
            .with_rooms([" 204 ", "", "Lab"])
            .with_teachers(["Smith", "Jones"])
            .with_substitution_note("Mrs. Jones replaces Mr. Smith");
        record.classes = vec!["1IT3A".to_string()];
        record.info = Some("Bring calculator".to_string());

        let outcome = normalize(&[record], &options());
        let event = &outcome.events[0];

        assert_eq!(
            event.summary,
            "Math [substitution: Mrs. Jones replaces Mr. Smith]"
        );
        assert_eq!(event.location.as_deref(), Some("204, Lab"));
        assert_eq!(
            event.description.as_deref(),
            Some("Smith / Jones\n1IT3A\nBring calculator\nMrs. Jones replaces Mr. Smith")
        );
        assert_eq!(event.last_modified, options().generated_at);
    }

    #[test]
    fn missing_subject_falls_back_to_placeholder() {
        let mut record = math("L1").with_status(LessonStatus::Exam);
        record.subject = None;

        let outcome = normalize(&[record], &options());

        assert_eq!(outcome.events[0].summary, "Lesson [exam]");
        assert_eq!(outcome.events[0].location, None);
        assert_eq!(outcome.events[0].description, None);
    }
}
