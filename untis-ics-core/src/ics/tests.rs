use super::*;
use crate::{
    LessonStatus, RawLessonRecord,
    normalize::{NormalizeOptions, normalize},
};
use chrono::{Duration, TimeZone};
use chrono_tz::Tz;
use ical::parser::ical::IcalParser;
use std::io::BufReader;

const BRUSSELS: Tz = chrono_tz::Europe::Brussels;

fn stamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

fn event(uid: &str, summary: &str, start: (u32, u32, u32), minutes: i64) -> CanonicalEvent {
    let (month, day, hour) = start;
    let start = BRUSSELS.with_ymd_and_hms(2025, month, day, hour, 0, 0).unwrap();
    CanonicalEvent {
        uid: uid.to_string(),
        remote_id: uid.to_string(),
        summary: summary.to_string(),
        location: None,
        description: None,
        start,
        end: start + Duration::minutes(minutes),
        status: EventStatus::Confirmed,
        lesson_status: LessonStatus::Regular,
        last_modified: stamp(),
    }
}

fn lines(ics: &str) -> Vec<&str> {
    ics.split("\r\n").filter(|l| !l.is_empty()).collect()
}

fn unfold(ics: &str) -> String {
    ics.replace("\r\n ", "")
}

#[test]
fn writes_calendar_header_and_event_block() {
    let ics = IcsEncoder::default()
        .generate(&[event("a@untis-ics", "Math", (5, 5, 8), 50)])
        .unwrap();
    let lines = lines(&ics);

    assert_eq!(&lines[..7], &[
        "BEGIN:VCALENDAR",
        "VERSION:2.0",
        "PRODID:-//Untis ICS//untis-ics//EN",
        "CALSCALE:GREGORIAN",
        "METHOD:PUBLISH",
        "X-WR-CALNAME:WebUntis Timetable",
        "X-WR-TIMEZONE:Europe/Brussels",
    ]);

    let begin = lines.iter().position(|l| *l == "BEGIN:VEVENT").unwrap();
    assert_eq!(&lines[begin..], &[
        "BEGIN:VEVENT",
        "UID:a@untis-ics",
        "DTSTAMP:20250301T120000Z",
        "LAST-MODIFIED:20250301T120000Z",
        "DTSTART;TZID=Europe/Brussels:20250505T080000",
        "DTEND;TZID=Europe/Brussels:20250505T085000",
        "SUMMARY:Math",
        "STATUS:CONFIRMED",
        "END:VEVENT",
        "END:VCALENDAR",
    ]);
}

#[test]
fn every_line_ends_with_crlf() {
    let ics = IcsEncoder::default()
        .generate(&[event("a@untis-ics", "Math", (5, 5, 8), 50)])
        .unwrap();

    assert!(ics.ends_with("END:VCALENDAR\r\n"));
    assert_eq!(ics.matches('\n').count(), ics.matches("\r\n").count());
}

#[test]
fn same_input_gives_identical_bytes() {
    let start = DateTime::parse_from_rfc3339("2025-05-05T08:00:00+02:00").unwrap();
    let records = vec![
        RawLessonRecord::new("L2", "Physics", start + Duration::hours(1), start + Duration::minutes(110))
            .with_rooms(["B12"])
            .with_teachers(["Dupont"]),
        RawLessonRecord::new("L1", "Math", start, start + Duration::minutes(50)),
    ];
    let options = NormalizeOptions {
        timezone: BRUSSELS,
        generated_at: stamp(),
    };
    let encoder = IcsEncoder::default();

    let first = encoder.encode(&normalize(&records, &options).events).unwrap();
    let second = encoder.encode(&normalize(&records, &options).events).unwrap();

    assert_eq!(first, second);
}

#[test]
fn escaped_text_survives_a_parser_round_trip() {
    let mut lesson = event("a@untis-ics", "Math, Physics; Lab\nRoom 2", (5, 5, 8), 50);
    lesson.location = Some("A\\1".to_string());
    let bytes = IcsEncoder::default().encode(&[lesson]).unwrap();

    let calendar = IcalParser::new(BufReader::new(bytes.as_slice()))
        .next()
        .unwrap()
        .unwrap();
    let parsed = &calendar.events[0];
    let value = |name: &str| {
        parsed
            .properties
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.value.clone())
            .unwrap()
    };

    assert_eq!(unescape_text(&value("SUMMARY")), "Math, Physics; Lab\nRoom 2");
    assert_eq!(unescape_text(&value("LOCATION")), "A\\1");
}

#[test]
fn long_lines_are_folded_without_splitting_characters() {
    let summary = "Géographie économique et régionale, séance pratique avec exercices écrits";
    let mut lesson = event("a@untis-ics", summary, (5, 5, 8), 50);
    lesson.description = Some("é".repeat(100));
    let ics = IcsEncoder::default().generate(&[lesson]).unwrap();

    for line in ics.split("\r\n") {
        assert!(line.len() <= 75, "line too long: {line:?}");
    }
    let unfolded = unfold(&ics);
    assert!(unfolded.contains(&format!("SUMMARY:{}\r\n", escape_text(summary))));
    assert!(unfolded.contains("régionale\\, séance"));
    assert!(unfolded.contains(&format!("DESCRIPTION:{}\r\n", "é".repeat(100))));
}

#[test]
fn dst_start_keeps_wall_clock_time() {
    let ics = IcsEncoder::default()
        .generate(&[event("a@untis-ics", "Math", (3, 30, 8), 50)])
        .unwrap();
    let lines = lines(&ics);

    assert!(lines.contains(&"DTSTART;TZID=Europe/Brussels:20250330T080000"));
    assert!(lines.contains(&"DTEND;TZID=Europe/Brussels:20250330T085000"));

    let daylight = lines.iter().position(|l| *l == "BEGIN:DAYLIGHT").unwrap();
    assert_eq!(&lines[daylight + 1..daylight + 4], &[
        "DTSTART:20250330T020000",
        "TZOFFSETFROM:+0100",
        "TZOFFSETTO:+0200",
    ]);
    assert!(lines.contains(&"TZID:Europe/Brussels"));
}

#[test]
fn empty_calendar_has_no_timezone_block() {
    let ics = IcsEncoder::default().generate(&[]).unwrap();

    assert!(!ics.contains("VTIMEZONE"));
    assert!(!ics.contains("VEVENT"));
    assert!(ics.contains("X-WR-TIMEZONE:Europe/Brussels"));
}

#[test]
fn rejects_events_breaking_the_contract() {
    let encoder = IcsEncoder::default();

    let no_uid = event("", "Math", (5, 5, 8), 50);
    assert!(matches!(encoder.encode(&[no_uid]), Err(Error::ContractViolation(_))));

    let no_summary = event("a@untis-ics", "  ", (5, 5, 8), 50);
    assert!(matches!(encoder.encode(&[no_summary]), Err(Error::ContractViolation(_))));

    let mut backwards = event("a@untis-ics", "Math", (5, 5, 8), 50);
    backwards.end = backwards.start;
    assert!(matches!(encoder.encode(&[backwards]), Err(Error::ContractViolation(_))));
}

#[test]
fn keeps_caller_order() {
    let later = event("b@untis-ics", "Later", (5, 6, 8), 50);
    let earlier = event("a@untis-ics", "Earlier", (5, 5, 8), 50);
    let ics = IcsEncoder::default().generate(&[later, earlier]).unwrap();

    let b = ics.find("UID:b@untis-ics").unwrap();
    let a = ics.find("UID:a@untis-ics").unwrap();
    assert!(b < a);
}

#[test]
fn cancelled_events_carry_status_and_no_alarm() {
    let options = IcsOptions {
        reminder_minutes: Some(10),
        ..IcsOptions::default()
    };
    let mut cancelled = event("a@untis-ics", "Math [cancelled]", (5, 5, 8), 50);
    cancelled.status = EventStatus::Cancelled;
    cancelled.lesson_status = LessonStatus::Cancelled;
    let confirmed = event("b@untis-ics", "Physics", (5, 5, 9), 50);

    let ics = IcsEncoder::new(options).generate(&[cancelled, confirmed]).unwrap();

    assert!(ics.contains("STATUS:CANCELLED\r\nEND:VEVENT"));
    assert_eq!(ics.matches("BEGIN:VALARM").count(), 1);
    assert!(ics.contains("BEGIN:VALARM\r\nACTION:DISPLAY\r\nDESCRIPTION:Physics\r\nTRIGGER:-PT10M\r\nEND:VALARM"));
}

#[test]
fn description_can_be_left_out() {
    let mut lesson = event("a@untis-ics", "Math", (5, 5, 8), 50);
    lesson.description = Some("Dupont".to_string());
    lesson.location = Some("B12".to_string());

    let with = IcsEncoder::default().generate(&[lesson.clone()]).unwrap();
    let without = IcsEncoder::new(IcsOptions {
        include_description: false,
        ..IcsOptions::default()
    })
    .generate(&[lesson])
    .unwrap();

    assert!(with.contains("DESCRIPTION:Dupont"));
    assert!(!without.contains("DESCRIPTION"));
    assert!(without.contains("LOCATION:B12"));
}

#[test]
fn text_escaping_rules() {
    assert_eq!(escape_text("a,b;c\\d"), "a\\,b\\;c\\\\d");
    assert_eq!(escape_text("one\r\ntwo\nthree\rfour"), "one\\ntwo\\nthree\\nfour");
    assert_eq!(unescape_text("a\\,b\\;c\\\\d\\nx"), "a,b;c\\d\nx");
}

#[test]
fn parses_utc_timestamps() {
    assert_eq!(parse_utc_timestamp("20250301T120000Z").unwrap(), stamp());
    assert!(parse_utc_timestamp("2025-03-01").is_err());
}
