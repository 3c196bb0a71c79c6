use chrono::{DateTime, Datelike, NaiveDateTime, Utc};

use crate::{
    CanonicalEvent, Error, EventStatus, IcsOptions, Result,
    timezone::{self, Observance},
};

#[cfg(test)]
mod tests;

/// `PRODID` of every generated calendar
pub const PRODUCT_ID: &str = "-//Untis ICS//untis-ics//EN";

/// Maximum octets per physical content line, excluding CRLF
const MAX_LINE_OCTETS: usize = 75;

const UTC_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const LOCAL_FORMAT: &str = "%Y%m%dT%H%M%S";

/// iCalendar encoder for canonical events.
///
/// Output is a pure function of the options and the events, which are
/// written in the order given.
pub struct IcsEncoder {
    options: IcsOptions,
}

impl IcsEncoder {
    pub fn new(options: IcsOptions) -> Self {
        Self { options }
    }

    /// Encode events into iCalendar bytes.
    pub fn encode(&self, events: &[CanonicalEvent]) -> Result<Vec<u8>> {
        self.generate(events).map(String::into_bytes)
    }

    /// Encode events into iCalendar text.
    pub fn generate(&self, events: &[CanonicalEvent]) -> Result<String> {
        for event in events {
            check_contract(event)?;
        }

        let tzid = self.options.timezone.name();
        let mut w = LineWriter::default();

        w.line("BEGIN:VCALENDAR");
        w.line("VERSION:2.0");
        w.property("PRODID", PRODUCT_ID);
        w.line("CALSCALE:GREGORIAN");
        w.line("METHOD:PUBLISH");
        w.text("X-WR-CALNAME", &self.options.calendar_name);
        w.property("X-WR-TIMEZONE", tzid);

        if let Some((first_year, last_year)) = year_span(events) {
            self.add_timezone(&mut w, first_year, last_year);
        }

        for event in events {
            self.add_event(&mut w, event);
        }

        w.line("END:VCALENDAR");
        Ok(w.finish())
    }

    fn add_timezone(&self, w: &mut LineWriter, first_year: i32, last_year: i32) {
        let tz = self.options.timezone;
        w.line("BEGIN:VTIMEZONE");
        w.property("TZID", tz.name());
        for observance in timezone::observances(tz, first_year, last_year) {
            add_observance(w, &observance);
        }
        w.line("END:VTIMEZONE");
    }

    fn add_event(&self, w: &mut LineWriter, event: &CanonicalEvent) {
        let tz = self.options.timezone;
        let tzid = tz.name();
        let stamp = event.last_modified.format(UTC_FORMAT).to_string();
        let start = event.start.with_timezone(&tz).format(LOCAL_FORMAT);
        let end = event.end.with_timezone(&tz).format(LOCAL_FORMAT);

        w.line("BEGIN:VEVENT");
        w.text("UID", &event.uid);
        w.property("DTSTAMP", &stamp);
        w.property("LAST-MODIFIED", &stamp);
        w.line(&format!("DTSTART;TZID={tzid}:{start}"));
        w.line(&format!("DTEND;TZID={tzid}:{end}"));
        w.text("SUMMARY", &event.summary);

        if let Some(ref location) = event.location {
            w.text("LOCATION", location);
        }

        if self.options.include_description {
            if let Some(ref description) = event.description {
                w.text("DESCRIPTION", description);
            }
        }

        w.property("STATUS", event.status.as_ics_str());

        if let Some(minutes) = self.options.reminder_minutes {
            if event.status == EventStatus::Confirmed {
                w.line("BEGIN:VALARM");
                w.line("ACTION:DISPLAY");
                w.text("DESCRIPTION", &event.summary);
                w.line(&format!("TRIGGER:-PT{minutes}M"));
                w.line("END:VALARM");
            }
        }

        w.line("END:VEVENT");
    }
}

impl Default for IcsEncoder {
    fn default() -> Self {
        Self::new(IcsOptions::default())
    }
}

fn check_contract(event: &CanonicalEvent) -> Result<()> {
    if event.uid.trim().is_empty() {
        return Err(Error::ContractViolation(format!(
            "event for lesson {:?} has no uid",
            event.remote_id
        )));
    }
    if event.summary.trim().is_empty() {
        return Err(Error::ContractViolation(format!(
            "event {} has no summary",
            event.uid
        )));
    }
    if event.end <= event.start {
        return Err(Error::ContractViolation(format!(
            "event {} ends at {} which is not after its start {}",
            event.uid, event.end, event.start
        )));
    }
    Ok(())
}

fn add_observance(w: &mut LineWriter, observance: &Observance) {
    let name = observance.kind.component_name();
    w.line(&format!("BEGIN:{name}"));
    w.property("DTSTART", &observance.local_start.format(LOCAL_FORMAT).to_string());
    w.property(
        "TZOFFSETFROM",
        &timezone::format_utc_offset(observance.offset_from),
    );
    w.property("TZOFFSETTO", &timezone::format_utc_offset(observance.offset_to));
    w.line(&format!("END:{name}"));
}

fn year_span(events: &[CanonicalEvent]) -> Option<(i32, i32)> {
    let first = events.iter().map(|e| e.start.year()).min()?;
    let last = events.iter().map(|e| e.end.year()).max()?;
    Some((first, last))
}

/// Accumulates folded, CRLF-terminated content lines.
#[derive(Default)]
struct LineWriter {
    out: String,
}

impl LineWriter {
    fn line(&mut self, content: &str) {
        fold_line(&mut self.out, content);
    }

    fn property(&mut self, name: &str, value: &str) {
        self.line(&format!("{name}:{value}"));
    }

    fn text(&mut self, name: &str, value: &str) {
        self.property(name, &escape_text(value));
    }

    fn finish(self) -> String {
        self.out
    }
}

/// Fold a logical line at 75 octets, never inside a UTF-8 sequence.
fn fold_line(out: &mut String, line: &str) {
    let mut width = 0;
    for ch in line.chars() {
        let len = ch.len_utf8();
        if width + len > MAX_LINE_OCTETS {
            out.push_str("\r\n ");
            width = 1;
        }
        out.push(ch);
        width += len;
    }
    out.push_str("\r\n");
}

/// Escape a TEXT value.
///
/// CRLF and lone CR both become a single escaped newline.
pub fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            ';' => escaped.push_str("\\;"),
            ',' => escaped.push_str("\\,"),
            '\n' => escaped.push_str("\\n"),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                escaped.push_str("\\n");
            }
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Inverse of [`escape_text`] for values read back from a calendar.
pub fn unescape_text(value: &str) -> String {
    let mut text = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            text.push(ch);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => text.push('\n'),
            Some(other) => text.push(other),
            None => text.push('\\'),
        }
    }
    text
}

/// Parse a `DATE-TIME` value in UTC form (`20250101T120000Z`).
pub fn parse_utc_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(NaiveDateTime::parse_from_str(value.trim(), UTC_FORMAT)?.and_utc())
}
