//! Reading back a previously published calendar.
//!
//! Every run stamps fresh events with the run time. To keep unchanged
//! lessons byte-identical across runs, the stamp of the previous output is
//! carried over for every uid whose content did not change.

use std::{collections::BTreeMap, io::BufReader};

use chrono::{DateTime, Utc};
use ical::{
    parser::ical::{IcalParser, component::IcalEvent},
    property::Property,
};

use crate::{CanonicalEvent, Error, Result, ics};

/// Properties that change on every run without the lesson changing
const VOLATILE_PROPERTIES: [&str; 2] = ["DTSTAMP", "LAST-MODIFIED"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedEvent {
    /// Rendered properties excluding the volatile ones, sorted
    pub fingerprint: Vec<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// `VEVENT`s of a calendar indexed by uid
#[derive(Debug, Clone, Default)]
pub struct PublishedCalendar {
    events: BTreeMap<String, PublishedEvent>,
}

impl PublishedCalendar {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let parser = IcalParser::new(BufReader::new(bytes));
        let mut events = BTreeMap::new();

        for calendar in parser {
            let calendar = calendar.map_err(|err| Error::IcsParse(err.to_string()))?;
            for event in calendar.events {
                let Some(uid) = property_value(&event.properties, "UID") else {
                    continue;
                };
                let uid = ics::unescape_text(uid);
                events.insert(uid, published_event(&event));
            }
        }

        Ok(Self { events })
    }

    pub fn get(&self, uid: &str) -> Option<&PublishedEvent> {
        self.events.get(uid)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Reuse this calendar's `LAST-MODIFIED` for events whose content in
    /// `draft` matches. Returns how many events were found unchanged.
    pub fn carry_forward(&self, draft: &Self, events: &mut [CanonicalEvent]) -> usize {
        let mut unchanged = 0;
        for event in events.iter_mut() {
            let (Some(old), Some(new)) = (self.get(&event.uid), draft.get(&event.uid)) else {
                continue;
            };
            if old.fingerprint != new.fingerprint {
                continue;
            }
            if let Some(stamp) = old.last_modified {
                event.last_modified = stamp;
            }
            unchanged += 1;
        }
        unchanged
    }
}

fn published_event(event: &IcalEvent) -> PublishedEvent {
    let mut fingerprint: Vec<String> = event
        .properties
        .iter()
        .filter(|prop| {
            !VOLATILE_PROPERTIES
                .iter()
                .any(|name| prop.name.eq_ignore_ascii_case(name))
        })
        .map(render_property)
        .collect();
    for alarm in &event.alarms {
        fingerprint.extend(
            alarm
                .properties
                .iter()
                .map(|prop| format!("VALARM/{}", render_property(prop))),
        );
    }
    fingerprint.sort();

    let last_modified = property_value(&event.properties, "LAST-MODIFIED")
        .and_then(|value| ics::parse_utc_timestamp(value).ok());

    PublishedEvent {
        fingerprint,
        last_modified,
    }
}

fn render_property(prop: &Property) -> String {
    let params: String = prop
        .params
        .iter()
        .flatten()
        .map(|(key, values)| format!(";{}={}", key, values.join(",")))
        .collect();
    format!(
        "{}{}:{}",
        prop.name.to_ascii_uppercase(),
        params,
        prop.value.as_deref().unwrap_or("")
    )
}

fn property_value<'a>(properties: &'a [Property], name: &str) -> Option<&'a str> {
    properties
        .iter()
        .find(|prop| prop.name.eq_ignore_ascii_case(name))
        .and_then(|prop| prop.value.as_deref())
}
