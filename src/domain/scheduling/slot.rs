//! Appointment slots and the identifiers sent to users for them.
//!
//! A slot offered in a list is referenced by a [`SlotId`] built from the
//! slot start and the instant the list was issued. The issuance part lets
//! the scheduling machine tell a selection from the current list apart
//! from one tapped on an older message.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, TimeZone, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::{Timestamp, ValidationError};

const SLOT_ID_PREFIX: &str = "slot";

const WEEKDAYS_SHORT: [&str; 7] = ["Lun", "Mar", "Mié", "Jue", "Vie", "Sáb", "Dom"];
const WEEKDAYS_LONG: [&str; 7] = [
    "lunes", "martes", "miércoles", "jueves", "viernes", "sábado", "domingo",
];
const MONTHS: [&str; 12] = [
    "enero", "febrero", "marzo", "abril", "mayo", "junio", "julio", "agosto",
    "septiembre", "octubre", "noviembre", "diciembre",
];

/// A candidate appointment time. Immutable once offered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub start: DateTime<FixedOffset>,
    pub short_label: String,
    pub long_label: String,
}

impl Slot {
    pub fn new(start: DateTime<FixedOffset>) -> Self {
        Self {
            short_label: short_label(&start),
            long_label: long_label(&start),
            start,
        }
    }

    /// Wall-clock (date, time) key in the slot's own offset.
    pub fn key(&self) -> SlotKey {
        SlotKey {
            date: self.start.date_naive(),
            time: self.start.time(),
        }
    }

    /// Identifier of this slot within a list issued at `issued_at`.
    pub fn id(&self, issued_at: Timestamp) -> SlotId {
        SlotId {
            start_unix: self.start.timestamp(),
            issued_unix: issued_at.as_unix_secs(),
        }
    }
}

fn weekday_index(day: Weekday) -> usize {
    day.num_days_from_monday() as usize
}

fn short_label(start: &DateTime<FixedOffset>) -> String {
    format!(
        "{} {:02}/{:02} {:02}:{:02}",
        WEEKDAYS_SHORT[weekday_index(start.weekday())],
        start.day(),
        start.month(),
        start.hour(),
        start.minute()
    )
}

fn long_label(start: &DateTime<FixedOffset>) -> String {
    format!(
        "{} {} de {} a las {:02}:{:02}",
        WEEKDAYS_LONG[weekday_index(start.weekday())],
        start.day(),
        MONTHS[start.month0() as usize],
        start.hour(),
        start.minute()
    )
}

/// Long Spanish label for a calendar date ("lunes 20 de octubre").
pub fn date_label(date: NaiveDate) -> String {
    format!(
        "{} {} de {}",
        WEEKDAYS_LONG[weekday_index(date.weekday())],
        date.day(),
        MONTHS[date.month0() as usize]
    )
}

/// Wall-clock key used to match a selection against the offered list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    pub date: NaiveDate,
    pub time: NaiveTime,
}

/// Opaque slot reference: `slot:{start_unix}:{issued_unix}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId {
    start_unix: i64,
    issued_unix: i64,
}

impl SlotId {
    /// Parses an identifier previously produced by [`Slot::id`].
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let mut parts = raw.trim().split(':');
        let (prefix, start, issued) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(prefix), Some(start), Some(issued), None) => (prefix, start, issued),
            _ => {
                return Err(ValidationError::invalid_format(
                    "slot_id",
                    "expected slot:<start>:<issued>",
                ))
            }
        };
        if prefix != SLOT_ID_PREFIX {
            return Err(ValidationError::invalid_format("slot_id", "unknown prefix"));
        }
        let start_unix = start
            .parse::<i64>()
            .map_err(|_| ValidationError::invalid_format("slot_id", "start is not a number"))?;
        let issued_unix = issued
            .parse::<i64>()
            .map_err(|_| ValidationError::invalid_format("slot_id", "issued is not a number"))?;
        Ok(Self {
            start_unix,
            issued_unix,
        })
    }

    /// True when the raw text looks like a slot id at all.
    pub fn looks_like(raw: &str) -> bool {
        raw.trim().starts_with("slot:")
    }

    /// Whether this id belongs to the list issued at `issued_at`.
    pub fn issued_with(&self, issued_at: Timestamp) -> bool {
        self.issued_unix == issued_at.as_unix_secs()
    }

    /// The (date, time) key this id was derived from, read at `offset`.
    pub fn key(&self, offset: FixedOffset) -> Option<SlotKey> {
        let start = offset.timestamp_opt(self.start_unix, 0).single()?;
        Some(SlotKey {
            date: start.date_naive(),
            time: start.time(),
        })
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", SLOT_ID_PREFIX, self.start_unix, self.issued_unix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn santiago() -> FixedOffset {
        FixedOffset::west_opt(3 * 3600).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
        santiago().with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn labels_are_spanish() {
        let slot = Slot::new(at(2025, 10, 20, 9, 30));
        assert_eq!(slot.short_label, "Lun 20/10 09:30");
        assert_eq!(slot.long_label, "lunes 20 de octubre a las 09:30");
    }

    #[test]
    fn id_displays_and_parses() {
        let slot = Slot::new(at(2025, 10, 20, 9, 30));
        let issued = Timestamp::from_unix_secs(1_760_000_000).unwrap();
        let id = slot.id(issued);
        let text = id.to_string();
        assert!(text.starts_with("slot:"));
        assert_eq!(SlotId::parse(&text).unwrap(), id);
        assert!(id.issued_with(issued));
        assert!(!id.issued_with(issued.plus_secs(1)));
    }

    #[test]
    fn malformed_ids_are_rejected() {
        assert!(SlotId::parse("slot:abc:1").is_err());
        assert!(SlotId::parse("appt:1:2").is_err());
        assert!(SlotId::parse("slot:1").is_err());
        assert!(SlotId::parse("slot:1:2:3").is_err());
    }

    #[test]
    fn date_label_names_weekday_and_month() {
        let date = NaiveDate::from_ymd_opt(2025, 12, 6).unwrap();
        assert_eq!(date_label(date), "sábado 6 de diciembre");
    }

    proptest! {
        #[test]
        fn every_offered_id_resolves_to_its_slot(
            starts in proptest::collection::vec(1_700_000_000i64..1_900_000_000i64, 1..10),
            issued in 1_700_000_000i64..1_900_000_000i64,
        ) {
            let offset = santiago();
            let issued_at = Timestamp::from_unix_secs(issued).unwrap();
            for start in starts {
                let slot = Slot::new(offset.timestamp_opt(start, 0).unwrap());
                let id = SlotId::parse(&slot.id(issued_at).to_string()).unwrap();
                prop_assert_eq!(id.key(offset), Some(slot.key()));
                prop_assert!(id.issued_with(issued_at));
            }
        }
    }
}
