//! Date and time preferences extracted from free text, and the slot query
//! they turn into.
//!
//! An empty preference is valid and means "earliest available from today".

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use super::slot::{date_label, Slot};
use crate::domain::conversation::text::{contains_phrase, normalize};

/// Hour at which afternoon slots begin.
const AFTERNOON_STARTS: u32 = 13;

/// Coarse part of the day the patient asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    #[default]
    Any,
    Morning,
    Afternoon,
}

impl TimeOfDay {
    pub fn matches(&self, time: NaiveTime) -> bool {
        match self {
            TimeOfDay::Any => true,
            TimeOfDay::Morning => time.hour() < AFTERNOON_STARTS,
            TimeOfDay::Afternoon => time.hour() >= AFTERNOON_STARTS,
        }
    }

    fn label(&self) -> Option<&'static str> {
        match self {
            TimeOfDay::Any => None,
            TimeOfDay::Morning => Some("en la mañana"),
            TimeOfDay::Afternoon => Some("en la tarde"),
        }
    }
}

/// What the patient said about when they want to come.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct SlotPreference {
    pub date: Option<NaiveDate>,
    pub time_of_day: TimeOfDay,
    pub time: Option<NaiveTime>,
}

const WEEKDAY_NAMES: [(&str, Weekday); 7] = [
    ("lunes", Weekday::Mon),
    ("martes", Weekday::Tue),
    ("miercoles", Weekday::Wed),
    ("jueves", Weekday::Thu),
    ("viernes", Weekday::Fri),
    ("sabado", Weekday::Sat),
    ("domingo", Weekday::Sun),
];

const MORNING_PHRASES: [&str; 4] = ["en la manana", "por la manana", "de manana", "temprano"];
const AFTERNOON_PHRASES: [&str; 4] = ["en la tarde", "por la tarde", "de tarde", "tarde"];

impl SlotPreference {
    /// Earliest available, no constraint.
    pub fn earliest() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.date.is_none() && self.time.is_none() && self.time_of_day == TimeOfDay::Any
    }

    /// Extracts a preference from free text relative to `today`.
    ///
    /// Never fails: anything it does not understand is ignored.
    pub fn parse(raw: &str, today: NaiveDate) -> Self {
        let mut text = normalize(raw);
        let mut preference = SlotPreference::default();

        // part-of-day phrases first so "mañana en la mañana" keeps both meanings
        if let Some(phrase) = MORNING_PHRASES.iter().find(|p| contains_phrase(&text, p)) {
            preference.time_of_day = TimeOfDay::Morning;
            text = remove_phrase(&text, phrase);
        } else if let Some(phrase) = AFTERNOON_PHRASES.iter().find(|p| contains_phrase(&text, p)) {
            preference.time_of_day = TimeOfDay::Afternoon;
            text = remove_phrase(&text, phrase);
        }

        preference.time = parse_time(&text);
        preference.date = parse_date(&text, today);
        if let Some(time) = preference.time {
            preference.time_of_day = TimeOfDay::Any;
            if time.hour() < 8 {
                // "a las 3" at a clinic means the afternoon
                preference.time = NaiveTime::from_hms_opt(time.hour() + 12, time.minute(), 0);
            }
        }
        preference
    }

    /// Human description, used when echoing the preference back.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(date) = self.date {
            parts.push(format!("el {}", date_label(date)));
        }
        if let Some(label) = self.time_of_day.label() {
            parts.push(label.to_string());
        }
        if let Some(time) = self.time {
            parts.push(format!("a las {}", time.format("%H:%M")));
        }
        parts.join(" ")
    }
}

fn remove_phrase(text: &str, phrase: &str) -> String {
    let padded = format!(" {} ", text);
    padded.replacen(&format!(" {} ", phrase), " ", 1).trim().to_string()
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    let tokens: Vec<&str> = text.split(' ').collect();
    for (i, token) in tokens.iter().enumerate() {
        let token = token
            .trim_end_matches("hrs")
            .trim_end_matches("hr")
            .trim_end_matches('h');
        if let Some((h, m)) = token.split_once(':') {
            if let (Ok(h), Ok(m)) = (h.parse::<u32>(), m.parse::<u32>()) {
                if let Some(time) = NaiveTime::from_hms_opt(h, m, 0) {
                    return Some(time);
                }
            }
        }
        let after_las = i > 0 && tokens[i - 1] == "las";
        let had_suffix = token.len() != tokens[i].len();
        if after_las || had_suffix {
            if let Ok(h) = token.parse::<u32>() {
                if (1..=20).contains(&h) {
                    return NaiveTime::from_hms_opt(h, 0, 0);
                }
            }
        }
    }
    None
}

fn parse_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    if contains_phrase(text, "pasado manana") {
        return Some(today + Duration::days(2));
    }
    if contains_phrase(text, "manana") {
        return Some(today + Duration::days(1));
    }
    if contains_phrase(text, "hoy") {
        return Some(today);
    }
    for (name, weekday) in WEEKDAY_NAMES {
        if contains_phrase(text, name) {
            let ahead = (7 + weekday.num_days_from_monday() as i64
                - today.weekday().num_days_from_monday() as i64)
                % 7;
            return Some(today + Duration::days(ahead));
        }
    }
    text.split(' ').find_map(|token| parse_numeric_date(token, today))
}

fn parse_numeric_date(token: &str, today: NaiveDate) -> Option<NaiveDate> {
    let parts: Vec<&str> = token.split(['/', '-']).collect();
    let numbers: Vec<u32> = parts.iter().map(|p| p.parse::<u32>().ok()).collect::<Option<_>>()?;
    match numbers.as_slice() {
        [day, month] => {
            let this_year = NaiveDate::from_ymd_opt(today.year(), *month, *day)?;
            if this_year < today {
                NaiveDate::from_ymd_opt(today.year() + 1, *month, *day)
            } else {
                Some(this_year)
            }
        }
        [day, month, year] if *year >= 2000 => {
            NaiveDate::from_ymd_opt(*year as i32, *month, *day)
        }
        _ => None,
    }
}

/// A request for slots, derived from a preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotQuery {
    pub preference: SlotPreference,
    /// First calendar day to search when no date was given.
    pub from: NaiveDate,
    pub limit: usize,
}

impl SlotQuery {
    pub fn new(preference: SlotPreference, from: NaiveDate, limit: usize) -> Self {
        Self {
            preference,
            from,
            limit,
        }
    }

    /// Calendar days to search: the requested day, or `search_days` from `from`.
    pub fn window(&self, search_days: u32) -> (NaiveDate, NaiveDate) {
        match self.preference.date {
            Some(date) => (date, date + Duration::days(1)),
            None => (self.from, self.from + Duration::days(search_days.max(1) as i64)),
        }
    }

    /// Picks the slots to offer from raw calendar availability.
    ///
    /// Candidates before `now` are dropped. With a specific time the closest
    /// matches win; otherwise the earliest. The result is sorted by start.
    pub fn select(
        &self,
        mut candidates: Vec<DateTime<FixedOffset>>,
        now: DateTime<FixedOffset>,
    ) -> Vec<Slot> {
        candidates.retain(|start| {
            *start > now
                && self.preference.date.map_or(true, |d| start.date_naive() == d)
                && self.preference.time_of_day.matches(start.time())
        });
        candidates.sort();
        candidates.dedup();

        if let Some(time) = self.preference.time {
            let wanted = time.num_seconds_from_midnight() as i64;
            candidates.sort_by_key(|start| {
                let distance = (start.time().num_seconds_from_midnight() as i64 - wanted).abs();
                (distance, *start)
            });
            candidates.truncate(self.limit);
            candidates.sort();
        } else {
            candidates.truncate(self.limit);
        }
        candidates.into_iter().map(Slot::new).collect()
    }
}
