use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed seat list: {reason}")]
pub struct MalformedSeatList {
    pub reason: String,
}

impl MalformedSeatList {
    fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// Seat list exactly as persisted, before tolerant parsing.
#[derive(Debug, Clone)]
pub struct StoredSeatList {
    pub booking_id: Uuid,
    pub booking_reference: Option<String>,
    pub raw: String,
}

/// Seat selection as clients send it: a JSON list, or one string holding
/// either JSON text or comma-separated labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeatSelection {
    List(Vec<Value>),
    Text(String),
}

impl SeatSelection {
    pub fn into_seats(self) -> Result<Vec<String>, MalformedSeatList> {
        match self {
            SeatSelection::List(values) => normalize_entries(values),
            SeatSelection::Text(raw) => parse_seat_list(&raw),
        }
    }
}

/// Parses a stored or submitted seat list.
///
/// Accepts `["A1","A2"]`, `"A1"`, `A1, A2` and the loosely bracketed
/// `[A1, A2]` written by older clients. Blank entries are dropped and
/// duplicates collapsed, keeping first-seen order.
pub fn parse_seat_list(raw: &str) -> Result<Vec<String>, MalformedSeatList> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') || trimmed.starts_with('"') || trimmed.starts_with('{') {
        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Array(values)) => return normalize_entries(values),
            Ok(Value::String(inner)) => return Ok(split_delimited(&inner)),
            Ok(other) => {
                return Err(MalformedSeatList::new(format!(
                    "expected a list of seats, found {}",
                    json_kind(&other)
                )))
            }
            Err(_) if trimmed.starts_with('{') => {
                return Err(MalformedSeatList::new("unparsable object"));
            }
            Err(_) => {
                let stripped: String = trimmed
                    .chars()
                    .filter(|c| !matches!(c, '[' | ']' | '"'))
                    .collect();
                return Ok(split_delimited(&stripped));
            }
        }
    }

    Ok(split_delimited(trimmed))
}

fn split_delimited(raw: &str) -> Vec<String> {
    dedupe(raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from))
}

fn normalize_entries(values: Vec<Value>) -> Result<Vec<String>, MalformedSeatList> {
    let mut seats = Vec::with_capacity(values.len());
    for value in values {
        match value {
            Value::String(s) => {
                let s = s.trim();
                if !s.is_empty() {
                    seats.push(s.to_string());
                }
            }
            Value::Number(n) => seats.push(n.to_string()),
            Value::Null => {}
            other => {
                return Err(MalformedSeatList::new(format!(
                    "seat entry is {}",
                    json_kind(&other)
                )))
            }
        }
    }
    Ok(dedupe(seats))
}

fn dedupe(seats: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    seats
        .into_iter()
        .filter(|seat| seen.insert(seat.clone()))
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Canonical persisted form: a JSON list of strings.
pub fn encode_seat_list(seats: &[String]) -> String {
    Value::from(seats.to_vec()).to_string()
}

/// Union of all parseable seat lists. Malformed rows are skipped with a warning.
pub fn collect_occupied<'a, I>(rows: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a StoredSeatList>,
{
    let mut occupied = BTreeSet::new();
    for row in rows {
        match parse_seat_list(&row.raw) {
            Ok(seats) => occupied.extend(seats),
            Err(e) => warn!(
                booking_id = %row.booking_id,
                booking_reference = row.booking_reference.as_deref().unwrap_or("-"),
                error = %e,
                "Skipping malformed seat data"
            ),
        }
    }
    occupied
}

/// Candidate seats that are already occupied, in candidate order.
pub fn detect_conflict(candidate: &[String], occupied: &BTreeSet<String>) -> Vec<String> {
    candidate
        .iter()
        .filter(|seat| occupied.contains(*seat))
        .cloned()
        .collect()
}
