//! Strict parsing of the model's reply into an [`Analysis`].
//!
//! Nothing here repairs bad output: an out-of-range score, a score of the
//! wrong type, or an unreadable time fails the whole message, so model drift
//! shows up in failure counts.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde_json::{Map, Value};

use super::error::ExtractionError;
use super::tier::ImportanceScore;
use super::{Analysis, ExtractedEvent};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y/%m/%dT%H:%M:%S",
    "%Y/%m/%dT%H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

static RE_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(\d+)\s*d(?:ays?)?)?\s*(?:(\d+)\s*h(?:ours?|rs?)?)?\s*(?:(\d+)\s*m(?:in(?:ute)?s?)?)?$",
    )
    .unwrap()
});

/// Parses the model's reply. Naive times are read at `offset`.
pub fn parse_analysis(reply: &str, offset: FixedOffset) -> Result<Analysis, ExtractionError> {
    let json = extract_json_object(reply)
        .ok_or_else(|| ExtractionError::Malformed("no JSON object in reply".to_string()))?;
    let value: Value = serde_json::from_str(json)
        .map_err(|e| ExtractionError::Malformed(format!("invalid JSON: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| ExtractionError::Malformed("reply is not a JSON object".to_string()))?;

    let importance = match object.get("importance_score") {
        Some(v) => parse_score(v)?,
        None => {
            return Err(ExtractionError::Malformed(
                "missing importance_score".to_string(),
            ))
        }
    };

    let events = match object.get("events") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => {
            let mut events = Vec::with_capacity(items.len());
            for item in items {
                let event = item.as_object().ok_or_else(|| {
                    ExtractionError::Malformed("event is not a JSON object".to_string())
                })?;
                if let Some(event) = parse_event(event, importance, offset)? {
                    events.push(event);
                }
            }
            events
        }
        Some(_) => {
            return Err(ExtractionError::Malformed(
                "events is not a list".to_string(),
            ))
        }
    };

    Ok(Analysis {
        summary: string_field(object, "summary").unwrap_or_default(),
        importance,
        importance_reason: string_field(object, "importance_reason").unwrap_or_default(),
        events,
    })
}

/// Strips code fences and returns the text from the first `{` to the last `}`.
fn extract_json_object(reply: &str) -> Option<&str> {
    let text = reply.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_score(value: &Value) -> Result<ImportanceScore, ExtractionError> {
    let raw = match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        _ => None,
    };

    raw.and_then(ImportanceScore::new)
        .ok_or_else(|| ExtractionError::InvalidImportance(value.to_string()))
}

fn parse_event(
    object: &Map<String, Value>,
    message_importance: ImportanceScore,
    offset: FixedOffset,
) -> Result<Option<ExtractedEvent>, ExtractionError> {
    // No start time means the event is not time-bound.
    let Some(start_raw) = string_field(object, "start_time") else {
        return Ok(None);
    };

    let title = string_field(object, "title")
        .ok_or_else(|| ExtractionError::Malformed("event without title".to_string()))?;

    let start = parse_time(&start_raw, offset).ok_or(ExtractionError::InvalidTime {
        field: "start_time",
        value: start_raw.clone(),
    })?;

    let end = match (string_field(object, "end_time"), object.get("duration")) {
        (Some(end_raw), _) => Some(parse_time(&end_raw, offset).ok_or(
            ExtractionError::InvalidTime {
                field: "end_time",
                value: end_raw,
            },
        )?),
        (None, Some(duration)) if !is_blank(duration) => {
            let invalid = || ExtractionError::InvalidTime {
                field: "duration",
                value: duration.to_string(),
            };
            let length = parse_duration(duration).ok_or_else(invalid)?;
            Some(start.checked_add_signed(length).ok_or_else(invalid)?)
        }
        _ => None,
    };

    if let Some(end) = end {
        if end < start {
            return Err(ExtractionError::EndBeforeStart { title });
        }
    }

    let importance = match object.get("importance_score") {
        Some(v) if !v.is_null() => parse_score(v)?,
        _ => message_importance,
    };

    Ok(Some(ExtractedEvent {
        title,
        description: string_field(object, "description"),
        location: string_field(object, "location"),
        start,
        end,
        importance,
    }))
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Parses a timestamp in one of the accepted formats.
pub fn parse_time(value: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }

    let naive = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })?;

    offset
        .from_local_datetime(&naive)
        .single()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Parses a duration: a bare number is minutes; strings like `2h`, `90m`,
/// `1h30m`, `2 hours`, `45 minutes` and `1 day` are accepted.
pub fn parse_duration(value: &Value) -> Option<Duration> {
    let minutes = match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        })?,
        Value::String(s) => parse_duration_str(s)?,
        _ => return None,
    };

    if minutes == 0 {
        return None;
    }
    Duration::try_minutes(i64::try_from(minutes).ok()?)
}

fn parse_duration_str(value: &str) -> Option<u64> {
    let value = value.trim().to_lowercase();
    if let Ok(minutes) = value.parse::<u64>() {
        return Some(minutes);
    }

    let caps = RE_DURATION.captures(&value)?;
    let part = |idx: usize| -> Option<u64> {
        caps.get(idx).map(|m| m.as_str().parse::<u64>().ok()).unwrap_or(Some(0))
    };
    if caps.get(1).is_none() && caps.get(2).is_none() && caps.get(3).is_none() {
        return None;
    }

    let days = part(1)?;
    let hours = part(2)?;
    let minutes = part(3)?;
    days.checked_mul(24 * 60)?
        .checked_add(hours.checked_mul(60)?)?
        .checked_add(minutes)
}
