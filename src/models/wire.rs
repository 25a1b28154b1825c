//! Decoders for the backend's date encodings.
//!
//! The ledger serializes `LocalDate`/`LocalDateTime` either as ISO strings or
//! as arrays (`[2026, 12, 31]`, `[2026, 1, 5, 10, 30, 0, 120000000]`)
//! depending on its Jackson configuration. Both shapes are accepted.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{de::Error as _, Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTemporal {
    Text(String),
    Parts(Vec<i64>),
}

fn date_from_parts<E: serde::de::Error>(parts: &[i64]) -> Result<NaiveDate, E> {
    match parts {
        [y, m, d, ..] => NaiveDate::from_ymd_opt(*y as i32, *m as u32, *d as u32)
            .ok_or_else(|| E::custom(format!("invalid date parts {:?}", parts))),
        _ => Err(E::custom("date array needs at least [year, month, day]")),
    }
}

fn parse_date_text<E: serde::de::Error>(text: &str) -> Result<NaiveDate, E> {
    // Timestamps are accepted too, only the date part is kept
    let date_part = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(E::custom)
}

pub fn deserialize_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    match RawTemporal::deserialize(deserializer)? {
        RawTemporal::Text(text) => parse_date_text(&text),
        RawTemporal::Parts(parts) => date_from_parts(&parts),
    }
}

pub fn deserialize_optional_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawTemporal>::deserialize(deserializer)?;

    let Some(raw) = raw else {
        return Ok(None);
    };

    let timestamp = match raw {
        RawTemporal::Text(text) => {
            let trimmed = text.trim_end_matches('Z');
            match NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S"))
            {
                Ok(timestamp) => timestamp,
                Err(_) => parse_date_text::<D::Error>(trimmed)?.and_time(NaiveTime::MIN),
            }
        }
        RawTemporal::Parts(parts) => {
            let date = date_from_parts::<D::Error>(&parts)?;
            let part = |i: usize| parts.get(i).copied().unwrap_or(0);
            let time = NaiveTime::from_hms_nano_opt(
                part(3) as u32,
                part(4) as u32,
                part(5) as u32,
                part(6) as u32,
            )
            .ok_or_else(|| D::Error::custom(format!("invalid time parts {:?}", parts)))?;
            date.and_time(time)
        }
    };

    Ok(Some(timestamp))
}
