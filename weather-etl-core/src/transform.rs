//! Turns one raw API payload into a [`WeatherRecord`].
//!
//! Normalization is pure: identical input always yields an identical record.
//! Both the legacy `current_weather` block and the newer `current` block are
//! understood, as are their field-name variants.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use crate::{
    error::NormalizationError,
    model::{Location, RawObservation, WeatherRecord},
};

const BLOCKS: [&str; 2] = ["current_weather", "current"];
const TEMPERATURE: [&str; 2] = ["temperature", "temperature_2m"];
const WIND_SPEED: [&str; 2] = ["windspeed", "wind_speed_10m"];
const WIND_DIRECTION: [&str; 2] = ["winddirection", "wind_direction_10m"];
const WEATHER_CODE: [&str; 2] = ["weathercode", "weather_code"];

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

pub fn normalize(
    raw: &RawObservation,
    location: &Location,
    retrieval_timestamp: DateTime<Utc>,
) -> Result<WeatherRecord, NormalizationError> {
    let block = current_block(&raw.payload)?;
    let utc_offset = utc_offset_seconds(&raw.payload)?;

    let temperature_c = required_f64(block, &TEMPERATURE, "temperature")?;
    let wind_speed_kmh = required_f64(block, &WIND_SPEED, "wind_speed")?;
    let weather_code = required_i64(block, &WEATHER_CODE, "weather_code")?;
    let observation_time = required_time(block, utc_offset)?;

    let wind_direction_deg = match lookup(block, &WIND_DIRECTION) {
        Some(v) => Some(coerce_f64(v, "wind_direction")?),
        None => None,
    };
    let is_day = match lookup(block, &["is_day"]) {
        Some(v) => Some(coerce_bool(v, "is_day")?),
        None => None,
    };

    Ok(WeatherRecord {
        location_name: location.name.clone(),
        latitude: location.latitude,
        longitude: location.longitude,
        observation_time,
        retrieval_timestamp,
        temperature_c,
        wind_speed_kmh,
        wind_direction_deg,
        weather_code,
        is_day,
        raw_payload_hash: raw.payload_hash.clone(),
    })
}

fn current_block(payload: &Value) -> Result<&Map<String, Value>, NormalizationError> {
    let block = BLOCKS
        .iter()
        .find_map(|key| payload.get(*key).filter(|v| !v.is_null()))
        .ok_or(missing("current_weather"))?;

    let found = type_name(block);
    block
        .as_object()
        .ok_or_else(|| type_mismatch("current_weather", "object", found))
}

fn utc_offset_seconds(payload: &Value) -> Result<i64, NormalizationError> {
    match payload.get("utc_offset_seconds") {
        None | Some(Value::Null) => Ok(0),
        Some(v) => coerce_i64(v, "utc_offset_seconds"),
    }
}

/// First non-null value among the aliases.
fn lookup<'a>(block: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .find_map(|key| block.get(*key).filter(|v| !v.is_null()))
}

fn required_f64(
    block: &Map<String, Value>,
    aliases: &[&str],
    field: &'static str,
) -> Result<f64, NormalizationError> {
    let value = lookup(block, aliases).ok_or(missing(field))?;
    coerce_f64(value, field)
}

fn required_i64(
    block: &Map<String, Value>,
    aliases: &[&str],
    field: &'static str,
) -> Result<i64, NormalizationError> {
    let value = lookup(block, aliases).ok_or(missing(field))?;
    coerce_i64(value, field)
}

fn required_time(
    block: &Map<String, Value>,
    utc_offset: i64,
) -> Result<DateTime<Utc>, NormalizationError> {
    let value = lookup(block, &["time"]).ok_or(missing("observation_time"))?;
    let mismatch = || type_mismatch("observation_time", "ISO-8601 timestamp", value);

    let text = value.as_str().ok_or_else(mismatch)?.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Naive times are local to the API's reported offset.
    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .ok_or_else(mismatch)?;

    let offset = Duration::try_seconds(utc_offset).ok_or_else(mismatch)?;
    naive
        .checked_sub_signed(offset)
        .map(|ndt| ndt.and_utc())
        .ok_or_else(mismatch)
}

fn coerce_f64(value: &Value, field: &'static str) -> Result<f64, NormalizationError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| type_mismatch(field, "number", value))
}

fn coerce_i64(value: &Value, field: &'static str) -> Result<i64, NormalizationError> {
    let mismatch = || type_mismatch(field, "integer", value);

    if let Some(i) = value.as_i64() {
        return Ok(i);
    }

    let f = coerce_f64(value, field).map_err(|_| mismatch())?;
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Ok(f as i64)
    } else {
        Err(mismatch())
    }
}

fn coerce_bool(value: &Value, field: &'static str) -> Result<bool, NormalizationError> {
    match value {
        Value::Bool(b) => Ok(*b),
        _ => match coerce_i64(value, field) {
            Ok(0) => Ok(false),
            Ok(1) => Ok(true),
            _ => Err(type_mismatch(field, "0, 1 or boolean", value)),
        },
    }
}

fn missing(field: &'static str) -> NormalizationError {
    NormalizationError::MissingField { field }
}

fn type_mismatch(
    field: &'static str,
    expected: &'static str,
    found: impl ToString,
) -> NormalizationError {
    NormalizationError::TypeMismatch {
        field,
        expected,
        found: found.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn paris() -> Location {
        Location::new("Paris", 48.85, 2.35)
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn raw(payload: Value) -> RawObservation {
        RawObservation {
            location_name: "Paris".into(),
            payload,
            retrieved_at: utc(2024, 1, 1, 12, 5),
            payload_hash: Some("deadbeef".into()),
            attempts: 1,
        }
    }

    fn normalize_payload(payload: Value) -> Result<WeatherRecord, NormalizationError> {
        let raw = raw(payload);
        normalize(&raw, &paris(), raw.retrieved_at)
    }

    fn mismatched_field(err: &NormalizationError) -> Option<&'static str> {
        match err {
            NormalizationError::TypeMismatch { field, .. } => Some(field),
            NormalizationError::MissingField { .. } => None,
        }
    }

    #[test]
    fn normalizes_legacy_current_weather_block() {
        let payload = json!({
            "latitude": 48.86,
            "longitude": 2.36,
            "current_weather": {
                "time": "2024-01-01T12:00:00Z",
                "temperature": 15.2,
                "windspeed": 10,
                "winddirection": 210,
                "weathercode": 3,
                "is_day": 1
            }
        });
        let record = normalize_payload(payload).unwrap();

        assert_eq!(record.location_name, "Paris");
        // Coordinates come from configuration, not the API's grid cell.
        assert_eq!(record.latitude, 48.85);
        assert_eq!(record.longitude, 2.35);
        assert_eq!(record.temperature_c, 15.2);
        assert_eq!(record.wind_speed_kmh, 10.0);
        assert_eq!(record.wind_direction_deg, Some(210.0));
        assert_eq!(record.weather_code, 3);
        assert_eq!(record.is_day, Some(true));
        assert_eq!(record.observation_time, utc(2024, 1, 1, 12, 0));
        assert_eq!(record.retrieval_timestamp, utc(2024, 1, 1, 12, 5));
        assert_eq!(record.raw_payload_hash.as_deref(), Some("deadbeef"));
    }

    #[test]
    fn normalizes_current_block_with_new_field_names() {
        let payload = json!({
            "current": {
                "time": "2024-06-01T08:15",
                "temperature_2m": 21.4,
                "wind_speed_10m": 5.5,
                "weather_code": 0
            }
        });
        let record = normalize_payload(payload).unwrap();

        assert_eq!(record.temperature_c, 21.4);
        assert_eq!(record.wind_speed_kmh, 5.5);
        assert_eq!(record.weather_code, 0);
        assert_eq!(record.wind_direction_deg, None);
        assert_eq!(record.is_day, None);
        assert_eq!(record.observation_time, utc(2024, 6, 1, 8, 15));
    }

    #[test]
    fn naive_time_is_shifted_by_utc_offset() {
        let payload = json!({
            "utc_offset_seconds": 3600,
            "current_weather": {
                "time": "2024-01-01T13:00",
                "temperature": 1.0,
                "windspeed": 1.0,
                "weathercode": 1
            }
        });
        let record = normalize_payload(payload).unwrap();

        assert_eq!(record.observation_time, utc(2024, 1, 1, 12, 0));
    }

    #[test]
    fn offset_timestamps_are_converted_to_utc() {
        let payload = json!({
            "current_weather": {
                "time": "2024-01-01T14:00:00+02:00",
                "temperature": 1.0,
                "windspeed": 1.0,
                "weathercode": 1
            }
        });
        let record = normalize_payload(payload).unwrap();

        assert_eq!(record.observation_time, utc(2024, 1, 1, 12, 0));
    }

    #[test]
    fn numeric_strings_are_coerced() {
        let payload = json!({
            "current_weather": {
                "time": "2024-01-01T12:00",
                "temperature": " -3.5 ",
                "windspeed": "12",
                "weathercode": "61",
                "is_day": 0
            }
        });
        let record = normalize_payload(payload).unwrap();

        assert_eq!(record.temperature_c, -3.5);
        assert_eq!(record.wind_speed_kmh, 12.0);
        assert_eq!(record.weather_code, 61);
        assert_eq!(record.is_day, Some(false));
    }

    #[test]
    fn missing_block_is_reported() {
        let err = normalize_payload(json!({"latitude": 1.0})).unwrap_err();
        assert_eq!(err, missing("current_weather"));
    }

    #[test]
    fn missing_or_null_required_field_is_reported() {
        let no_temperature = json!({
            "current_weather": {
                "time": "2024-01-01T12:00",
                "windspeed": 1.0,
                "weathercode": 1
            }
        });
        let err = normalize_payload(no_temperature).unwrap_err();
        assert_eq!(err, missing("temperature"));

        let null_time = json!({
            "current_weather": {
                "time": null,
                "temperature": 1.0,
                "windspeed": 1.0,
                "weathercode": 1
            }
        });
        let err = normalize_payload(null_time).unwrap_err();
        assert_eq!(err, missing("observation_time"));
    }

    #[test]
    fn wrong_types_are_reported() {
        let warm = json!({
            "current_weather": {
                "time": "2024-01-01T12:00",
                "temperature": "warm",
                "windspeed": 1.0,
                "weathercode": 1
            }
        });
        let err = normalize_payload(warm).unwrap_err();
        assert_eq!(mismatched_field(&err), Some("temperature"));

        let fractional_code = json!({
            "current_weather": {
                "time": "2024-01-01T12:00",
                "temperature": 1.0,
                "windspeed": 1.0,
                "weathercode": 2.5
            }
        });
        let err = normalize_payload(fractional_code).unwrap_err();
        assert_eq!(mismatched_field(&err), Some("weather_code"));

        let bad_time = json!({
            "current_weather": {
                "time": "yesterday",
                "temperature": 1.0,
                "windspeed": 1.0,
                "weathercode": 1
            }
        });
        let err = normalize_payload(bad_time).unwrap_err();
        assert_eq!(mismatched_field(&err), Some("observation_time"));

        let err = normalize_payload(json!({"current_weather": [1, 2, 3]})).unwrap_err();
        assert_eq!(mismatched_field(&err), Some("current_weather"));
    }

    #[test]
    fn normalization_is_deterministic() {
        let payload = json!({
            "current_weather": {
                "time": "2024-01-01T12:00",
                "temperature": 1.0,
                "windspeed": 2.0,
                "weathercode": 3
            }
        });
        let first = normalize_payload(payload.clone()).unwrap();
        let second = normalize_payload(payload).unwrap();
        assert_eq!(first, second);
    }
}
