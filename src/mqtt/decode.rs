//! Payload decoders: raw transport payloads into canonical [`SignalUpdate`]s.
//!
//! The firmware's payloads come in three shapes: bare scalar strings on the
//! discrete topics, a nested JSON object on `snapshot/json`, and a JSON
//! identity bundle on `info/json` whose key names vary between firmware
//! revisions. Decoding is deliberately lenient on the discrete path (embedded
//! payloads are trusted but must never crash the dashboard) and fails as a
//! unit on malformed JSON.

use serde::Deserialize;
use serde_json::Value as Json;
use thiserror::Error;

use crate::device::signal::{InfoField, MacSource, NUM_DIGITAL_INPUTS, NUM_RELAYS};
use crate::device::{SignalRef, SignalUpdate, Value};

/// Errors from the JSON decoders.
///
/// Fully local to the message being decoded; the reconciler logs and drops
/// the message, nothing propagates.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Payload was not valid JSON or not the expected shape
    #[error("invalid json payload: {0}")]
    Json(#[from] serde_json::Error),
    /// Payload was valid JSON but not an object
    #[error("expected a json object, got {0}")]
    NotAnObject(&'static str),
}

/// Accepted key aliases for each identity field, first match wins.
///
/// Firmware revisions disagree on casing and naming; modelling the aliases as
/// ordered lists keeps the precedence explicit and testable.
const INFO_ALIASES: [(InfoField, &[&str]); 6] = [
    (InfoField::Board, &["board", "Board", "board_name"]),
    (InfoField::Serial, &["serial", "sn", "board_sn"]),
    (InfoField::Firmware, &["fw", "FW", "firmware"]),
    (InfoField::Hardware, &["hw", "HW", "hardware"]),
    (InfoField::Manufacturer, &["mfg", "manufacturer"]),
    (InfoField::Year, &["year", "make_year"]),
];

/// Decodes a discrete per-signal payload.
///
/// Boolean-like signals map payload `"1"` to true and anything else to false;
/// malformed input is never an error. Returns `None` only for signals that
/// have no discrete wire form (analog readings, RTC).
pub fn decode_discrete(signal: SignalRef, raw: &str) -> Option<SignalUpdate> {
    if signal.is_boolean() {
        return Some(SignalUpdate::discrete(signal, Value::Bool(raw == "1")));
    }
    match signal {
        SignalRef::Info(_) | SignalRef::Mac(_) => Some(SignalUpdate::discrete(
            signal,
            Value::Text(raw.trim().to_string()),
        )),
        _ => None,
    }
}

#[derive(Debug, Default, Deserialize)]
struct SnapshotPayload {
    rtc: Option<RtcSection>,
    di: Option<serde_json::Map<String, Json>>,
    rel: Option<serde_json::Map<String, Json>>,
    analog: Option<MillivoltSection>,
    current: Option<CurrentSection>,
    dac: Option<MillivoltSection>,
}

#[derive(Debug, Default, Deserialize)]
struct RtcSection {
    iso: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MillivoltSection {
    ch1_mv: Option<i64>,
    ch2_mv: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct CurrentSection {
    #[serde(rename = "ch1_mA")]
    ch1_ma: Option<i64>,
    #[serde(rename = "ch2_mA")]
    ch2_ma: Option<i64>,
}

/// Decodes the bulk `snapshot/json` payload.
///
/// The snapshot is a partial update: every present field yields one update,
/// absent sections yield none. Boolean maps are keyed by 1-based index as
/// decimal strings; indices outside the hardware range are skipped.
pub fn decode_snapshot_json(raw: &str) -> Result<Vec<SignalUpdate>, DecodeError> {
    let payload: SnapshotPayload = serde_json::from_str(raw)?;
    let mut updates = Vec::new();

    if let Some(iso) = payload.rtc.and_then(|rtc| rtc.iso) {
        updates.push(SignalUpdate::snapshot(
            SignalRef::Clock,
            Value::Timestamp(iso),
        ));
    }

    if let Some(map) = payload.di {
        push_indexed_bools(&mut updates, &map, NUM_DIGITAL_INPUTS, SignalRef::DigitalInput);
    }
    if let Some(map) = payload.rel {
        push_indexed_bools(&mut updates, &map, NUM_RELAYS, SignalRef::Relay);
    }

    if let Some(analog) = payload.analog {
        push_channel(&mut updates, SignalRef::AnalogChannel(1), analog.ch1_mv, Value::Millivolts);
        push_channel(&mut updates, SignalRef::AnalogChannel(2), analog.ch2_mv, Value::Millivolts);
    }
    if let Some(current) = payload.current {
        push_channel(&mut updates, SignalRef::CurrentChannel(1), current.ch1_ma, Value::Milliamps);
        push_channel(&mut updates, SignalRef::CurrentChannel(2), current.ch2_ma, Value::Milliamps);
    }
    if let Some(dac) = payload.dac {
        push_channel(&mut updates, SignalRef::DacChannel(1), dac.ch1_mv, Value::Millivolts);
        push_channel(&mut updates, SignalRef::DacChannel(2), dac.ch2_mv, Value::Millivolts);
    }

    Ok(updates)
}

fn push_indexed_bools(
    updates: &mut Vec<SignalUpdate>,
    map: &serde_json::Map<String, Json>,
    max: u8,
    make_ref: fn(u8) -> SignalRef,
) {
    for (key, value) in map {
        let Ok(index) = key.parse::<u8>() else {
            continue;
        };
        if !(1..=max).contains(&index) {
            continue;
        }
        updates.push(SignalUpdate::snapshot(
            make_ref(index),
            Value::Bool(truthy(value)),
        ));
    }
}

fn push_channel(
    updates: &mut Vec<SignalUpdate>,
    signal: SignalRef,
    reading: Option<i64>,
    unit: fn(i64) -> Value,
) {
    if let Some(v) = reading {
        updates.push(SignalUpdate::snapshot(signal, unit(v)));
    }
}

// Truthiness the way the firmware means it: JSON true, nonzero number, "1".
fn truthy(value: &Json) -> bool {
    match value {
        Json::Bool(b) => *b,
        Json::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Json::String(s) => s == "1",
        _ => false,
    }
}

/// Decodes the `info/json` identity bundle.
///
/// Each field resolves through its alias list in order; both the nested
/// `mac: { eth, sta, ap, efuse }` object and flat `mac_eth`-style keys are
/// accepted, nested form first.
pub fn decode_info_json(raw: &str) -> Result<Vec<SignalUpdate>, DecodeError> {
    let payload: Json = serde_json::from_str(raw)?;
    let Some(object) = payload.as_object() else {
        return Err(DecodeError::NotAnObject(json_kind(&payload)));
    };

    let mut updates = Vec::new();

    for (field, aliases) in INFO_ALIASES {
        if let Some(text) = aliases.iter().find_map(|key| text_field(object, key)) {
            updates.push(SignalUpdate::discrete(
                SignalRef::Info(field),
                Value::Text(text),
            ));
        }
    }

    let nested_mac = object.get("mac").and_then(Json::as_object);
    for source in MacSource::PREFERENCE {
        let nested = nested_mac.and_then(|mac| text_field(mac, source.wire_name()));
        let flat = text_field(object, &format!("mac_{}", source.wire_name()));
        if let Some(addr) = nested.or(flat) {
            updates.push(SignalUpdate::discrete(
                SignalRef::Mac(source),
                Value::Text(addr),
            ));
        }
    }

    Ok(updates)
}

// Stringifies a present, non-null field; numbers (e.g. `year`) render bare.
fn text_field(object: &serde_json::Map<String, Json>, key: &str) -> Option<String> {
    match object.get(key)? {
        Json::Null => None,
        Json::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn json_kind(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}
