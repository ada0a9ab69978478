//! Signal addressing and value types for the device model.
//!
//! `SignalRef` is the sole key space shared by the topic grammar, the payload
//! decoders and the state store. The enum is deliberately exhaustive over the
//! board's fixed hardware: 6 relays, 8 digital inputs, 2 analog voltage
//! channels, 2 current channels and 2 DAC outputs.

use std::fmt;

use chrono::NaiveDateTime;

/// Number of relay channels on the board.
pub const NUM_RELAYS: u8 = 6;
/// Number of opto-isolated digital inputs on the board.
pub const NUM_DIGITAL_INPUTS: u8 = 8;
/// Number of analog/current/DAC channels on the board.
pub const NUM_ANALOG_CHANNELS: u8 = 2;

/// Identity metadata fields reported by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InfoField {
    Board,
    Serial,
    Firmware,
    Hardware,
    Manufacturer,
    Year,
}

impl InfoField {
    pub const ALL: [InfoField; 6] = [
        InfoField::Board,
        InfoField::Serial,
        InfoField::Firmware,
        InfoField::Hardware,
        InfoField::Manufacturer,
        InfoField::Year,
    ];

    /// Wire name of the field as used in the `info/*` topic leaves.
    pub fn wire_name(self) -> &'static str {
        match self {
            InfoField::Board => "board",
            InfoField::Serial => "serial",
            InfoField::Firmware => "fw",
            InfoField::Hardware => "hw",
            InfoField::Manufacturer => "mfg",
            InfoField::Year => "year",
        }
    }
}

/// Network interface a MAC address was reported from.
///
/// The board reports up to four addresses; `PREFERENCE` is the fixed order
/// used to compute the derived preferred MAC (wired first, efuse last).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MacSource {
    Eth,
    Sta,
    Ap,
    Efuse,
}

impl MacSource {
    pub const PREFERENCE: [MacSource; 4] = [
        MacSource::Eth,
        MacSource::Sta,
        MacSource::Ap,
        MacSource::Efuse,
    ];

    pub fn wire_name(self) -> &'static str {
        match self {
            MacSource::Eth => "eth",
            MacSource::Sta => "sta",
            MacSource::Ap => "ap",
            MacSource::Efuse => "efuse",
        }
    }
}

/// One addressable point of device state.
///
/// Indices are 1-based, matching the silkscreen labels and the topic grammar.
/// Validation of index ranges happens at topic-parse time, so a constructed
/// `SignalRef` is always within the board's hardware limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SignalRef {
    DigitalInput(u8),
    Relay(u8),
    AnalogChannel(u8),
    CurrentChannel(u8),
    DacChannel(u8),
    Info(InfoField),
    Mac(MacSource),
    Online,
    Clock,
}

impl SignalRef {
    /// Enumerates every signal the board exposes, in store iteration order.
    ///
    /// The state store's fixed key space is built from exactly this list.
    pub fn enumerate() -> Vec<SignalRef> {
        let mut refs = Vec::with_capacity(32);
        for i in 1..=NUM_DIGITAL_INPUTS {
            refs.push(SignalRef::DigitalInput(i));
        }
        for i in 1..=NUM_RELAYS {
            refs.push(SignalRef::Relay(i));
        }
        for ch in 1..=NUM_ANALOG_CHANNELS {
            refs.push(SignalRef::AnalogChannel(ch));
            refs.push(SignalRef::CurrentChannel(ch));
            refs.push(SignalRef::DacChannel(ch));
        }
        for field in InfoField::ALL {
            refs.push(SignalRef::Info(field));
        }
        for source in MacSource::PREFERENCE {
            refs.push(SignalRef::Mac(source));
        }
        refs.push(SignalRef::Online);
        refs.push(SignalRef::Clock);
        refs
    }

    /// True for signals whose discrete payloads are the `"1"`/`"0"` form.
    pub fn is_boolean(self) -> bool {
        matches!(
            self,
            SignalRef::DigitalInput(_) | SignalRef::Relay(_) | SignalRef::Online
        )
    }
}

impl fmt::Display for SignalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalRef::DigitalInput(i) => write!(f, "di{i}"),
            SignalRef::Relay(i) => write!(f, "relay{i}"),
            SignalRef::AnalogChannel(ch) => write!(f, "analog{ch}"),
            SignalRef::CurrentChannel(ch) => write!(f, "current{ch}"),
            SignalRef::DacChannel(ch) => write!(f, "dac{ch}"),
            SignalRef::Info(field) => write!(f, "info/{}", field.wire_name()),
            SignalRef::Mac(source) => write!(f, "mac/{}", source.wire_name()),
            SignalRef::Online => write!(f, "online"),
            SignalRef::Clock => write!(f, "rtc"),
        }
    }
}

/// Last-known value of a signal.
///
/// Numeric values carry their unit so the rendering layer never has to guess
/// what a bare number means. `Unknown` is the explicit pre-update sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Unknown,
    Bool(bool),
    Millivolts(i64),
    Milliamps(i64),
    Count(i64),
    Text(String),
    /// ISO-8601 timestamp string as reported by the device RTC.
    Timestamp(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unknown => write!(f, "-"),
            Value::Bool(true) => write!(f, "on"),
            Value::Bool(false) => write!(f, "off"),
            Value::Millivolts(v) => write!(f, "{v} mV"),
            Value::Milliamps(v) => write!(f, "{v} mA"),
            Value::Count(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Timestamp(ts) => write!(f, "{ts}"),
        }
    }
}

/// Which update path a value arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    /// Per-signal topic, emitted by the firmware on every state transition
    Discrete,
    /// Bulk `snapshot/json` message, periodic or on demand
    Snapshot,
}

/// One decoded value for one signal, ready to be applied to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalUpdate {
    pub signal: SignalRef,
    pub value: Value,
    pub source: UpdateSource,
    pub received_at: NaiveDateTime,
}

impl SignalUpdate {
    pub fn discrete(signal: SignalRef, value: Value) -> Self {
        Self {
            signal,
            value,
            source: UpdateSource::Discrete,
            received_at: chrono::Local::now().naive_local(),
        }
    }

    pub fn snapshot(signal: SignalRef, value: Value) -> Self {
        Self {
            signal,
            value,
            source: UpdateSource::Snapshot,
            received_at: chrono::Local::now().naive_local(),
        }
    }
}
