//! # Device Model Module
//!
//! In-memory model of the CortexLink A8R-M controller board as seen from the
//! dashboard. The board exposes a mixed bag of I/O (relays, opto-isolated
//! digital inputs, analog voltage/current channels, DAC outputs) plus identity
//! metadata and redundant MAC addresses from its different network interfaces.
//!
//! ## Key Abstractions
//! - **SignalRef**: the single addressable key space for every point of device
//!   state. After topic parsing, no component addresses state by raw topic
//!   string; everything is keyed by `SignalRef`.
//! - **SignalUpdate**: one decoded value for one signal, tagged with the path
//!   it arrived on (discrete per-signal topic vs. bulk snapshot).
//! - **DeviceState**: the authoritative store, fixed key space, with a derived
//!   "preferred MAC" view over the redundant address sources.
//!
//! ## Design Philosophy
//! Every signal always has a value. A signal that has never been reported is
//! `Value::Unknown`, rendered as a placeholder, so the rendering layer never
//! has to distinguish "absent" from "zero".

pub mod signal;
pub mod state;

pub use signal::{InfoField, MacSource, SignalRef, SignalUpdate, UpdateSource, Value};
pub use state::{ChangeSet, DeviceState};

/// Identity of the mirrored device for one dashboard session.
///
/// `topic_base` is the root prefix under which every topic of this device is
/// namespaced. Both fields come from the device's `/api/mqttinfo` endpoint and
/// are immutable once a connection session is established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// MQTT client id the firmware announced for itself
    pub client_id: String,
    /// Root topic prefix, e.g. `cortexlink/a8rm-01`
    pub topic_base: String,
}

impl DeviceIdentity {
    pub fn new(client_id: impl Into<String>, topic_base: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            topic_base: topic_base.into(),
        }
    }
}
