//! # MQTT Mirror Module
//!
//! The topic-routing and state-reconciliation core of the dashboard. The
//! board publishes its state into a flat topic namespace (discrete
//! per-signal topics on every transition plus a periodic bulk snapshot) and
//! accepts commands under `cmd/`. This module turns that namespace into a
//! coherent in-memory mirror and operator intents into correctly addressed
//! publishes.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── topics.rs        - topic grammar (wire topic ◄─► SignalRef)
//! ├── decode.rs        - payload decoders (scalar / snapshot / info json)
//! ├── reconcile.rs     - merge engine feeding the device state store
//! ├── command.rs       - operator intents and outbound encoding
//! └── mqtt_handler.rs  - connection lifecycle state machine
//! ```
//!
//! ## Design Philosophy
//!
//! - **One key space**: after parsing, everything is addressed by
//!   `SignalRef`; raw topic strings never leak past the grammar.
//! - **Arrival order is truth**: discrete and snapshot updates share a plain
//!   last-write-wins merge. The firmware emits discrete topics on every
//!   transition, so the snapshot is a convenience refresh, not an authority.
//! - **Never crash on device input**: decoders are lenient on scalar
//!   payloads and fail whole-message on malformed JSON; either way the next
//!   message is processed as if nothing happened.
//! - **The transport owns reconnection**: the lifecycle controller reacts to
//!   connect/drop/error events and keeps the visible status honest, nothing
//!   more.

pub mod command;
pub mod decode;
pub mod mqtt_handler;
pub mod reconcile;
pub mod topics;
