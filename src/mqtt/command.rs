//! Operator intents and their outbound wire encoding.
//!
//! Intents are transient: constructed from an operator action, encoded once,
//! never retained. Encoding is gated on the session being connected: a
//! command issued before the transport is up is dropped, not queued, and the
//! device itself is responsible for idempotent handling of repeats.

use serde_json::json;
use thiserror::Error;

use crate::device::signal::NUM_RELAYS;

use super::mqtt_handler::{ConnectionSession, ConnectionState};
use super::topics::command_topic_for;

/// One operator action towards the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandIntent {
    SetRelay { index: u8, on: bool },
    SetDac { channel: u8, millivolts: u32 },
    BuzzerBeep { freq_hz: u32, duration_ms: u32 },
    BuzzerPattern { freq_hz: u32, on_ms: u32, off_ms: u32, repeats: u32 },
    BuzzerStop,
    RequestFullSnapshot,
}

impl CommandIntent {
    /// The dashboard's "all on"/"all off" buttons: one SetRelay per channel.
    pub fn all_relays(on: bool) -> Vec<CommandIntent> {
        (1..=NUM_RELAYS)
            .map(|index| CommandIntent::SetRelay { index, on })
            .collect()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    /// No connected session; the command is dropped as a silent no-op
    #[error("no connected session, command dropped")]
    Blocked,
}

/// Encodes an intent into its outbound `(topic, payload)` pair.
///
/// Returns [`CommandError::Blocked`] unless the session status is
/// `Connected`. Numeric payloads are decimal strings; buzzer intents are JSON
/// objects with the firmware's fixed field names.
pub fn encode(
    session: &ConnectionSession,
    intent: &CommandIntent,
) -> Result<(String, String), CommandError> {
    if session.state != ConnectionState::Connected {
        return Err(CommandError::Blocked);
    }

    let topic = command_topic_for(&session.identity, intent);
    let payload = match intent {
        CommandIntent::SetRelay { on, .. } => (if *on { "1" } else { "0" }).to_string(),
        CommandIntent::SetDac { millivolts, .. } => millivolts.to_string(),
        CommandIntent::BuzzerBeep { freq_hz, duration_ms } => {
            json!({ "freq": freq_hz, "ms": duration_ms }).to_string()
        }
        CommandIntent::BuzzerPattern { freq_hz, on_ms, off_ms, repeats } => {
            json!({ "freq": freq_hz, "on": on_ms, "off": off_ms, "rep": repeats }).to_string()
        }
        CommandIntent::BuzzerStop | CommandIntent::RequestFullSnapshot => "1".to_string(),
    };

    Ok((topic, payload))
}
