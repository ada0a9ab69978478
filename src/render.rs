//! Render-facing collaborator interface.
//!
//! The actual widget layer is out of scope for this crate; what lives here is
//! the event surface it consumes (state changes, connectivity status, error
//! banner) and two small console stand-ins: a log renderer that prints every
//! event through `tracing`, and a line-based operator console that turns
//! typed commands into [`CommandIntent`]s.

use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::api::DeviceApi;
use crate::device::signal::{NUM_ANALOG_CHANNELS, NUM_RELAYS};
use crate::device::{SignalRef, Value};
use crate::mqtt::command::CommandIntent;
use crate::mqtt::mqtt_handler::ConnectionState;

/// One notification towards the rendering layer.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    /// Changed signals from one inbound message, with their new values
    Signals(Vec<(SignalRef, Value)>),
    /// The derived preferred MAC summary changed
    PreferredMac(Value),
    /// Connectivity status indicator changed
    Status(ConnectionState),
    /// Persistent or transient error banner with message text
    Error(String),
    /// Clear the error banner (connection recovered)
    ClearError,
}

/// Minimal renderer: logs every event. Runs until the channel closes.
pub async fn run_log_renderer(mut events: mpsc::Receiver<RenderEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            RenderEvent::Signals(changed) => {
                for (signal, value) in changed {
                    info!("{signal} = {value}");
                }
            }
            RenderEvent::PreferredMac(mac) => info!("mac = {mac}"),
            RenderEvent::Status(state) => info!("{state}"),
            RenderEvent::Error(msg) => error!("{msg}"),
            RenderEvent::ClearError => debug!("error banner cleared"),
        }
    }
    debug!("render channel closed");
}

/// One parsed console line: a device command over the transport, or a
/// settings call against the device's HTTP API.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleAction {
    Device(Vec<CommandIntent>),
    ShowNet,
    SetNet(Vec<(String, String)>),
    ShowRtc,
    SyncRtc,
}

/// Reads operator commands from stdin, one per line, until EOF.
///
/// Grammar: `rel <1-6|all> <on|off>`, `dac <ch> <mv>`, `beep <freq> <ms>`,
/// `pattern <freq> <on> <off> <rep>`, `stop`, `snap`; settings commands
/// `net`, `net set <key=value>...`, `rtc`, `rtc sync`.
pub async fn run_console(intents: mpsc::Sender<CommandIntent>, api: DeviceApi) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match parse_command_line(&line) {
            Some(ConsoleAction::Device(parsed)) => {
                for intent in parsed {
                    if intents.send(intent).await.is_err() {
                        return;
                    }
                }
            }
            Some(action) => run_settings_action(&api, action).await,
            None => {
                if !line.trim().is_empty() {
                    warn!("unrecognized command: {line}");
                }
            }
        }
    }
}

/// Executes one settings command against the device API and logs the answer.
async fn run_settings_action(api: &DeviceApi, action: ConsoleAction) {
    let result = match action {
        ConsoleAction::ShowNet => api.net_config().await,
        ConsoleAction::SetNet(pairs) => {
            let form: Vec<(&str, String)> =
                pairs.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
            api.set_net_config(&form).await
        }
        ConsoleAction::ShowRtc => api.rtc().await,
        // Mirror of the dashboard's "set clock from this machine" button.
        ConsoleAction::SyncRtc => api.set_rtc(Local::now().timestamp()).await,
        ConsoleAction::Device(_) => return,
    };
    match result {
        Ok(body) => info!("device answered: {body}"),
        Err(e) => warn!("settings call failed: {e}"),
    }
}

/// Parses one console line; `None` if the line is not a command.
pub fn parse_command_line(line: &str) -> Option<ConsoleAction> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let intents = match words.as_slice() {
        ["net"] => return Some(ConsoleAction::ShowNet),
        ["net", "set", pairs @ ..] if !pairs.is_empty() => {
            let mut form = Vec::new();
            for pair in pairs {
                let (key, value) = pair.split_once('=')?;
                form.push((key.to_string(), value.to_string()));
            }
            return Some(ConsoleAction::SetNet(form));
        }
        ["rtc"] => return Some(ConsoleAction::ShowRtc),
        ["rtc", "sync"] => return Some(ConsoleAction::SyncRtc),
        ["rel", "all", state] => CommandIntent::all_relays(parse_on_off(state)?),
        ["rel", index, state] => {
            let index: u8 = index.parse().ok()?;
            if !(1..=NUM_RELAYS).contains(&index) {
                return None;
            }
            vec![CommandIntent::SetRelay { index, on: parse_on_off(state)? }]
        }
        ["dac", channel, mv] => {
            let channel: u8 = channel.parse().ok()?;
            if !(1..=NUM_ANALOG_CHANNELS).contains(&channel) {
                return None;
            }
            vec![CommandIntent::SetDac { channel, millivolts: mv.parse().ok()? }]
        }
        ["beep", freq, ms] => vec![CommandIntent::BuzzerBeep {
            freq_hz: freq.parse().ok()?,
            duration_ms: ms.parse().ok()?,
        }],
        ["pattern", freq, on, off, rep] => vec![CommandIntent::BuzzerPattern {
            freq_hz: freq.parse().ok()?,
            on_ms: on.parse().ok()?,
            off_ms: off.parse().ok()?,
            repeats: rep.parse().ok()?,
        }],
        ["stop"] => vec![CommandIntent::BuzzerStop],
        ["snap"] => vec![CommandIntent::RequestFullSnapshot],
        _ => return None,
    };
    Some(ConsoleAction::Device(intents))
}

fn parse_on_off(word: &str) -> Option<bool> {
    match word {
        "on" | "1" => Some(true),
        "off" | "0" => Some(false),
        _ => None,
    }
}
