//! Connection lifecycle controller and transport state machine.
//!
//! Owns one dashboard session from boot to shutdown: fetch the broker
//! parameters from the device, connect, subscribe the device namespace, then
//! shuttle inbound messages into the [`Reconciler`] and operator intents out
//! to the broker. The reconnect loop itself belongs to the transport; this
//! controller only reacts to its events and keeps the visible status correct.
//!
//! # State Machine
//!
//! ```text
//! Idle ──► FetchingParams ──► Connecting ──► Connected ◄──┐
//!                │                              │  ▲      │
//!                ▼                              ▼  │      │
//!             Errored (fetch, terminal)   Reconnecting ───┤
//!                                               │         │
//!                                               ▼         │
//!                                            Errored ─────┘
//!                                         (transport, recoverable)
//! ```
//!
//! Entering `Connected` always subscribes the `{base}/#` wildcard and then
//! requests a full snapshot, so the mirror converges even after long drops.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local};
use color_eyre::eyre::{eyre, Result};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::DeviceApi;
use crate::config::DashboardConfig;
use crate::device::DeviceIdentity;
use crate::render::RenderEvent;

use super::command::{self, CommandError, CommandIntent};
use super::reconcile::Reconciler;
use super::topics::subscription_for;

/// Delay before the event loop is polled again after a transport error.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Visible connectivity status of the one dashboard session.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Idle,
    FetchingParams,
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
    Errored,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectionState::Idle => "MQTT: Idle",
            ConnectionState::FetchingParams => "MQTT: Fetching parameters…",
            ConnectionState::Connecting => "MQTT: Connecting…",
            ConnectionState::Connected => "MQTT: Connected",
            ConnectionState::Reconnecting => "MQTT: Reconnecting…",
            ConnectionState::Disconnected => "MQTT: Disconnected",
            ConnectionState::Errored => "MQTT: Error",
        };
        write!(f, "{text}")
    }
}

/// One boot cycle's transport engagement: identity plus live status.
///
/// Created once after the parameter fetch succeeds; the identity never
/// changes within a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSession {
    pub identity: DeviceIdentity,
    pub state: ConnectionState,
}

/// Aggregated session counters for diagnostics.
#[derive(Clone, Debug, Default)]
pub struct MqttStatus {
    pub state: ConnectionState,
    pub last_error: Option<String>,
    pub messages_received: usize,
    pub messages_sent: usize,
    pub last_activity: Option<DateTime<Local>>,
}

impl MqttStatus {
    /// One-line session summary for the debug log.
    pub fn summary(&self) -> String {
        let activity = self
            .last_activity
            .map_or_else(|| "never".to_string(), |t| t.format("%H:%M:%S").to_string());
        format!(
            "{} | rx {} tx {} | last activity {activity} | last error {}",
            self.state,
            self.messages_received,
            self.messages_sent,
            self.last_error.as_deref().unwrap_or("none")
        )
    }
}

/// Named transport events consumed by the state-transition function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Reconnecting,
    Disconnected,
    Errored(String),
}

/// Pure state-transition function of the lifecycle machine.
///
/// A `Connected` event always reaches `Connected`; `Errored` is visible but
/// not terminal, the transport may recover on its own.
pub fn transition(current: ConnectionState, event: &TransportEvent) -> ConnectionState {
    match event {
        TransportEvent::Connected => ConnectionState::Connected,
        TransportEvent::Reconnecting => ConnectionState::Reconnecting,
        TransportEvent::Disconnected => match current {
            ConnectionState::Idle | ConnectionState::FetchingParams => current,
            _ => ConnectionState::Disconnected,
        },
        TransportEvent::Errored(_) => ConnectionState::Errored,
    }
}

/// Planned transport operations on entering `Connected`, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Subscribe(String),
    Publish { topic: String, payload: String },
}

/// Wildcard subscription first, then the full-snapshot request.
pub fn connected_actions(session: &ConnectionSession) -> Vec<Outbound> {
    let mut actions = vec![Outbound::Subscribe(subscription_for(&session.identity))];
    if let Ok((topic, payload)) = command::encode(session, &CommandIntent::RequestFullSnapshot) {
        actions.push(Outbound::Publish { topic, payload });
    }
    actions
}

/// Handle for the spawned lifecycle controller task.
pub struct MqttHandle {
    pub task: JoinHandle<Result<()>>,
}

impl MqttHandle {
    /// Spawns the controller for one boot cycle.
    ///
    /// The task runs until the process exits; a parameter-fetch failure is
    /// the only early return (terminal until manual restart).
    pub fn spawn(
        config: DashboardConfig,
        render_tx: mpsc::Sender<RenderEvent>,
        intent_rx: mpsc::Receiver<CommandIntent>,
    ) -> Self {
        let task =
            tokio::spawn(
                async move { LifecycleController::run(config, render_tx, intent_rx).await },
            );
        Self { task }
    }
}

struct LifecycleController {
    session: ConnectionSession,
    status: MqttStatus,
    reconciler: Reconciler,
    render_tx: mpsc::Sender<RenderEvent>,
    intent_rx: mpsc::Receiver<CommandIntent>,
    intents_open: bool,
    client: AsyncClient,
}

impl LifecycleController {
    async fn run(
        config: DashboardConfig,
        render_tx: mpsc::Sender<RenderEvent>,
        intent_rx: mpsc::Receiver<CommandIntent>,
    ) -> Result<()> {
        let api = DeviceApi::new(config.device_url.clone());

        send_status(&render_tx, ConnectionState::FetchingParams).await;
        info!("fetching transport parameters from {}", config.device_url);

        // Fetch failure is fatal to startup: banner, no retry.
        let info = match api.fetch_mqtt_info().await {
            Ok(info) => info,
            Err(e) => {
                let msg = format!("Failed to start: {e}");
                error!("{msg}");
                let _ = render_tx.send(RenderEvent::Error(msg.clone())).await;
                send_status(&render_tx, ConnectionState::Errored).await;
                return Err(eyre!(msg));
            }
        };

        let identity = info.identity();
        let (host, port) = config.broker_address(&info);
        info!(
            "device {} at base {}, broker {host}:{port} (ws form {})",
            identity.client_id,
            identity.topic_base,
            info.ws_url(config.device_url.starts_with("https"))
        );

        let mut options = MqttOptions::new(dashboard_client_id(&identity), host, port);
        options.set_keep_alive(Duration::from_secs(5));
        if let Some((user, pass)) = config.credentials(&info) {
            options.set_credentials(user, pass);
        }

        let (client, eventloop) = AsyncClient::new(options, 100);

        let mut controller = Self {
            reconciler: Reconciler::new(identity.clone(), render_tx.clone()),
            session: ConnectionSession {
                identity,
                state: ConnectionState::Connecting,
            },
            status: MqttStatus {
                state: ConnectionState::Connecting,
                ..MqttStatus::default()
            },
            render_tx,
            intent_rx,
            intents_open: true,
            client,
        };
        send_status(&controller.render_tx, ConnectionState::Connecting).await;

        controller.event_loop(eventloop).await;
        Ok(())
    }

    /// Drives the transport event loop and the operator intent channel.
    ///
    /// Inbound messages are handled to completion, one at a time, in the
    /// order the transport delivers them.
    async fn event_loop(&mut self, mut eventloop: EventLoop) {
        loop {
            tokio::select! {
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => self.on_connack().await,
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        self.status.messages_received += 1;
                        self.status.last_activity = Some(Local::now());
                        let payload = String::from_utf8_lossy(&publish.payload);
                        self.reconciler.on_inbound_message(&publish.topic, &payload).await;
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        self.apply_event(TransportEvent::Disconnected).await;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        self.apply_event(TransportEvent::Errored(e.to_string())).await;
                        // Transport retries on the next poll; fixed backoff.
                        tokio::time::sleep(RECONNECT_DELAY).await;
                        self.apply_event(TransportEvent::Reconnecting).await;
                    }
                },
                intent = self.intent_rx.recv(), if self.intents_open => match intent {
                    Some(intent) => self.on_intent(intent).await,
                    None => {
                        debug!("intent channel closed, commands disabled");
                        self.intents_open = false;
                    }
                },
            }
        }
    }

    async fn on_connack(&mut self) {
        self.apply_event(TransportEvent::Connected).await;
        for action in connected_actions(&self.session) {
            let result = match action {
                Outbound::Subscribe(topic) => {
                    debug!("subscribing {topic}");
                    self.client.subscribe(topic, QoS::AtMostOnce).await
                }
                Outbound::Publish { topic, payload } => {
                    debug!("publishing {topic}");
                    self.status.messages_sent += 1;
                    self.client.publish(topic, QoS::AtMostOnce, false, payload).await
                }
            };
            if let Err(e) = result {
                self.apply_event(TransportEvent::Errored(e.to_string())).await;
                return;
            }
        }
    }

    async fn on_intent(&mut self, intent: CommandIntent) {
        match command::encode(&self.session, &intent) {
            Ok((topic, payload)) => {
                debug!("command {intent:?} -> {topic}");
                match self.client.publish(topic, QoS::AtMostOnce, false, payload).await {
                    Ok(()) => self.status.messages_sent += 1,
                    Err(e) => warn!("command publish failed: {e}"),
                }
            }
            // Silent no-op per the command policy, logged for diagnostics only.
            Err(CommandError::Blocked) => {
                debug!("dropping {intent:?}: no connected session");
            }
        }
    }

    async fn apply_event(&mut self, event: TransportEvent) {
        let next = transition(self.session.state, &event);
        if next != self.session.state {
            info!("{} -> {next}", self.session.state);
        }
        self.session.state = next;
        self.status.state = next;
        debug!("{}", self.status.summary());

        match &event {
            TransportEvent::Errored(msg) => {
                warn!("transport error: {msg}");
                self.status.last_error = Some(msg.clone());
                let _ = self
                    .render_tx
                    .send(RenderEvent::Error(format!("MQTT error: {msg}")))
                    .await;
            }
            TransportEvent::Connected => {
                let _ = self.render_tx.send(RenderEvent::ClearError).await;
            }
            _ => {}
        }
        send_status(&self.render_tx, next).await;
    }
}

async fn send_status(render_tx: &mpsc::Sender<RenderEvent>, state: ConnectionState) {
    let _ = render_tx.send(RenderEvent::Status(state)).await;
}

// Unique per dashboard instance so parallel operators do not steal each
// other's broker session.
fn dashboard_client_id(identity: &DeviceIdentity) -> String {
    format!("{}-dash-{}", identity.client_id, std::process::id())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn session(state: ConnectionState) -> ConnectionSession {
        ConnectionSession {
            identity: DeviceIdentity::new("a8rm-01", "cortexlink/a8rm-01"),
            state,
        }
    }

    #[test]
    fn connack_recovers_from_any_transport_state() {
        for current in [
            ConnectionState::Connecting,
            ConnectionState::Reconnecting,
            ConnectionState::Disconnected,
            ConnectionState::Errored,
        ] {
            assert_eq!(
                transition(current, &TransportEvent::Connected),
                ConnectionState::Connected
            );
        }
    }

    #[test]
    fn errors_are_visible_but_not_terminal() {
        let errored = transition(
            ConnectionState::Connected,
            &TransportEvent::Errored("broken pipe".into()),
        );
        assert_eq!(errored, ConnectionState::Errored);

        assert_eq!(
            transition(errored, &TransportEvent::Reconnecting),
            ConnectionState::Reconnecting
        );
        assert_eq!(
            transition(errored, &TransportEvent::Connected),
            ConnectionState::Connected
        );
    }

    #[test]
    fn disconnect_before_session_is_a_no_op() {
        assert_eq!(
            transition(ConnectionState::FetchingParams, &TransportEvent::Disconnected),
            ConnectionState::FetchingParams
        );
        assert_eq!(
            transition(ConnectionState::Connected, &TransportEvent::Disconnected),
            ConnectionState::Disconnected
        );
    }

    #[test]
    fn connected_entry_subscribes_then_requests_snapshot() {
        let actions = connected_actions(&session(ConnectionState::Connected));
        assert_eq!(
            actions,
            vec![
                Outbound::Subscribe("cortexlink/a8rm-01/#".into()),
                Outbound::Publish {
                    topic: "cortexlink/a8rm-01/cmd/request/full".into(),
                    payload: "1".into(),
                },
            ]
        );
    }

    #[test]
    fn status_indicator_texts() {
        assert_eq!(ConnectionState::Connected.to_string(), "MQTT: Connected");
        assert_eq!(ConnectionState::Reconnecting.to_string(), "MQTT: Reconnecting…");
    }
}
