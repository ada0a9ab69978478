//! Reconciliation engine: inbound transport messages into the state store.
//!
//! Central entry point for everything the wildcard subscription delivers.
//! Each message is resolved through the topic grammar, routed to the matching
//! decoder, applied to the store, and the resulting change notifications are
//! forwarded to the rendering collaborator, all before the next message
//! is touched. There is no buffering and no reordering: last write wins by
//! arrival order, regardless of whether a value came from a discrete topic or
//! a bulk snapshot. Notification delivery waits for the renderer, the same
//! policy the lifecycle controller uses for status events, so a snapshot
//! burst slows intake down instead of losing updates. Decode failures are
//! dropped locally and never halt processing of subsequent messages.

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::device::{DeviceIdentity, DeviceState, SignalUpdate};
use crate::render::RenderEvent;

use super::decode::{decode_discrete, decode_info_json, decode_snapshot_json};
use super::topics::{parse_topic, ParsedTopic};

/// Owns the device state and merges inbound messages into it.
pub struct Reconciler {
    identity: DeviceIdentity,
    state: DeviceState,
    render_tx: mpsc::Sender<RenderEvent>,
}

impl Reconciler {
    pub fn new(identity: DeviceIdentity, render_tx: mpsc::Sender<RenderEvent>) -> Self {
        Self {
            identity,
            state: DeviceState::new(),
            render_tx,
        }
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// Handles one inbound message to completion.
    pub async fn on_inbound_message(&mut self, topic: &str, payload: &str) {
        match parse_topic(&self.identity, topic) {
            ParsedTopic::Signal(signal) => {
                if let Some(update) = decode_discrete(signal, payload) {
                    self.apply_batch(vec![update]).await;
                }
            }
            ParsedTopic::SnapshotJson => match decode_snapshot_json(payload) {
                Ok(updates) => self.apply_batch(updates).await,
                Err(e) => debug!(topic, "dropping malformed snapshot: {e}"),
            },
            ParsedTopic::InfoJson => match decode_info_json(payload) {
                Ok(updates) => self.apply_batch(updates).await,
                Err(e) => debug!(topic, "dropping malformed info bundle: {e}"),
            },
            ParsedTopic::Unrecognized => trace!(topic, "topic outside grammar, ignored"),
        }
    }

    // Applies every update of one message, then notifies once.
    async fn apply_batch(&mut self, updates: Vec<SignalUpdate>) {
        let mut changed = Vec::new();
        let mut mac_changed = false;

        for update in &updates {
            let changes = self.state.apply(update);
            mac_changed |= changes.preferred_mac_changed;
            for signal in changes.signals {
                changed.push((signal, self.state.get(signal).clone()));
            }
        }

        if !changed.is_empty() {
            self.notify(RenderEvent::Signals(changed)).await;
        }
        if mac_changed {
            self.notify(RenderEvent::PreferredMac(self.state.preferred_mac().clone()))
                .await;
        }
    }

    async fn notify(&self, event: RenderEvent) {
        if self.render_tx.send(event).await.is_err() {
            debug!("render channel closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::device::signal::{MacSource, SignalRef, Value};

    fn reconciler() -> (Reconciler, mpsc::Receiver<RenderEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let identity = DeviceIdentity::new("a8rm-01", "cortexlink/a8rm-01");
        (Reconciler::new(identity, tx), rx)
    }

    #[tokio::test]
    async fn discrete_relay_message_updates_store_and_notifies() {
        let (mut rec, mut rx) = reconciler();
        rec.on_inbound_message("cortexlink/a8rm-01/rel/2/state", "1").await;

        assert_eq!(rec.state().get(SignalRef::Relay(2)), &Value::Bool(true));
        assert_eq!(
            rx.try_recv().unwrap(),
            RenderEvent::Signals(vec![(SignalRef::Relay(2), Value::Bool(true))])
        );
    }

    #[tokio::test]
    async fn redundant_message_produces_no_notification() {
        let (mut rec, mut rx) = reconciler();
        rec.on_inbound_message("cortexlink/a8rm-01/di/1", "1").await;
        rx.try_recv().unwrap();

        rec.on_inbound_message("cortexlink/a8rm-01/di/1", "1").await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn snapshot_and_discrete_merge_last_write_wins() {
        let (mut rec, mut rx) = reconciler();

        // Discrete says on, later snapshot says off: snapshot wins by arrival.
        rec.on_inbound_message("cortexlink/a8rm-01/rel/1", "1").await;
        rec.on_inbound_message("cortexlink/a8rm-01/snapshot/json", r#"{"rel":{"1":false}}"#).await;
        assert_eq!(rec.state().get(SignalRef::Relay(1)), &Value::Bool(false));

        // And the other way around, interleaved with an unrelated signal.
        rec.on_inbound_message("cortexlink/a8rm-01/snapshot/json", r#"{"rel":{"1":false},"di":{"4":true}}"#).await;
        rec.on_inbound_message("cortexlink/a8rm-01/rel/1/state", "1").await;
        assert_eq!(rec.state().get(SignalRef::Relay(1)), &Value::Bool(true));
        assert_eq!(rec.state().get(SignalRef::DigitalInput(4)), &Value::Bool(true));

        while rx.try_recv().is_ok() {}
    }

    #[tokio::test]
    async fn malformed_snapshot_leaves_store_unchanged() {
        let (mut rec, mut rx) = reconciler();
        let before = rec.state().clone();

        rec.on_inbound_message("cortexlink/a8rm-01/snapshot/json", "{not json").await;

        for signal in SignalRef::enumerate() {
            assert_eq!(rec.state().get(signal), before.get(signal));
        }
        assert!(rx.try_recv().is_err());

        // Processing continues afterwards.
        rec.on_inbound_message("cortexlink/a8rm-01/rel/3", "1").await;
        assert_eq!(rec.state().get(SignalRef::Relay(3)), &Value::Bool(true));
    }

    #[tokio::test]
    async fn online_flag_touches_only_its_own_ref() {
        let (mut rec, mut rx) = reconciler();
        rec.on_inbound_message("cortexlink/a8rm-01/birth/online", "1").await;

        assert_eq!(rec.state().get(SignalRef::Online), &Value::Bool(true));
        assert_eq!(
            rx.try_recv().unwrap(),
            RenderEvent::Signals(vec![(SignalRef::Online, Value::Bool(true))])
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn mac_update_emits_preferred_summary() {
        let (mut rec, mut rx) = reconciler();
        rec.on_inbound_message("cortexlink/a8rm-01/info/mac/sta", "AA:BB").await;

        assert_eq!(
            rx.try_recv().unwrap(),
            RenderEvent::Signals(vec![(
                SignalRef::Mac(MacSource::Sta),
                Value::Text("AA:BB".into())
            )])
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            RenderEvent::PreferredMac(Value::Text("AA:BB".into()))
        );

        rec.on_inbound_message("cortexlink/a8rm-01/info/mac/eth", "CC:DD").await;
        rx.try_recv().unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            RenderEvent::PreferredMac(Value::Text("CC:DD".into()))
        );
    }

    #[tokio::test]
    async fn foreign_topics_are_ignored() {
        let (mut rec, mut rx) = reconciler();
        rec.on_inbound_message("cortexlink/other/rel/1", "1").await;
        rec.on_inbound_message("cortexlink/a8rm-01/rel/9", "1").await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn notifications_survive_a_saturated_render_channel() {
        // Capacity 1 forces the second event of the message to wait for the
        // renderer instead of being dropped.
        let (tx, mut rx) = mpsc::channel(1);
        let identity = DeviceIdentity::new("a8rm-01", "cortexlink/a8rm-01");
        let mut rec = Reconciler::new(identity, tx);

        let consumer = tokio::spawn(async move {
            let mut events = Vec::new();
            while let Some(event) = rx.recv().await {
                events.push(event);
            }
            events
        });

        rec.on_inbound_message("cortexlink/a8rm-01/info/mac/sta", "AA:BB").await;
        drop(rec);

        let events = consumer.await.unwrap();
        assert_eq!(
            events,
            vec![
                RenderEvent::Signals(vec![(
                    SignalRef::Mac(MacSource::Sta),
                    Value::Text("AA:BB".into())
                )]),
                RenderEvent::PreferredMac(Value::Text("AA:BB".into())),
            ]
        );
    }

    #[tokio::test]
    async fn info_bundle_applies_all_fields() {
        let (mut rec, _rx) = reconciler();
        rec.on_inbound_message(
            "cortexlink/a8rm-01/info/json",
            r#"{"board": "A8R-M", "mac": {"eth": "CC:DD"}}"#,
        ).await;
        assert_eq!(
            rec.state().get(SignalRef::Info(crate::device::InfoField::Board)),
            &Value::Text("A8R-M".into())
        );
        assert_eq!(rec.state().preferred_mac(), &Value::Text("CC:DD".into()));
    }
}
