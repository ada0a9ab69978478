//! Authoritative in-memory device state with change tracking.
//!
//! The store's key space is fixed at construction from [`SignalRef::enumerate`];
//! refs are never added or removed afterwards. Mutation happens only through
//! [`DeviceState::apply`], which reports exactly the refs whose externally
//! visible value changed so the rendering layer is never notified redundantly.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;
use tracing::trace;

use super::signal::{MacSource, SignalRef, SignalUpdate, Value};

/// Set of refs touched by one applied update.
///
/// `preferred_mac_changed` is set when the derived MAC summary was recomputed
/// to a different value; the preferred MAC is not part of the wire key space,
/// so it is reported separately from the signal refs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub signals: BTreeSet<SignalRef>,
    pub preferred_mac_changed: bool,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty() && !self.preferred_mac_changed
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    received_at: Option<NaiveDateTime>,
}

/// The canonical mirror of the device, keyed by [`SignalRef`].
#[derive(Debug, Clone)]
pub struct DeviceState {
    entries: BTreeMap<SignalRef, Entry>,
    preferred_mac: Value,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceState {
    /// Builds the store with every known signal present as `Unknown`.
    pub fn new() -> Self {
        let entries = SignalRef::enumerate()
            .into_iter()
            .map(|signal| {
                (
                    signal,
                    Entry {
                        value: Value::Unknown,
                        received_at: None,
                    },
                )
            })
            .collect();
        Self {
            entries,
            preferred_mac: Value::Unknown,
        }
    }

    /// Applies one update and returns the refs whose visible value changed.
    ///
    /// `received_at` is always refreshed, even when the value is identical;
    /// only value changes produce notifications. Applying a MAC update also
    /// recomputes the derived preferred MAC.
    pub fn apply(&mut self, update: &SignalUpdate) -> ChangeSet {
        let mut changes = ChangeSet::default();

        let entry = self.entries.entry(update.signal).or_insert(Entry {
            value: Value::Unknown,
            received_at: None,
        });
        entry.received_at = Some(update.received_at);

        if entry.value != update.value {
            trace!(
                signal = %update.signal,
                old = %entry.value,
                new = %update.value,
                "signal changed"
            );
            entry.value = update.value.clone();
            changes.signals.insert(update.signal);
        }

        if matches!(update.signal, SignalRef::Mac(_)) {
            let recomputed = self.compute_preferred_mac();
            if recomputed != self.preferred_mac {
                self.preferred_mac = recomputed;
                changes.preferred_mac_changed = true;
            }
        }

        changes
    }

    /// Current value of a signal; `Unknown` before the first update.
    pub fn get(&self, signal: SignalRef) -> &Value {
        self.entries
            .get(&signal)
            .map_or(&Value::Unknown, |entry| &entry.value)
    }

    /// When the signal was last reported, if ever.
    pub fn received_at(&self, signal: SignalRef) -> Option<NaiveDateTime> {
        self.entries.get(&signal).and_then(|entry| entry.received_at)
    }

    /// Derived best-available MAC address, precedence eth > sta > ap > efuse.
    pub fn preferred_mac(&self) -> &Value {
        &self.preferred_mac
    }

    fn compute_preferred_mac(&self) -> Value {
        for source in MacSource::PREFERENCE {
            if let Value::Text(addr) = self.get(SignalRef::Mac(source)) {
                if !addr.is_empty() {
                    return Value::Text(addr.clone());
                }
            }
        }
        Value::Unknown
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::device::signal::UpdateSource;

    fn update(signal: SignalRef, value: Value) -> SignalUpdate {
        SignalUpdate::discrete(signal, value)
    }

    #[test]
    fn get_is_total_before_any_update() {
        let state = DeviceState::new();
        assert_eq!(state.get(SignalRef::Relay(3)), &Value::Unknown);
        assert_eq!(state.get(SignalRef::Clock), &Value::Unknown);
        assert_eq!(state.received_at(SignalRef::Relay(3)), None);
    }

    #[test]
    fn apply_reports_changed_ref_once() {
        let mut state = DeviceState::new();

        let changes = state.apply(&update(SignalRef::Relay(1), Value::Bool(true)));
        assert!(changes.signals.contains(&SignalRef::Relay(1)));
        assert_eq!(state.get(SignalRef::Relay(1)), &Value::Bool(true));

        // Same value again: timestamp refreshes, no notification.
        let changes = state.apply(&update(SignalRef::Relay(1), Value::Bool(true)));
        assert!(changes.is_empty());
        assert!(state.received_at(SignalRef::Relay(1)).is_some());
    }

    #[test]
    fn preferred_mac_follows_eth_precedence() {
        let mut state = DeviceState::new();

        let changes = state.apply(&update(
            SignalRef::Mac(MacSource::Sta),
            Value::Text("AA:BB".into()),
        ));
        assert!(changes.preferred_mac_changed);
        assert_eq!(state.preferred_mac(), &Value::Text("AA:BB".into()));

        // Eth arrives later but outranks sta.
        let changes = state.apply(&update(
            SignalRef::Mac(MacSource::Eth),
            Value::Text("CC:DD".into()),
        ));
        assert!(changes.preferred_mac_changed);
        assert_eq!(state.preferred_mac(), &Value::Text("CC:DD".into()));

        // Lower-priority source cannot displace eth.
        let changes = state.apply(&update(
            SignalRef::Mac(MacSource::Ap),
            Value::Text("EE:FF".into()),
        ));
        assert!(!changes.preferred_mac_changed);
        assert_eq!(state.preferred_mac(), &Value::Text("CC:DD".into()));
    }

    #[test]
    fn preferred_mac_order_independent() {
        // Applying eth first then sta reaches the same summary.
        let mut state = DeviceState::new();
        state.apply(&update(
            SignalRef::Mac(MacSource::Eth),
            Value::Text("CC:DD".into()),
        ));
        state.apply(&update(
            SignalRef::Mac(MacSource::Sta),
            Value::Text("AA:BB".into()),
        ));
        assert_eq!(state.preferred_mac(), &Value::Text("CC:DD".into()));
    }

    #[test]
    fn empty_mac_report_counts_as_absent() {
        let mut state = DeviceState::new();
        state.apply(&update(SignalRef::Mac(MacSource::Eth), Value::Text(String::new())));
        state.apply(&update(
            SignalRef::Mac(MacSource::Efuse),
            Value::Text("11:22".into()),
        ));
        assert_eq!(state.preferred_mac(), &Value::Text("11:22".into()));
    }

    #[test]
    fn snapshot_and_discrete_share_last_write_wins() {
        let mut state = DeviceState::new();
        state.apply(&SignalUpdate {
            source: UpdateSource::Snapshot,
            ..update(SignalRef::DigitalInput(2), Value::Bool(true))
        });
        state.apply(&update(SignalRef::DigitalInput(2), Value::Bool(false)));
        assert_eq!(state.get(SignalRef::DigitalInput(2)), &Value::Bool(false));
    }
}
