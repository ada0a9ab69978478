//! Topic grammar: the bidirectional mapping between wire topics and
//! [`SignalRef`]s.
//!
//! All topics are rooted at the device's `topic_base`. Inbound parsing checks
//! the reserved snapshot/online/info-json topics before the field-level info
//! topics, validates relay and digital-input indices against the board's
//! hardware limits, and drops anything outside the grammar silently; the
//! wildcard subscription will see topics we do not know about.

use crate::device::signal::{InfoField, MacSource, NUM_DIGITAL_INPUTS, NUM_RELAYS};
use crate::device::{DeviceIdentity, SignalRef};

use super::command::CommandIntent;

/// Semantic meaning of one inbound topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedTopic {
    /// Per-signal topic carrying a raw scalar payload
    Signal(SignalRef),
    /// Bulk state snapshot, JSON object payload
    SnapshotJson,
    /// Device identity bundle, JSON object payload
    InfoJson,
    /// Outside the known grammar; dropped without error
    Unrecognized,
}

/// Wire topic a signal's discrete updates are published on.
///
/// Total over all variants: signals that only travel inside the bulk snapshot
/// (analog readings, RTC) map to the snapshot topic itself.
pub fn topic_for(identity: &DeviceIdentity, signal: SignalRef) -> String {
    let base = &identity.topic_base;
    match signal {
        SignalRef::DigitalInput(i) => format!("{base}/di/{i}"),
        SignalRef::Relay(i) => format!("{base}/rel/{i}"),
        SignalRef::Info(field) => format!("{base}/info/{}", field.wire_name()),
        SignalRef::Mac(source) => format!("{base}/info/mac/{}", source.wire_name()),
        SignalRef::Online => format!("{base}/birth/online"),
        SignalRef::AnalogChannel(_)
        | SignalRef::CurrentChannel(_)
        | SignalRef::DacChannel(_)
        | SignalRef::Clock => format!("{base}/snapshot/json"),
    }
}

/// Topic an operator command is published to.
pub fn command_topic_for(identity: &DeviceIdentity, intent: &CommandIntent) -> String {
    let base = &identity.topic_base;
    match intent {
        CommandIntent::SetRelay { index, .. } => format!("{base}/cmd/rel/{index}/set"),
        CommandIntent::SetDac { channel, .. } => format!("{base}/cmd/dac/{channel}/mv_set"),
        CommandIntent::BuzzerBeep { .. } => format!("{base}/cmd/buzzer/beep"),
        CommandIntent::BuzzerPattern { .. } => format!("{base}/cmd/buzzer/pattern"),
        CommandIntent::BuzzerStop => format!("{base}/cmd/buzzer/stop"),
        CommandIntent::RequestFullSnapshot => format!("{base}/cmd/request/full"),
    }
}

/// Wildcard subscription covering the whole device namespace.
pub fn subscription_for(identity: &DeviceIdentity) -> String {
    format!("{}/#", identity.topic_base)
}

/// Maps an inbound topic back to its semantic reference.
pub fn parse_topic(identity: &DeviceIdentity, topic: &str) -> ParsedTopic {
    let Some(rest) = topic
        .strip_prefix(identity.topic_base.as_str())
        .and_then(|rest| rest.strip_prefix('/'))
    else {
        return ParsedTopic::Unrecognized;
    };

    // Reserved topics first, then the indexed and field-level forms.
    match rest {
        "birth/online" => return ParsedTopic::Signal(SignalRef::Online),
        "snapshot/json" => return ParsedTopic::SnapshotJson,
        "info/json" => return ParsedTopic::InfoJson,
        _ => {}
    }

    if let Some(leaf) = rest.strip_prefix("di/") {
        return match parse_index(leaf, NUM_DIGITAL_INPUTS) {
            Some(i) => ParsedTopic::Signal(SignalRef::DigitalInput(i)),
            None => ParsedTopic::Unrecognized,
        };
    }

    if let Some(leaf) = rest.strip_prefix("rel/") {
        // `rel/{i}` and `rel/{i}/state` are the same reference.
        let leaf = leaf.strip_suffix("/state").unwrap_or(leaf);
        return match parse_index(leaf, NUM_RELAYS) {
            Some(i) => ParsedTopic::Signal(SignalRef::Relay(i)),
            None => ParsedTopic::Unrecognized,
        };
    }

    if let Some(leaf) = rest.strip_prefix("info/mac/") {
        for source in MacSource::PREFERENCE {
            if leaf == source.wire_name() {
                return ParsedTopic::Signal(SignalRef::Mac(source));
            }
        }
        return ParsedTopic::Unrecognized;
    }

    if let Some(leaf) = rest.strip_prefix("info/") {
        for field in InfoField::ALL {
            if leaf == field.wire_name() {
                return ParsedTopic::Signal(SignalRef::Info(field));
            }
        }
        return ParsedTopic::Unrecognized;
    }

    ParsedTopic::Unrecognized
}

fn parse_index(leaf: &str, max: u8) -> Option<u8> {
    let index: u8 = leaf.parse().ok()?;
    (1..=max).contains(&index).then_some(index)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn identity() -> DeviceIdentity {
        DeviceIdentity::new("a8rm-01", "cortexlink/a8rm-01")
    }

    #[test]
    fn relay_topics_round_trip_both_forms() {
        let id = identity();
        for i in 1..=NUM_RELAYS {
            let bare = topic_for(&id, SignalRef::Relay(i));
            assert_eq!(
                parse_topic(&id, &bare),
                ParsedTopic::Signal(SignalRef::Relay(i))
            );
            assert_eq!(
                parse_topic(&id, &format!("{bare}/state")),
                ParsedTopic::Signal(SignalRef::Relay(i))
            );
        }
    }

    #[test]
    fn digital_input_topics_round_trip() {
        let id = identity();
        for i in 1..=NUM_DIGITAL_INPUTS {
            let topic = topic_for(&id, SignalRef::DigitalInput(i));
            assert_eq!(
                parse_topic(&id, &topic),
                ParsedTopic::Signal(SignalRef::DigitalInput(i))
            );
        }
    }

    #[test]
    fn out_of_range_indices_are_unrecognized() {
        let id = identity();
        assert_eq!(
            parse_topic(&id, "cortexlink/a8rm-01/rel/7"),
            ParsedTopic::Unrecognized
        );
        assert_eq!(
            parse_topic(&id, "cortexlink/a8rm-01/rel/0/state"),
            ParsedTopic::Unrecognized
        );
        assert_eq!(
            parse_topic(&id, "cortexlink/a8rm-01/di/9"),
            ParsedTopic::Unrecognized
        );
        assert_eq!(
            parse_topic(&id, "cortexlink/a8rm-01/di/x"),
            ParsedTopic::Unrecognized
        );
    }

    #[test]
    fn reserved_topics_win_over_info_fields() {
        let id = identity();
        assert_eq!(
            parse_topic(&id, "cortexlink/a8rm-01/birth/online"),
            ParsedTopic::Signal(SignalRef::Online)
        );
        assert_eq!(
            parse_topic(&id, "cortexlink/a8rm-01/snapshot/json"),
            ParsedTopic::SnapshotJson
        );
        assert_eq!(
            parse_topic(&id, "cortexlink/a8rm-01/info/json"),
            ParsedTopic::InfoJson
        );
        assert_eq!(
            parse_topic(&id, "cortexlink/a8rm-01/info/fw"),
            ParsedTopic::Signal(SignalRef::Info(InfoField::Firmware))
        );
        assert_eq!(
            parse_topic(&id, "cortexlink/a8rm-01/info/mac/efuse"),
            ParsedTopic::Signal(SignalRef::Mac(MacSource::Efuse))
        );
    }

    #[test]
    fn foreign_topics_drop_silently() {
        let id = identity();
        assert_eq!(
            parse_topic(&id, "cortexlink/other-device/rel/1"),
            ParsedTopic::Unrecognized
        );
        assert_eq!(
            parse_topic(&id, "cortexlink/a8rm-01/debug/heap"),
            ParsedTopic::Unrecognized
        );
        assert_eq!(parse_topic(&id, "cortexlink/a8rm-01"), ParsedTopic::Unrecognized);
    }

    #[test]
    fn command_topics_match_firmware_namespace() {
        let id = identity();
        assert_eq!(
            command_topic_for(&id, &CommandIntent::SetRelay { index: 3, on: true }),
            "cortexlink/a8rm-01/cmd/rel/3/set"
        );
        assert_eq!(
            command_topic_for(
                &id,
                &CommandIntent::SetDac {
                    channel: 1,
                    millivolts: 1500
                }
            ),
            "cortexlink/a8rm-01/cmd/dac/1/mv_set"
        );
        assert_eq!(
            command_topic_for(&id, &CommandIntent::RequestFullSnapshot),
            "cortexlink/a8rm-01/cmd/request/full"
        );
        assert_eq!(subscription_for(&id), "cortexlink/a8rm-01/#");
    }
}
