//! Host event types
//!
//! Events delivered by the host application. The engine reacts to each one
//! synchronously on the thread that delivers it.

use crate::types::Participant;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    ParticipantJoined {
        participant: Participant,
        /// Host specific location or context (world, room, channel)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<String>,
    },

    ParticipantLeft {
        participant: Participant,
    },

    /// Manual trigger for an instant replay export
    HotkeyTriggered {
        participant: Participant,
    },

    /// Captured activity for a participant, forwarded to its capture
    Activity {
        participant: Participant,
        payload: Value,
    },
}

impl HostEvent {
    pub fn participant(&self) -> &Participant {
        match self {
            HostEvent::ParticipantJoined { participant, .. }
            | HostEvent::ParticipantLeft { participant }
            | HostEvent::HotkeyTriggered { participant }
            | HostEvent::Activity { participant, .. } => participant,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            HostEvent::ParticipantJoined { .. } => "participant_joined",
            HostEvent::ParticipantLeft { .. } => "participant_left",
            HostEvent::HotkeyTriggered { .. } => "hotkey_triggered",
            HostEvent::Activity { .. } => "activity",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_joined_event() {
        let line = r#"{"type":"participant_joined","participant":{"name":"alice","id":"a-1"},"context":"world"}"#;
        let event: HostEvent = serde_json::from_str(line).unwrap();

        assert_eq!(event.kind(), "participant_joined");
        assert_eq!(event.participant().name, "alice");
        match event {
            HostEvent::ParticipantJoined { context, .. } => {
                assert_eq!(context.as_deref(), Some("world"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_joined_context_is_optional() {
        let line = r#"{"type":"participant_joined","participant":{"name":"bob","id":"b-1"}}"#;
        let event: HostEvent = serde_json::from_str(line).unwrap();
        assert!(matches!(
            event,
            HostEvent::ParticipantJoined { context: None, .. }
        ));
    }

    #[test]
    fn test_unknown_event_type_is_rejected() {
        let line = r#"{"type":"teleported","participant":{"name":"bob","id":"b-1"}}"#;
        assert!(serde_json::from_str::<HostEvent>(line).is_err());
    }
}
