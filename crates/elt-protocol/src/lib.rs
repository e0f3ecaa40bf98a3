//! The connector wire protocol: tagged message variants and the
//! newline-delimited JSON framing used to exchange them with connectors
//! (§4.1).

pub mod message;
pub mod parser;

pub use message::{
    CatalogPayload, ConnectionCheckStatus, ConnectionStatusPayload, ControlPayload,
    GlobalStatePayload, LogLevel, LogPayload, Message, RecordPayload, SpecPayload, StatePayload,
    StateScope, StreamStateDescriptor, StreamStatePayload, TracePayload,
};
pub use parser::{parse_line, parse_lines, write_line, ParsedLine};

/// The last STATE message in `messages` is authoritative for the run
/// (§4.1). Returns `None` if no STATE message was observed.
pub fn last_state(messages: &[Message]) -> Option<&StatePayload> {
    messages.iter().rev().find_map(Message::as_state)
}

/// All RECORD payloads in `messages`, in emission order.
pub fn records(messages: &[Message]) -> Vec<&RecordPayload> {
    messages.iter().filter_map(Message::as_record).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use message::{LogPayload, StreamStateDescriptor, StreamStatePayload};

    #[test]
    fn last_state_picks_final_checkpoint() {
        let mk_state = |cursor: &str| {
            Message::State(StatePayload {
                scope: StateScope::Stream,
                stream: Some(StreamStatePayload {
                    descriptor: StreamStateDescriptor {
                        name: "users".into(),
                        namespace: None,
                    },
                    state: serde_json::json!({ "cursor": cursor }),
                }),
                global: None,
                data: None,
            })
        };
        let messages = vec![
            mk_state("1"),
            Message::Log(LogPayload {
                level: LogLevel::Info,
                message: "tick".into(),
            }),
            mk_state("2"),
        ];
        let state = last_state(&messages).unwrap();
        assert_eq!(
            state.stream.as_ref().unwrap().state,
            serde_json::json!({ "cursor": "2" })
        );
    }
}
