//! Wire envelopes for commands and events.
//!
//! Every frame body is a JSON object tagged by `name`, with exactly one
//! payload field named after the kind in lowerCamelCase:
//!
//! ```text
//! {"name":"AddBreakPoint","addBreakPoint":{"location":"main.go:10"}}
//! {"name":"Kill","kill":{}}
//! {"name":"BreakPointsUpdated","breakPointsUpdated":{"timestamp":1700000000000000000,"breakPoints":[...]}}
//! ```
//!
//! Snapshot timestamps are Unix time in nanoseconds.
//!
//! The envelopes are sum types, so "exactly one payload, matching the name"
//! holds by construction. They convert losslessly to and from the
//! [`Command`] and [`DebuggerEvent`] types the debugger works with.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use ferros_core::command::Command;
use ferros_core::events::{DebuggerEvent, Message};
use ferros_core::types::{Address, Breakpoint, Process, Thread, ThreadId};
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Payload of kinds that carry no data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddBreakPointArgs
{
    pub location: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearArgs
{
    pub addr: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchThreadArgs
{
    pub id: ThreadId,
}

/// Command as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all_fields = "camelCase")]
pub enum CommandFrame
{
    AddBreakPoint
    {
        add_break_point: AddBreakPointArgs
    },
    ClearBreakPoints
    {
        #[serde(default)]
        clear_break_points: Empty,
    },
    Clear
    {
        clear: ClearArgs
    },
    Detach
    {
        #[serde(default)]
        detach: Empty,
    },
    Kill
    {
        #[serde(default)]
        kill: Empty,
    },
    SwitchThread
    {
        switch_thread: SwitchThreadArgs
    },
    Continue
    {
        #[serde(default)]
        r#continue: Empty,
    },
    Step
    {
        #[serde(default)]
        step: Empty,
    },
    Next
    {
        #[serde(default)]
        next: Empty,
    },
}

impl From<Command> for CommandFrame
{
    fn from(command: Command) -> Self
    {
        match command {
            Command::AddBreakPoint { location } => Self::AddBreakPoint {
                add_break_point: AddBreakPointArgs { location },
            },
            Command::ClearBreakPoints => Self::ClearBreakPoints {
                clear_break_points: Empty {},
            },
            Command::Clear { address } => Self::Clear {
                clear: ClearArgs { addr: address },
            },
            Command::Detach => Self::Detach { detach: Empty {} },
            Command::Kill => Self::Kill { kill: Empty {} },
            Command::SwitchThread { id } => Self::SwitchThread {
                switch_thread: SwitchThreadArgs { id },
            },
            Command::Continue => Self::Continue { r#continue: Empty {} },
            Command::Step => Self::Step { step: Empty {} },
            Command::Next => Self::Next { next: Empty {} },
        }
    }
}

impl From<CommandFrame> for Command
{
    fn from(frame: CommandFrame) -> Self
    {
        match frame {
            CommandFrame::AddBreakPoint { add_break_point } => Self::AddBreakPoint {
                location: add_break_point.location,
            },
            CommandFrame::ClearBreakPoints { .. } => Self::ClearBreakPoints,
            CommandFrame::Clear { clear } => Self::Clear { address: clear.addr },
            CommandFrame::Detach { .. } => Self::Detach,
            CommandFrame::Kill { .. } => Self::Kill,
            CommandFrame::SwitchThread { switch_thread } => Self::SwitchThread { id: switch_thread.id },
            CommandFrame::Continue { .. } => Self::Continue,
            CommandFrame::Step { .. } => Self::Step,
            CommandFrame::Next { .. } => Self::Next,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload
{
    pub body: String,
    pub level: i32,
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakPointsPayload
{
    #[serde(with = "chrono::serde::ts_nanoseconds")]
    pub timestamp: DateTime<Utc>,
    pub break_points: Vec<Breakpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadsPayload
{
    #[serde(with = "chrono::serde::ts_nanoseconds")]
    pub timestamp: DateTime<Utc>,
    pub threads: Vec<Thread>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessPayload
{
    pub process: Process,
}

/// Event as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all_fields = "camelCase")]
pub enum EventFrame
{
    Message
    {
        message: MessagePayload
    },
    BreakPointsUpdated
    {
        break_points_updated: BreakPointsPayload
    },
    ThreadsUpdated
    {
        threads_updated: ThreadsPayload
    },
    ProcessUpdated
    {
        process_updated: ProcessPayload
    },
}

impl From<DebuggerEvent> for EventFrame
{
    fn from(event: DebuggerEvent) -> Self
    {
        match event {
            DebuggerEvent::Message(message) => Self::Message {
                message: MessagePayload {
                    body: message.body,
                    level: message.level,
                    is_error: message.is_error,
                },
            },
            DebuggerEvent::BreakPointsUpdated { timestamp, breakpoints } => Self::BreakPointsUpdated {
                break_points_updated: BreakPointsPayload {
                    timestamp,
                    break_points: breakpoints,
                },
            },
            DebuggerEvent::ThreadsUpdated { timestamp, threads } => Self::ThreadsUpdated {
                threads_updated: ThreadsPayload { timestamp, threads },
            },
            DebuggerEvent::ProcessUpdated { process } => Self::ProcessUpdated {
                process_updated: ProcessPayload { process },
            },
        }
    }
}

impl From<EventFrame> for DebuggerEvent
{
    fn from(frame: EventFrame) -> Self
    {
        match frame {
            EventFrame::Message { message } => Self::Message(Message {
                body: message.body,
                level: message.level,
                is_error: message.is_error,
            }),
            EventFrame::BreakPointsUpdated { break_points_updated } => Self::BreakPointsUpdated {
                timestamp: break_points_updated.timestamp,
                breakpoints: break_points_updated.break_points,
            },
            EventFrame::ThreadsUpdated { threads_updated } => Self::ThreadsUpdated {
                timestamp: threads_updated.timestamp,
                threads: threads_updated.threads,
            },
            EventFrame::ProcessUpdated { process_updated } => Self::ProcessUpdated {
                process: process_updated.process,
            },
        }
    }
}

/// Serialize a command into a frame body.
pub fn encode_command(command: Command) -> Result<Bytes, CodecError>
{
    Ok(Bytes::from(serde_json::to_vec(&CommandFrame::from(command))?))
}

/// Parse a frame body into a command.
pub fn decode_command(body: &[u8]) -> Result<Command, CodecError>
{
    Ok(serde_json::from_slice::<CommandFrame>(body)?.into())
}

/// Serialize an event into a frame body.
pub fn encode_event(event: DebuggerEvent) -> Result<Bytes, CodecError>
{
    Ok(Bytes::from(serde_json::to_vec(&EventFrame::from(event))?))
}

/// Parse a frame body into an event.
pub fn decode_event(body: &[u8]) -> Result<DebuggerEvent, CodecError>
{
    Ok(serde_json::from_slice::<EventFrame>(body)?.into())
}

#[cfg(test)]
mod tests
{
    use ferros_core::breakpoints::BreakpointId;
    use ferros_core::types::SourceLine;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_command_wire_shape()
    {
        let body = encode_command(Command::AddBreakPoint {
            location: "main.go:10".into(),
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({"name": "AddBreakPoint", "addBreakPoint": {"location": "main.go:10"}}));

        let body = encode_command(Command::SwitchThread { id: ThreadId(4) }).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({"name": "SwitchThread", "switchThread": {"id": 4}}));

        let body = encode_command(Command::Continue).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({"name": "Continue", "continue": {}}));
    }

    #[test]
    fn test_every_command_round_trips()
    {
        let commands = vec![
            Command::AddBreakPoint {
                location: "pkg/server.go:42".into(),
            },
            Command::ClearBreakPoints,
            Command::Clear {
                address: Address::new(0x40_1010),
            },
            Command::Detach,
            Command::Kill,
            Command::SwitchThread { id: ThreadId(2) },
            Command::Continue,
            Command::Step,
            Command::Next,
        ];
        for command in commands {
            let body = encode_command(command.clone()).unwrap();
            assert_eq!(decode_command(&body).unwrap(), command);
        }
    }

    #[test]
    fn test_every_event_round_trips()
    {
        let events = vec![
            DebuggerEvent::Message(Message::error("Could not resolve location")),
            DebuggerEvent::breakpoints(vec![Breakpoint {
                id: BreakpointId::from_raw(1),
                function_name: Some("main.main".into()),
                file: "main.go".into(),
                line: 10,
                addr: Address::new(0x40_1000),
                temporary: false,
            }]),
            DebuggerEvent::threads(vec![Thread {
                id: ThreadId(1),
                status: 0x57f,
                current_pc: Address::new(0x40_1000),
                current_line: Some(SourceLine {
                    file: "main.go".into(),
                    line: 10,
                    function: Some("main.main".into()),
                }),
                is_current: true,
            }]),
            DebuggerEvent::ProcessUpdated {
                process: Process {
                    files: vec!["main.go".into()],
                    status: 0,
                    exited: true,
                },
            },
        ];
        for event in events {
            let body = encode_event(event.clone()).unwrap();
            assert_eq!(decode_event(&body).unwrap(), event);
        }
    }

    #[test]
    fn test_snapshot_timestamp_is_unix_nanos()
    {
        let event = DebuggerEvent::threads(Vec::new());
        let DebuggerEvent::ThreadsUpdated { timestamp, .. } = &event else {
            unreachable!()
        };
        let expected = timestamp.timestamp_nanos_opt().unwrap();

        let body = encode_event(event.clone()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["threadsUpdated"]["timestamp"].as_i64(), Some(expected));
        assert_eq!(decode_event(&body).unwrap(), event);
    }

    #[test]
    fn test_event_payload_names()
    {
        let body = encode_event(DebuggerEvent::breakpoints(Vec::new())).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["name"], "BreakPointsUpdated");
        assert!(value["breakPointsUpdated"]["breakPoints"].as_array().unwrap().is_empty());
        assert!(value["breakPointsUpdated"]["timestamp"].is_i64());

        let body = encode_event(DebuggerEvent::Message(Message::info("hi"))).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["message"], json!({"body": "hi", "level": 0, "isError": false}));
    }

    #[test]
    fn test_empty_payload_may_be_omitted()
    {
        assert_eq!(decode_command(br#"{"name":"Kill"}"#).unwrap(), Command::Kill);
    }

    #[test]
    fn test_unknown_or_malformed_commands_are_errors()
    {
        assert!(decode_command(br#"{"name":"Halt","halt":{}}"#).is_err());
        assert!(decode_command(br#"{"name":"AddBreakPoint"}"#).is_err());
        assert!(decode_command(b"not json").is_err());
    }
}
