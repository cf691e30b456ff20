//! Text-frame format shared by subscription control and event payloads.
//!
//! Every frame is `<name>:<payload>`. Two control prefixes manage subscriptions:
//!
//! - `event:add:<kind>:<pollId>`
//! - `event:rem:<kind>:<pollId>`
//!
//! Anything else whose name is an [`EventKind`] carries a JSON payload.

use crate::db::PollId;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::str::FromStr;

pub const SUBSCRIBE_PREFIX: &str = "event:add:";
pub const UNSUBSCRIBE_PREFIX: &str = "event:rem:";

const SEPARATOR: char = ':';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Vote,
    Chat,
    Call,
}

impl EventKind {
    #[cfg(test)]
    pub const ALL: [EventKind; 3] = [EventKind::Vote, EventKind::Chat, EventKind::Call];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Vote => "vote",
            EventKind::Chat => "chat",
            EventKind::Call => "call",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vote" => Ok(EventKind::Vote),
            "chat" => Ok(EventKind::Chat),
            "call" => Ok(EventKind::Call),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOp {
    Add,
    Remove,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame<'a> {
    /// No separator, or a control frame whose target does not parse.
    Invalid,
    /// Well-formed name that is not a known event kind.
    Unrecognized { name: &'a str },
    Control {
        op: ControlOp,
        kind: EventKind,
        poll_id: PollId,
    },
    Event { kind: EventKind, payload: &'a str },
}

pub fn decode(raw: &str) -> Frame<'_> {
    if let Some(target) = raw.strip_prefix(SUBSCRIBE_PREFIX) {
        return decode_control(ControlOp::Add, target);
    }
    if let Some(target) = raw.strip_prefix(UNSUBSCRIBE_PREFIX) {
        return decode_control(ControlOp::Remove, target);
    }

    let Some((name, payload)) = raw.split_once(SEPARATOR) else {
        return Frame::Invalid;
    };

    match name.parse::<EventKind>() {
        Ok(kind) => Frame::Event { kind, payload },
        Err(()) => Frame::Unrecognized { name },
    }
}

fn decode_control(op: ControlOp, target: &str) -> Frame<'_> {
    let Some((name, poll_id)) = target.split_once(SEPARATOR) else {
        return Frame::Invalid;
    };

    match (name.parse::<EventKind>(), poll_id.trim().parse::<PollId>()) {
        (Ok(kind), Ok(poll_id)) => Frame::Control { op, kind, poll_id },
        _ => Frame::Invalid,
    }
}

pub fn encode<T: Serialize>(kind: EventKind, payload: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(payload)?;
    Ok(encode_raw(kind, &json))
}

/// Frames a payload that is already serialized, leaving its bytes untouched.
pub fn encode_raw(kind: EventKind, payload: &str) -> String {
    let mut frame = String::with_capacity(kind.as_str().len() + 1 + payload.len());
    frame.push_str(kind.as_str());
    frame.push(SEPARATOR);
    frame.push_str(payload);
    frame
}

/// Builds a subscription control frame, e.g. `event:add:vote:42`.
#[cfg(test)]
pub fn control(op: ControlOp, kind: EventKind, poll_id: PollId) -> String {
    let prefix = match op {
        ControlOp::Add => SUBSCRIBE_PREFIX,
        ControlOp::Remove => UNSUBSCRIBE_PREFIX,
    };
    format!("{prefix}{kind}{SEPARATOR}{poll_id}")
}

/// Decodes a JSON payload into a typed model. `createdAt` fields typed as
/// `DateTime<Utc>` come back as timestamps rather than strings.
pub fn decode_payload<T: DeserializeOwned>(payload: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(payload)
}
