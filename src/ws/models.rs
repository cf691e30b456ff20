use crate::db::{Chat, PollId};
use serde::{Deserialize, Serialize};

/// Inbound `chat:` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub poll_id: PollId,
    pub user: String,
    #[serde(flatten)]
    pub action: ChatAction,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum ChatAction {
    Post { msg: String },
    Delete,
}

/// Outbound `chat:` payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBroadcast<'a> {
    pub poll_id: PollId,
    #[serde(flatten)]
    pub event: ChatEvent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum ChatEvent<'a> {
    #[serde(rename = "new:chat")]
    Posted { data: &'a Chat },
    #[serde(rename = "del:chat")]
    Deleted { who: &'a str },
}

/// The routing field of a `call:` signaling envelope. Everything else,
/// including `type`, is relayed untouched.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallHeader {
    pub poll_id: PollId,
    #[serde(rename = "type", default)]
    pub signal: Option<String>,
}
