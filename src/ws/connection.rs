use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

/// Server-generated identity of one socket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What the broker keeps for an open connection: its id and the sending half
/// of the outbox drained by the connection's writer task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    outbox: mpsc::Sender<Arc<str>>,
}

impl ConnectionHandle {
    pub fn new(outbox: mpsc::Sender<Arc<str>>) -> Self {
        Self {
            id: ConnectionId::new(),
            outbox,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues a frame without waiting. Fails when the outbox is full or the
    /// writer has gone away.
    pub fn send(&self, frame: Arc<str>) -> Result<(), TrySendError<Arc<str>>> {
        self.outbox.try_send(frame)
    }
}
