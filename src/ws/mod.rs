//! Real-time event broker served over WebSocket at `/ws`.
//!
//! Clients share one text stream for subscription control and event payloads:
//!
//! - `event:add:<kind>:<pollId>` / `event:rem:<kind>:<pollId>` manage interest
//!   in a `(kind, poll)` topic.
//! - `<kind>:<json>` carries a vote, chat or call action inbound, and the
//!   resulting event outbound to every connection subscribed to that topic.
//!
//! Delivery is fire-and-forget: events reach whoever is subscribed at
//! broadcast time and nothing is queued for clients that are not.

pub mod broker;
pub mod codec;
pub mod connection;
pub mod models;
pub mod session;
pub mod subscriptions;

pub use broker::Broker;
pub use session::{SessionSettings, ws_handler};
