//! Routes inbound socket frames and fans events out to subscribers.

use super::codec::{self, ControlOp, EventKind, Frame};
use super::connection::{ConnectionHandle, ConnectionId};
use super::models::{CallHeader, ChatAction, ChatBroadcast, ChatEvent, ChatRequest};
use super::subscriptions::{SubscriptionTable, Topic};
use crate::db::{NewChat, NewResponse, PollId};
use crate::error::{BrokerError, StoreError};
use crate::store::PollStore;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

pub struct Broker {
    subscriptions: SubscriptionTable,
    store: Arc<dyn PollStore>,
    persistence_timeout: Duration,
}

impl Broker {
    pub fn new(store: Arc<dyn PollStore>, persistence_timeout: Duration) -> Self {
        Self {
            subscriptions: SubscriptionTable::new(),
            store,
            persistence_timeout,
        }
    }

    #[cfg(test)]
    pub fn subscriptions(&self) -> &SubscriptionTable {
        &self.subscriptions
    }

    /// Applies one inbound frame from `connection`. Nothing is ever written back
    /// to the sender as a reply; failures are only logged.
    pub async fn handle_frame(&self, connection: &ConnectionHandle, raw: &str) {
        match codec::decode(raw) {
            Frame::Control {
                op: ControlOp::Add,
                kind,
                poll_id,
            } => {
                let added = self.subscriptions.add(connection, Topic::new(kind, poll_id));
                debug!(%kind, poll_id, added, "subscribe");
            }
            Frame::Control {
                op: ControlOp::Remove,
                kind,
                poll_id,
            } => {
                let removed = self
                    .subscriptions
                    .remove(connection.id(), Topic::new(kind, poll_id));
                debug!(%kind, poll_id, removed, "unsubscribe");
            }
            Frame::Invalid => debug!(len = raw.len(), "dropping malformed frame"),
            Frame::Unrecognized { name } => debug!(name, "ignoring unrecognized frame"),
            Frame::Event { kind, payload } => match self.dispatch(kind, payload).await {
                Ok(delivered) => debug!(%kind, delivered, "event handled"),
                Err(e) => warn!(%kind, error = %e, "dropping inbound event"),
            },
        }
    }

    async fn dispatch(&self, kind: EventKind, payload: &str) -> Result<usize, BrokerError> {
        match kind {
            EventKind::Vote => self.on_vote(payload).await,
            EventKind::Chat => self.on_chat(payload).await,
            EventKind::Call => self.on_call(payload),
        }
    }

    async fn on_vote(&self, payload: &str) -> Result<usize, BrokerError> {
        let vote: NewResponse = codec::decode_payload(payload)?;
        let poll_id = vote.poll_id.ok_or(BrokerError::MissingPollId)?;

        self.persist(self.store.insert_response(&vote)).await?;
        let snapshot = self.persist(self.store.get_poll_by_id(poll_id)).await?;

        self.broadcast(EventKind::Vote, poll_id, &snapshot)
    }

    async fn on_chat(&self, payload: &str) -> Result<usize, BrokerError> {
        let request: ChatRequest = codec::decode_payload(payload)?;
        let poll_id = request.poll_id;

        match request.action {
            ChatAction::Delete => {
                self.persist(self.store.delete_chat(poll_id)).await?;
                let event = ChatBroadcast {
                    poll_id,
                    event: ChatEvent::Deleted { who: &request.user },
                };
                self.broadcast(EventKind::Chat, poll_id, &event)
            }
            ChatAction::Post { msg } => {
                let chat = NewChat {
                    poll_id,
                    user: request.user,
                    msg,
                };
                let row = self.persist(self.store.insert_chat(&chat)).await?;
                let event = ChatBroadcast {
                    poll_id,
                    event: ChatEvent::Posted { data: &row },
                };
                self.broadcast(EventKind::Chat, poll_id, &event)
            }
        }
    }

    fn on_call(&self, payload: &str) -> Result<usize, BrokerError> {
        let header: CallHeader = codec::decode_payload(payload)?;
        debug!(
            poll_id = header.poll_id,
            signal = header.signal.as_deref().unwrap_or("-"),
            "relaying call signal"
        );

        let frame = codec::encode_raw(EventKind::Call, payload);
        Ok(self.deliver(Topic::new(EventKind::Call, header.poll_id), frame))
    }

    async fn persist<T, F>(&self, call: F) -> Result<T, BrokerError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.persistence_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(BrokerError::Timeout(self.persistence_timeout)),
        }
    }

    /// Encodes `payload` once and queues it for every current subscriber of
    /// `(kind, poll_id)`. Returns the number of connections it was queued for.
    pub fn broadcast<T: Serialize>(
        &self,
        kind: EventKind,
        poll_id: PollId,
        payload: &T,
    ) -> Result<usize, BrokerError> {
        let frame = codec::encode(kind, payload).map_err(BrokerError::Encode)?;
        Ok(self.deliver(Topic::new(kind, poll_id), frame))
    }

    fn deliver(&self, topic: Topic, frame: String) -> usize {
        let recipients = self.subscriptions.matching(topic);
        if recipients.is_empty() {
            return 0;
        }

        let frame: Arc<str> = Arc::from(frame);
        let mut delivered = 0;
        for recipient in &recipients {
            match recipient.send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(conn_id = %recipient.id(), kind = %topic.kind, "outbox full, dropping");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(conn_id = %recipient.id(), kind = %topic.kind, "recipient closed");
                }
            }
        }
        delivered
    }

    /// Drops every subscription of a closed connection.
    pub fn disconnect(&self, connection: ConnectionId) -> usize {
        self.subscriptions.remove_all(connection)
    }

    pub fn shutdown(&self) {
        if !self.subscriptions.is_empty() {
            info!(
                subscriptions = self.subscriptions.len(),
                "dropping remaining subscriptions"
            );
        }
        self.subscriptions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::PollSnapshot;
    use crate::store::memory::MemoryStore;
    use tokio::sync::mpsc;

    const TIMEOUT: Duration = Duration::from_secs(2);

    fn setup() -> (Arc<MemoryStore>, Broker) {
        let store = Arc::new(MemoryStore::new());
        let broker = Broker::new(store.clone(), TIMEOUT);
        (store, broker)
    }

    fn client() -> (ConnectionHandle, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(16);
        (ConnectionHandle::new(tx), rx)
    }

    async fn subscribe(broker: &Broker, conn: &ConnectionHandle, kind: EventKind, poll_id: PollId) {
        broker
            .handle_frame(conn, &codec::control(ControlOp::Add, kind, poll_id))
            .await;
    }

    fn drain(rx: &mut mpsc::Receiver<Arc<str>>) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame.to_string());
        }
        frames
    }

    fn vote_frame(poll_id: PollId, option_id: i32) -> String {
        format!(r#"vote:{{"pollId":{poll_id},"optionId":{option_id}}}"#)
    }

    #[tokio::test]
    async fn control_frames_update_subscriptions() {
        let (_store, broker) = setup();
        let (conn, _rx) = client();
        let topic = Topic::new(EventKind::Vote, 42);

        broker.handle_frame(&conn, "event:add:vote:42").await;
        broker.handle_frame(&conn, "event:add:vote:42").await;
        assert_eq!(broker.subscriptions().matching(topic).len(), 1);

        broker.handle_frame(&conn, "event:rem:vote:42").await;
        assert!(broker.subscriptions().matching(topic).is_empty());

        broker.handle_frame(&conn, "event:rem:vote:42").await;
        assert!(broker.subscriptions().is_empty());
    }

    #[tokio::test]
    async fn malformed_and_unknown_frames_are_ignored() {
        let (store, broker) = setup();
        let (conn, mut rx) = client();
        subscribe(&broker, &conn, EventKind::Vote, 1).await;

        for raw in ["garbage", "event:add:vote:x", "typing:{}", "vote:not json", "chat:{}"] {
            broker.handle_frame(&conn, raw).await;
        }

        assert_eq!(store.response_count(), 0);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(broker.subscriptions().len(), 1);
    }

    #[tokio::test]
    async fn vote_without_subscribers_persists_silently() {
        let (store, broker) = setup();
        let poll_id = store.seed_poll("Lunch", &["A", "B"]);
        let option = store.option_ids(poll_id)[0];
        let (sender, mut sender_rx) = client();

        broker.handle_frame(&sender, &vote_frame(poll_id, option)).await;

        assert_eq!(store.response_count(), 1);
        assert!(drain(&mut sender_rx).is_empty());
    }

    #[tokio::test]
    async fn vote_reaches_each_subscriber_once_with_identical_payload() {
        let (store, broker) = setup();
        let poll_id = store.seed_poll("Lunch", &["A", "B"]);
        let option = store.option_ids(poll_id)[1];
        let (a, mut a_rx) = client();
        let (b, mut b_rx) = client();
        let (sender, mut sender_rx) = client();
        subscribe(&broker, &a, EventKind::Vote, poll_id).await;
        subscribe(&broker, &b, EventKind::Vote, poll_id).await;

        broker.handle_frame(&sender, &vote_frame(poll_id, option)).await;

        let a_frames = drain(&mut a_rx);
        let b_frames = drain(&mut b_rx);
        assert_eq!(a_frames.len(), 1);
        assert_eq!(a_frames, b_frames);
        assert!(drain(&mut sender_rx).is_empty());

        let Frame::Event { kind, payload } = codec::decode(&a_frames[0]) else {
            panic!("expected an event frame");
        };
        assert_eq!(kind, EventKind::Vote);
        let snapshot: PollSnapshot = codec::decode_payload(payload).unwrap();
        assert_eq!(snapshot.poll_id, poll_id);
        assert_eq!(snapshot.total_votes, 1);
        assert_eq!(snapshot.options[1].percent, 100.0);
    }

    #[tokio::test]
    async fn vote_without_poll_id_is_dropped() {
        let (store, broker) = setup();
        let (conn, mut rx) = client();
        subscribe(&broker, &conn, EventKind::Vote, 1).await;

        broker.handle_frame(&conn, r#"vote:{"optionId":3}"#).await;

        assert_eq!(store.response_count(), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn vote_on_unknown_poll_does_not_broadcast() {
        let (_store, broker) = setup();
        let (conn, mut rx) = client();
        subscribe(&broker, &conn, EventKind::Vote, 77).await;

        broker.handle_frame(&conn, &vote_frame(77, 1)).await;

        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn persistence_failure_abandons_the_event() {
        let (store, broker) = setup();
        let poll_id = store.seed_poll("Lunch", &["A"]);
        let (conn, mut rx) = client();
        subscribe(&broker, &conn, EventKind::Chat, poll_id).await;
        store.fail_writes();

        broker
            .handle_frame(
                &conn,
                &format!(r#"chat:{{"pollId":{poll_id},"method":"post","user":"ana","msg":"hi"}}"#),
            )
            .await;

        assert!(drain(&mut rx).is_empty());
        assert_eq!(broker.subscriptions().len(), 1);
    }

    #[tokio::test]
    async fn slow_persistence_times_out() {
        let store = Arc::new(MemoryStore::new());
        let poll_id = store.seed_poll("Lunch", &["A"]);
        store.set_delay(Duration::from_secs(30));
        let broker = Broker::new(store.clone(), Duration::from_millis(20));
        let (conn, mut rx) = client();
        subscribe(&broker, &conn, EventKind::Vote, poll_id).await;

        let started = std::time::Instant::now();
        broker.handle_frame(&conn, &vote_frame(poll_id, 1)).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn chat_post_broadcasts_persisted_row() {
        let (store, broker) = setup();
        let poll_id = store.seed_poll("Lunch", &["A"]);
        let (conn, mut rx) = client();
        subscribe(&broker, &conn, EventKind::Chat, poll_id).await;

        broker
            .handle_frame(
                &conn,
                &format!(r#"chat:{{"pollId":{poll_id},"method":"post","user":"ana","msg":"hi"}}"#),
            )
            .await;

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        let payload: serde_json::Value =
            serde_json::from_str(frames[0].strip_prefix("chat:").unwrap()).unwrap();
        assert_eq!(payload["type"], "new:chat");
        assert_eq!(payload["pollId"], poll_id);
        assert_eq!(payload["data"]["user"], "ana");
        assert_eq!(payload["data"]["msg"], "hi");
        assert_eq!(store.chat_count(poll_id), 1);
    }

    #[tokio::test]
    async fn chat_delete_only_reaches_chat_subscribers() {
        let (store, broker) = setup();
        let poll_id = store.seed_poll("Lunch", &["A"]);
        let (chat, mut chat_rx) = client();
        let (vote, mut vote_rx) = client();
        let (call, mut call_rx) = client();
        let (other_poll, mut other_rx) = client();
        subscribe(&broker, &chat, EventKind::Chat, poll_id).await;
        subscribe(&broker, &vote, EventKind::Vote, poll_id).await;
        subscribe(&broker, &call, EventKind::Call, poll_id).await;
        subscribe(&broker, &other_poll, EventKind::Chat, poll_id + 100).await;

        broker
            .handle_frame(
                &vote,
                &format!(r#"chat:{{"pollId":{poll_id},"method":"delete","user":"ana"}}"#),
            )
            .await;

        let frames = drain(&mut chat_rx);
        assert_eq!(frames.len(), 1);
        let payload: serde_json::Value =
            serde_json::from_str(frames[0].strip_prefix("chat:").unwrap()).unwrap();
        assert_eq!(
            payload,
            serde_json::json!({"pollId": poll_id, "type": "del:chat", "who": "ana"})
        );
        assert!(drain(&mut vote_rx).is_empty());
        assert!(drain(&mut call_rx).is_empty());
        assert!(drain(&mut other_rx).is_empty());
    }

    #[tokio::test]
    async fn call_is_relayed_verbatim_to_peers_only() {
        let (_store, broker) = setup();
        let (caller, mut caller_rx) = client();
        let (callee, mut callee_rx) = client();
        subscribe(&broker, &callee, EventKind::Call, 5).await;

        let raw = r#"call:{"pollId":5,"type":"offer","offer":{"type":"offer","sdp":"v=0\r\n"}}"#;
        broker.handle_frame(&caller, raw).await;

        assert_eq!(drain(&mut callee_rx), vec![raw.to_string()]);
        assert!(drain(&mut caller_rx).is_empty());
    }

    #[tokio::test]
    async fn call_with_unlisted_type_is_still_relayed() {
        let (_store, broker) = setup();
        let (caller, _caller_rx) = client();
        let (callee, mut callee_rx) = client();
        subscribe(&broker, &callee, EventKind::Call, 5).await;

        let hangup = r#"call:{"pollId":5,"type":"hangup"}"#;
        let untyped = r#"call:{"pollId":5,"muted":true}"#;
        let offer = r#"call:{"pollId":5,"type":"offer"}"#;
        for raw in [hangup, untyped, offer] {
            broker.handle_frame(&caller, raw).await;
        }

        assert_eq!(
            drain(&mut callee_rx),
            vec![hangup.to_string(), untyped.to_string(), offer.to_string()]
        );
    }

    #[tokio::test]
    async fn call_without_poll_id_is_dropped() {
        let (_store, broker) = setup();
        let (caller, _caller_rx) = client();
        let (callee, mut callee_rx) = client();
        subscribe(&broker, &callee, EventKind::Call, 5).await;

        broker.handle_frame(&caller, r#"call:{"type":"offer"}"#).await;
        broker.handle_frame(&caller, "call:not json").await;

        assert!(drain(&mut callee_rx).is_empty());
    }

    #[tokio::test]
    async fn call_echoes_to_sender_when_subscribed() {
        let (_store, broker) = setup();
        let (caller, mut caller_rx) = client();
        let (callee, mut callee_rx) = client();
        subscribe(&broker, &caller, EventKind::Call, 5).await;
        subscribe(&broker, &callee, EventKind::Call, 5).await;

        let raw = r#"call:{"pollId":5,"type":"ice:offer","candidate":{"candidate":""}}"#;
        broker.handle_frame(&caller, raw).await;

        assert_eq!(drain(&mut caller_rx).len(), 1);
        assert_eq!(drain(&mut callee_rx).len(), 1);
    }

    #[tokio::test]
    async fn closed_recipient_does_not_block_the_rest() {
        let (_store, broker) = setup();
        let (gone, gone_rx) = client();
        let (alive, mut alive_rx) = client();
        subscribe(&broker, &gone, EventKind::Call, 5).await;
        subscribe(&broker, &alive, EventKind::Call, 5).await;
        drop(gone_rx);

        let delivered = broker
            .broadcast(EventKind::Call, 5, &serde_json::json!({"pollId": 5, "type": "answer"}))
            .unwrap();

        assert_eq!(delivered, 1);
        assert_eq!(drain(&mut alive_rx).len(), 1);
    }

    #[tokio::test]
    async fn disconnect_stops_delivery() {
        let (store, broker) = setup();
        let poll_id = store.seed_poll("Lunch", &["A"]);
        let (conn, mut rx) = client();
        subscribe(&broker, &conn, EventKind::Vote, poll_id).await;
        subscribe(&broker, &conn, EventKind::Chat, poll_id).await;

        assert_eq!(broker.disconnect(conn.id()), 2);
        assert_eq!(broker.disconnect(conn.id()), 0);

        broker.handle_frame(&conn, &vote_frame(poll_id, 1)).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn broadcast_uses_table_as_it_is_when_persistence_finishes() {
        let store = Arc::new(MemoryStore::new());
        let poll_id = store.seed_poll("Lunch", &["A"]);
        let option = store.option_ids(poll_id)[0];
        store.set_delay(Duration::from_millis(200));
        let broker = Arc::new(Broker::new(store.clone(), TIMEOUT));
        let (sender, mut sender_rx) = client();
        let (stayer, mut stayer_rx) = client();
        subscribe(&broker, &sender, EventKind::Vote, poll_id).await;
        subscribe(&broker, &stayer, EventKind::Vote, poll_id).await;

        let in_flight = tokio::spawn({
            let broker = broker.clone();
            let sender = sender.clone();
            async move { broker.handle_frame(&sender, &vote_frame(poll_id, option)).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(broker.disconnect(sender.id()), 1);
        in_flight.await.unwrap();

        assert_eq!(store.response_count(), 1);
        assert!(drain(&mut sender_rx).is_empty());
        assert_eq!(drain(&mut stayer_rx).len(), 1);
    }

    #[tokio::test]
    async fn shutdown_clears_subscriptions() {
        let (_store, broker) = setup();
        let (conn, _rx) = client();
        subscribe(&broker, &conn, EventKind::Vote, 1).await;
        subscribe(&broker, &conn, EventKind::Call, 1).await;

        broker.shutdown();
        assert!(broker.subscriptions().is_empty());
    }
}
