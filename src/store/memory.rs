//! In-memory [`PollStore`] used by the broker and route tests.

use super::PollStore;
use crate::db::{
    Chat, NewChat, NewPoll, NewResponse, OptionCount, Poll, PollId, PollOption, PollSnapshot,
    Response,
};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::time::Duration;

#[derive(Default)]
struct Tables {
    polls: Vec<Poll>,
    options: Vec<PollOption>,
    responses: Vec<Response>,
    chats: Vec<Chat>,
    next_id: i32,
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_writes: Mutex<bool>,
    delay: Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail with a database error.
    pub fn fail_writes(&self) {
        *self.fail_writes.lock() = true;
    }

    /// Delays every call by `delay` before touching the tables.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Creates a poll with the given option texts and returns its id.
    pub fn seed_poll(&self, title: &str, options: &[&str]) -> PollId {
        let mut tables = self.tables.lock();
        let id = tables.next_id();
        tables.polls.push(Poll {
            id,
            title: title.to_string(),
            description: None,
            question: format!("{title}?"),
            created_at: Utc::now(),
        });
        for text in options {
            let option_id = tables.next_id();
            tables.options.push(PollOption {
                id: option_id,
                poll_id: Some(id),
                text: text.to_string(),
            });
        }
        id
    }

    pub fn option_ids(&self, poll_id: PollId) -> Vec<i32> {
        self.tables
            .lock()
            .options
            .iter()
            .filter(|o| o.poll_id == Some(poll_id))
            .map(|o| o.id)
            .collect()
    }

    pub fn response_count(&self) -> usize {
        self.tables.lock().responses.len()
    }

    pub fn chat_count(&self, poll_id: PollId) -> usize {
        self.tables
            .lock()
            .chats
            .iter()
            .filter(|c| c.poll_id == Some(poll_id))
            .count()
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if *self.fail_writes.lock() {
            return Err(StoreError::Database("writes disabled".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PollStore for MemoryStore {
    async fn insert_response(&self, vote: &NewResponse) -> Result<Response, StoreError> {
        self.pause().await;
        self.check_writable()?;
        let mut tables = self.tables.lock();
        let row = Response {
            id: tables.next_id(),
            poll_id: vote.poll_id,
            option_id: vote.option_id,
            created_at: Utc::now(),
        };
        tables.responses.push(row.clone());
        Ok(row)
    }

    async fn get_poll_by_id(&self, id: PollId) -> Result<PollSnapshot, StoreError> {
        self.pause().await;
        let tables = self.tables.lock();
        let poll = tables
            .polls
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or(StoreError::NotFound(id))?;

        let counts = tables
            .options
            .iter()
            .filter(|o| o.poll_id == Some(id))
            .map(|o| OptionCount {
                id: o.id,
                text: o.text.clone(),
                count: tables
                    .responses
                    .iter()
                    .filter(|r| r.option_id == Some(o.id))
                    .count() as i64,
            })
            .collect();

        Ok(PollSnapshot::tally(poll, counts))
    }

    async fn insert_chat(&self, chat: &NewChat) -> Result<Chat, StoreError> {
        self.pause().await;
        self.check_writable()?;
        let mut tables = self.tables.lock();
        let row = Chat {
            id: tables.next_id(),
            poll_id: Some(chat.poll_id),
            user: chat.user.clone(),
            msg: chat.msg.clone(),
            created_at: Utc::now(),
        };
        tables.chats.push(row.clone());
        Ok(row)
    }

    async fn delete_chat(&self, poll_id: PollId) -> Result<u64, StoreError> {
        self.pause().await;
        self.check_writable()?;
        let mut tables = self.tables.lock();
        let before = tables.chats.len();
        tables.chats.retain(|c| c.poll_id != Some(poll_id));
        Ok((before - tables.chats.len()) as u64)
    }

    async fn create_poll(
        &self,
        poll: &NewPoll,
        options: &[String],
    ) -> Result<(Poll, Vec<PollOption>), StoreError> {
        self.check_writable()?;
        let mut tables = self.tables.lock();
        let created = Poll {
            id: tables.next_id(),
            title: poll.title.clone(),
            description: poll.description.clone(),
            question: poll.question.clone(),
            created_at: Utc::now(),
        };
        tables.polls.push(created.clone());

        let mut inserted = Vec::new();
        for text in options {
            let option = PollOption {
                id: tables.next_id(),
                poll_id: Some(created.id),
                text: text.clone(),
            };
            tables.options.push(option.clone());
            inserted.push(option);
        }
        Ok((created, inserted))
    }

    async fn list_polls(&self) -> Result<Vec<Poll>, StoreError> {
        Ok(self.tables.lock().polls.clone())
    }

    async fn list_chats(&self, poll_id: PollId) -> Result<Vec<Chat>, StoreError> {
        Ok(self
            .tables
            .lock()
            .chats
            .iter()
            .filter(|c| c.poll_id == Some(poll_id))
            .cloned()
            .collect())
    }
}
