//! Persistence seam between the event broker / HTTP handlers and storage.

use crate::db::{
    Chat, NewChat, NewPoll, NewResponse, Poll, PollId, PollOption, PollSnapshot, Response,
};
use crate::error::StoreError;
use async_trait::async_trait;

#[cfg(test)]
pub mod memory;
mod pg;

pub use pg::PgStore;

#[async_trait]
pub trait PollStore: Send + Sync {
    async fn insert_response(&self, vote: &NewResponse) -> Result<Response, StoreError>;

    /// Fresh aggregate view of a poll. Fails with [`StoreError::NotFound`] for unknown ids.
    async fn get_poll_by_id(&self, id: PollId) -> Result<PollSnapshot, StoreError>;

    async fn insert_chat(&self, chat: &NewChat) -> Result<Chat, StoreError>;

    /// Removes all chat messages of a poll and returns how many were deleted.
    async fn delete_chat(&self, poll_id: PollId) -> Result<u64, StoreError>;

    async fn create_poll(
        &self,
        poll: &NewPoll,
        options: &[String],
    ) -> Result<(Poll, Vec<PollOption>), StoreError>;

    async fn list_polls(&self) -> Result<Vec<Poll>, StoreError>;

    async fn list_chats(&self, poll_id: PollId) -> Result<Vec<Chat>, StoreError>;
}
