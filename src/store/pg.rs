use super::PollStore;
use crate::db::{
    self, Chat, DbPool, NewChat, NewPoll, NewResponse, Poll, PollId, PollOption, PollSnapshot,
    Response,
};
use crate::error::StoreError;
use async_trait::async_trait;

/// [`PollStore`] backed by the Postgres pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PollStore for PgStore {
    async fn insert_response(&self, vote: &NewResponse) -> Result<Response, StoreError> {
        Ok(db::insert_response(&self.pool, vote).await?)
    }

    async fn get_poll_by_id(&self, id: PollId) -> Result<PollSnapshot, StoreError> {
        let poll = db::get_poll(&self.pool, id)
            .await?
            .ok_or(StoreError::NotFound(id))?;
        let counts = db::get_option_counts(&self.pool, id).await?;

        Ok(PollSnapshot::tally(poll, counts))
    }

    async fn insert_chat(&self, chat: &NewChat) -> Result<Chat, StoreError> {
        Ok(db::insert_chat(&self.pool, chat).await?)
    }

    async fn delete_chat(&self, poll_id: PollId) -> Result<u64, StoreError> {
        Ok(db::delete_chats(&self.pool, poll_id).await?)
    }

    async fn create_poll(
        &self,
        poll: &NewPoll,
        options: &[String],
    ) -> Result<(Poll, Vec<PollOption>), StoreError> {
        Ok(db::create_poll(&self.pool, poll, options).await?)
    }

    async fn list_polls(&self) -> Result<Vec<Poll>, StoreError> {
        Ok(db::get_all_polls(&self.pool).await?)
    }

    async fn list_chats(&self, poll_id: PollId) -> Result<Vec<Chat>, StoreError> {
        Ok(db::get_chats(&self.pool, poll_id).await?)
    }
}
