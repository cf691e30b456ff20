use crate::db::connection::DbPool;
use crate::db::models::{Chat, NewChat, PollId};
use sqlx::Error;

pub async fn insert_chat(pool: &DbPool, chat: &NewChat) -> Result<Chat, Error> {
    let row = sqlx::query_as::<_, Chat>(
        r#"INSERT INTO chats (poll_id, "user", msg) VALUES ($1, $2, $3)
           RETURNING id, poll_id, "user", msg, created_at"#,
    )
    .bind(chat.poll_id)
    .bind(&chat.user)
    .bind(&chat.msg)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn get_chats(pool: &DbPool, poll_id: PollId) -> Result<Vec<Chat>, Error> {
    let rows = sqlx::query_as::<_, Chat>(
        r#"SELECT id, poll_id, "user", msg, created_at FROM chats WHERE poll_id = $1 ORDER BY id"#,
    )
    .bind(poll_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Deletes every chat message of a poll, returning the number of rows removed.
pub async fn delete_chats(pool: &DbPool, poll_id: PollId) -> Result<u64, Error> {
    let result = sqlx::query("DELETE FROM chats WHERE poll_id = $1")
        .bind(poll_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
