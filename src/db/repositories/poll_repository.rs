use crate::db::connection::DbPool;
use crate::db::models::{NewPoll, OptionCount, Poll, PollId, PollOption};
use sqlx::Error;

pub async fn create_poll(
    pool: &DbPool,
    poll: &NewPoll,
    options: &[String],
) -> Result<(Poll, Vec<PollOption>), Error> {
    let mut tx = pool.begin().await?;

    let created = sqlx::query_as::<_, Poll>(
        "INSERT INTO polls (title, description, question) VALUES ($1, $2, $3) \
         RETURNING id, title, description, question, created_at",
    )
    .bind(&poll.title)
    .bind(poll.description.as_deref())
    .bind(&poll.question)
    .fetch_one(&mut *tx)
    .await?;

    let mut inserted = Vec::with_capacity(options.len());
    for text in options {
        let option = sqlx::query_as::<_, PollOption>(
            "INSERT INTO options (poll_id, text) VALUES ($1, $2) RETURNING id, poll_id, text",
        )
        .bind(created.id)
        .bind(text)
        .fetch_one(&mut *tx)
        .await?;
        inserted.push(option);
    }

    tx.commit().await?;
    Ok((created, inserted))
}

pub async fn get_poll(pool: &DbPool, poll_id: PollId) -> Result<Option<Poll>, Error> {
    let row = sqlx::query_as::<_, Poll>(
        "SELECT id, title, description, question, created_at FROM polls WHERE id = $1",
    )
    .bind(poll_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn get_all_polls(pool: &DbPool) -> Result<Vec<Poll>, Error> {
    let rows = sqlx::query_as::<_, Poll>(
        "SELECT id, title, description, question, created_at FROM polls ORDER BY created_at DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Vote counts for every option of a poll, ordered by option id.
pub async fn get_option_counts(pool: &DbPool, poll_id: PollId) -> Result<Vec<OptionCount>, Error> {
    let rows = sqlx::query_as::<_, OptionCount>(
        r#"
        SELECT o.id, o.text, COUNT(r.id) AS count
        FROM options o
        LEFT JOIN responses r ON r.option_id = o.id
        WHERE o.poll_id = $1
        GROUP BY o.id, o.text
        ORDER BY o.id
        "#,
    )
    .bind(poll_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
