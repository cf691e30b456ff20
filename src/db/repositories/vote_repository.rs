use crate::db::connection::DbPool;
use crate::db::models::{NewResponse, Response};
use sqlx::Error;

pub async fn insert_response(pool: &DbPool, vote: &NewResponse) -> Result<Response, Error> {
    let row = sqlx::query_as::<_, Response>(
        "INSERT INTO responses (poll_id, option_id) VALUES ($1, $2) \
         RETURNING id, poll_id, option_id, created_at",
    )
    .bind(vote.poll_id)
    .bind(vote.option_id)
    .fetch_one(pool)
    .await?;

    Ok(row)
}
