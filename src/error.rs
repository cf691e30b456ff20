use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Poll {0} not found")]
    NotFound(i32),
    #[error("Database error: {0}")]
    Database(String),
}

/// Reasons an inbound socket action is abandoned. Never sent back to the client.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
    #[error("Payload has no poll id")]
    MissingPollId,
    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),
    #[error("Persistence call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Failed to encode outbound event: {0}")]
    Encode(serde_json::Error),
}

#[derive(Error, Debug)]
pub enum PollError {
    #[error("Invalid request")]
    InvalidRequest,
    #[error("Invalid id {0}")]
    InvalidId(String),
    #[error("Poll not found")]
    PollNotFound,
    #[error("Database error: {0}")]
    DatabaseError(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable {0}")]
    Missing(&'static str),
    #[error("Invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

impl IntoResponse for PollError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            PollError::InvalidRequest => (StatusCode::BAD_REQUEST, "Invalid request"),
            PollError::InvalidId(_) => (StatusCode::BAD_REQUEST, "Invalid id"),
            PollError::PollNotFound => (StatusCode::NOT_FOUND, "Poll not found"),
            PollError::DatabaseError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.as_str()),
        };

        let body = Json(json!({
            "error": error_message,
            "details": self.to_string()
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        StoreError::Database(error.to_string())
    }
}

impl From<StoreError> for PollError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(_) => PollError::PollNotFound,
            StoreError::Database(msg) => PollError::DatabaseError(msg),
        }
    }
}
