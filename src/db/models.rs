use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};

pub type PollId = i32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub id: PollId,
    pub title: String,
    pub description: Option<String>,
    pub question: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPoll {
    pub title: String,
    pub description: Option<String>,
    pub question: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PollOption {
    pub id: i32,
    pub poll_id: Option<PollId>,
    pub text: String,
}

/// A recorded vote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub id: i32,
    pub poll_id: Option<PollId>,
    pub option_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// Vote-insert request, as sent by clients over the socket or `POST /votes`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewResponse {
    pub poll_id: Option<PollId>,
    pub option_id: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: i32,
    pub poll_id: Option<PollId>,
    pub user: String,
    pub msg: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChat {
    pub poll_id: PollId,
    pub user: String,
    pub msg: String,
}

/// Per-option vote count as read from storage, before percentages are applied.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct OptionCount {
    pub id: i32,
    pub text: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionTally {
    pub id: i32,
    pub text: String,
    pub count: i64,
    pub percent: f64,
}

/// Aggregate view of a poll pushed to `vote` subscribers and served by `GET /polls/:id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollSnapshot {
    pub poll_id: PollId,
    pub title: String,
    pub description: Option<String>,
    pub question: String,
    pub created_at: DateTime<Utc>,
    pub options: Vec<OptionTally>,
    pub total_votes: i64,
}

impl PollSnapshot {
    /// Builds the snapshot, computing each option's share of the total.
    /// A poll without votes reports every percentage as zero.
    pub fn tally(poll: Poll, counts: Vec<OptionCount>) -> Self {
        let total_votes: i64 = counts.iter().map(|c| c.count).sum();

        let options = counts
            .into_iter()
            .map(|c| OptionTally {
                percent: if total_votes > 0 {
                    c.count as f64 * 100.0 / total_votes as f64
                } else {
                    0.0
                },
                id: c.id,
                text: c.text,
                count: c.count,
            })
            .collect();

        PollSnapshot {
            poll_id: poll.id,
            title: poll.title,
            description: poll.description,
            question: poll.question,
            created_at: poll.created_at,
            options,
            total_votes,
        }
    }
}
