use crate::db::{NewPoll, NewResponse, PollId};
use crate::error::PollError;
use crate::startup::AppState;
use async_trait::async_trait;
use axum::{
    extract::{Extension, Form, FromRequest, Json, Path, Request},
    http::{
        StatusCode,
        header::{CONTENT_TYPE, LOCATION},
    },
    response::IntoResponse,
};
use serde::Deserialize;

/// `options` may arrive as a single string or a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OptionTexts {
    One(String),
    Many(Vec<String>),
}

impl OptionTexts {
    fn into_vec(self) -> Vec<String> {
        match self {
            OptionTexts::One(text) => vec![text],
            OptionTexts::Many(texts) => texts,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePollRequest {
    pub title: String,
    pub description: Option<String>,
    pub question: String,
    pub options: OptionTexts,
}

impl CreatePollRequest {
    /// Builds a request from url-encoded pairs, where `options` may repeat.
    fn from_fields(fields: Vec<(String, String)>) -> Self {
        let mut request = CreatePollRequest {
            title: String::new(),
            description: None,
            question: String::new(),
            options: OptionTexts::Many(Vec::new()),
        };
        let mut options = Vec::new();
        for (key, value) in fields {
            match key.as_str() {
                "title" => request.title = value,
                "description" if !value.trim().is_empty() => request.description = Some(value),
                "question" => request.question = value,
                "options" => options.push(value),
                _ => {}
            }
        }
        request.options = OptionTexts::Many(options);
        request
    }
}

/// Accepts a poll either as JSON or as a url-encoded form post.
#[async_trait]
impl<S> FromRequest<S> for CreatePollRequest
where
    S: Send + Sync,
{
    type Rejection = PollError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));

        if is_form {
            let Form(fields) = Form::<Vec<(String, String)>>::from_request(req, state)
                .await
                .map_err(|_| PollError::InvalidRequest)?;
            Ok(Self::from_fields(fields))
        } else {
            let Json(payload) = Json::<Self>::from_request(req, state)
                .await
                .map_err(|_| PollError::InvalidRequest)?;
            Ok(payload)
        }
    }
}

pub(crate) fn parse_id(raw: &str) -> Result<PollId, PollError> {
    raw.trim()
        .parse()
        .map_err(|_| PollError::InvalidId(raw.to_string()))
}

/// Create a poll with its options and redirect to it
pub async fn create_poll(
    Extension(app_state): Extension<AppState>,
    payload: CreatePollRequest,
) -> Result<impl IntoResponse, PollError> {
    let options: Vec<String> = payload
        .options
        .into_vec()
        .into_iter()
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect();

    if payload.title.trim().is_empty() || payload.question.trim().is_empty() || options.is_empty()
    {
        return Err(PollError::InvalidRequest);
    }

    let poll = NewPoll {
        title: payload.title,
        description: payload.description,
        question: payload.question,
    };
    let (created, _) = app_state.store.create_poll(&poll, &options).await?;

    Ok((
        StatusCode::FOUND,
        [(LOCATION, format!("/polls/{}", created.id))],
    ))
}

/// Get all polls
pub async fn list_polls(
    Extension(app_state): Extension<AppState>,
) -> Result<impl IntoResponse, PollError> {
    let polls = app_state.store.list_polls().await?;
    Ok((StatusCode::OK, Json(polls)))
}

/// Get a poll with per-option counts and percentages
pub async fn get_poll(
    Extension(app_state): Extension<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, PollError> {
    let id = parse_id(&id)?;
    let snapshot = app_state.store.get_poll_by_id(id).await?;
    Ok((StatusCode::OK, Json(snapshot)))
}

pub async fn cast_vote(
    Extension(app_state): Extension<AppState>,
    Json(payload): Json<NewResponse>,
) -> Result<impl IntoResponse, PollError> {
    let row = app_state.store.insert_response(&payload).await?;
    Ok((StatusCode::OK, Json(row)))
}
