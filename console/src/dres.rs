use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use shared::{
    AnswerSet, EvaluationInfo, LoginRequest, LoginResponse, SubmissionAnswer, SubmissionRequest,
    SubmissionResponse, SubmissionResult,
};
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum DresError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("URL parsing failed: {0}")]
    Url(#[from] url::ParseError),
    #[error("DRES returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("DRES rejected the request: {0}")]
    Rejected(String),
    #[error("No active evaluation")]
    NoActiveEvaluation,
}

/// The external evaluation service.
#[async_trait]
pub trait EvaluationService: Send + Sync {
    /// Returns the session id.
    async fn login(&self) -> Result<String, DresError>;

    async fn active_evaluation(&self, session_id: &str) -> Result<EvaluationInfo, DresError>;

    async fn submit(
        &self,
        session_id: &str,
        evaluation_id: &str,
        video_id: &str,
        timestamp_secs: f64,
    ) -> Result<SubmissionResult, DresError>;
}

#[derive(Clone)]
pub struct DresClient {
    http_client: HttpClient,
    base_url: Url,
    username: String,
    password: String,
}

impl DresClient {
    pub fn new(
        http_client: HttpClient,
        base_url: &str,
        username: String,
        password: String,
    ) -> Result<Self, DresError> {
        Ok(Self {
            http_client,
            base_url: Url::parse(base_url)?,
            username,
            password,
        })
    }

    fn endpoint(&self, segments: &[&str], session_id: Option<&str>) -> Result<Url, DresError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(["api", "v2"])
            .extend(segments);
        if let Some(session_id) = session_id {
            url.query_pairs_mut().append_pair("session", session_id);
        }
        Ok(url)
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, DresError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DresError::Status { status, body });
        }
        Ok(response.json().await?)
    }
}

/// Media time in milliseconds, as DRES expects.
pub fn to_millis(timestamp_secs: f64) -> u64 {
    (timestamp_secs.max(0.0) * 1000.0).round() as u64
}

/// Prefers an entry marked ACTIVE, falls back to the first one.
pub fn pick_active(evaluations: Vec<EvaluationInfo>) -> Option<EvaluationInfo> {
    let active = evaluations
        .iter()
        .position(|e| e.status.as_deref() == Some("ACTIVE"))
        .unwrap_or(0);
    evaluations.into_iter().nth(active)
}

#[async_trait]
impl EvaluationService for DresClient {
    async fn login(&self) -> Result<String, DresError> {
        let url = self.endpoint(&["login"], None)?;
        log::debug!("POST {}", url);

        let body = LoginRequest {
            username: self.username.clone(),
            password: self.password.clone(),
        };
        let response = self.http_client.post(url).json(&body).send().await?;
        let login: LoginResponse = Self::read_json(response).await?;

        login
            .session_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| DresError::Rejected("login returned no session id".into()))
    }

    async fn active_evaluation(&self, session_id: &str) -> Result<EvaluationInfo, DresError> {
        let url = self.endpoint(&["client", "evaluation", "list"], Some(session_id))?;
        log::debug!("GET {}", url);

        let response = self.http_client.get(url).send().await?;
        let evaluations: Vec<EvaluationInfo> = Self::read_json(response).await?;
        pick_active(evaluations).ok_or(DresError::NoActiveEvaluation)
    }

    async fn submit(
        &self,
        session_id: &str,
        evaluation_id: &str,
        video_id: &str,
        timestamp_secs: f64,
    ) -> Result<SubmissionResult, DresError> {
        let url = self.endpoint(&["submit", evaluation_id], Some(session_id))?;
        log::debug!("POST {}", url);

        let time = to_millis(timestamp_secs);
        let body = SubmissionRequest {
            answer_sets: vec![AnswerSet {
                answers: vec![SubmissionAnswer {
                    media_item_name: video_id.to_string(),
                    start: time,
                    end: time,
                }],
            }],
        };
        let response = self.http_client.post(url).json(&body).send().await?;
        let submission: SubmissionResponse = Self::read_json(response).await?;
        Ok(submission.into())
    }
}
