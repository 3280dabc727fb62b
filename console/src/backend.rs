use async_trait::async_trait;
use reqwest::Client as HttpClient;
use shared::{Frame, FrameListResponse, SearchRequest};
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("URL parsing failed: {0}")]
    Url(#[from] url::ParseError),
    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// The remote frame retrieval service.
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Frame>, BackendError>;

    /// All frames of one video, in the backend's order.
    async fn explore(&self, video_id: &str) -> Result<Vec<Frame>, BackendError>;
}

#[derive(Clone)]
pub struct HttpRetrievalBackend {
    http_client: HttpClient,
    base_url: Url,
}

impl HttpRetrievalBackend {
    pub fn new(http_client: HttpClient, base_url: &str) -> Result<Self, BackendError> {
        Ok(Self {
            http_client,
            base_url: Url::parse(base_url)?,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn video_url(&self, video_id: &str) -> Result<Url, BackendError> {
        self.endpoint(&["video", video_id])
    }

    pub fn frame_image_url(&self, frame: &Frame) -> Result<Url, BackendError> {
        self.endpoint(&["video", &frame.video_id, "frame", frame.frame_number()])
    }

    async fn read_frames(response: reqwest::Response) -> Result<Vec<Frame>, BackendError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, body });
        }
        let payload: FrameListResponse = response.json().await?;
        Ok(payload.data)
    }
}

#[async_trait]
impl RetrievalBackend for HttpRetrievalBackend {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Frame>, BackendError> {
        let url = self.endpoint(&["search"])?;
        log::debug!("POST {}", url);
        let response = self.http_client.post(url).json(request).send().await?;
        Self::read_frames(response).await
    }

    async fn explore(&self, video_id: &str) -> Result<Vec<Frame>, BackendError> {
        let url = self.endpoint(&["explore", video_id])?;
        log::debug!("GET {}", url);
        let response = self.http_client.get(url).send().await?;
        Self::read_frames(response).await
    }
}
