use std::fmt;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::{
    AutoSelectResponse, DepartmentAnalytics, DepartmentNotice, GatewayError, MatchRequest,
    MatchResponse, NotificationQuery, PlacementGateway, RestoreResponse, ScheduleRequest,
    ScheduleResponse, TieBreakRequest, TieBreakResponse, TieBreakSendRequest,
    TieBreakSendResponse, TopEmailsResponse, TransitionRequest, TransitionResponse,
};
use crate::config::RemoteConfig;
use crate::pipeline::domain::{Applicant, CandidateRecord, Meeting, Post, PostId};
use crate::session::Session;

/// `reqwest`-backed gateway speaking the placement service's REST contract.
#[derive(Clone)]
pub struct HttpPlacementGateway {
    base_url: String,
    session: Session,
    client: reqwest::Client,
}

impl fmt::Debug for HttpPlacementGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpPlacementGateway")
            .field("base_url", &self.base_url)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl HttpPlacementGateway {
    pub fn new(config: &RemoteConfig, session: Session) -> Result<Self, GatewayError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| GatewayError::Transport(err.to_string()))?;

        Ok(Self::with_client(config.base_url.clone(), session, client))
    }

    pub fn with_client(
        base_url: impl Into<String>,
        session: Session,
        client: reqwest::Client,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            session,
            client,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Appends `segments` to the base path, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = Url::parse(&self.base_url).map_err(|err| {
            GatewayError::Transport(format!("invalid base url {}: {err}", self.base_url))
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                GatewayError::Transport(format!("base url {} cannot take a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn get(&self, segments: &[&str]) -> Result<RequestBuilder, GatewayError> {
        Ok(self
            .client
            .get(self.url(segments)?)
            .bearer_auth(self.session.bearer_token()))
    }

    fn post(&self, segments: &[&str]) -> Result<RequestBuilder, GatewayError> {
        Ok(self
            .client
            .post(self.url(segments)?)
            .bearer_auth(self.session.bearer_token()))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, GatewayError> {
        let response = request
            .send()
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))?;

        let status = response.status();
        debug!(status = status.as_u16(), url = %response.url(), "placement service responded");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &body))
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|err| GatewayError::Decode(err.to_string()))
    }
}

/// Maps a non-2xx response onto the gateway taxonomy, keeping the service's detail verbatim.
pub(crate) fn classify_failure(status: StatusCode, body: &str) -> GatewayError {
    let detail = extract_detail(body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string()
    });

    match status {
        StatusCode::NOT_FOUND => GatewayError::NotFound(detail),
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => GatewayError::Conflict(detail),
        StatusCode::BAD_REQUEST if detail.to_ascii_lowercase().contains("already") => {
            GatewayError::Conflict(detail)
        }
        other => GatewayError::Rejected {
            status: other.as_u16(),
            detail,
        },
    }
}

fn extract_detail(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => match map.get("detail").or_else(|| map.get("error")) {
            Some(Value::String(detail)) => Some(detail.clone()),
            Some(other) => Some(other.to_string()),
            None => Some(trimmed.to_string()),
        },
        _ => Some(trimmed.to_string()),
    }
}

#[async_trait]
impl PlacementGateway for HttpPlacementGateway {
    async fn list_posts(&self, department_id: &str) -> Result<Vec<Post>, GatewayError> {
        self.json(self.get(&["departments", department_id, "posts"])?)
            .await
    }

    async fn past_posts(&self, department_id: &str) -> Result<Vec<Post>, GatewayError> {
        self.json(self.get(&["departments", department_id, "past"])?)
            .await
    }

    async fn restore_post(
        &self,
        department_id: &str,
        post_id: &PostId,
    ) -> Result<RestoreResponse, GatewayError> {
        let post_id = post_id.0.as_str();
        self.json(self.post(&["departments", department_id, "past", post_id, "restore"])?)
            .await
    }

    async fn fetch_post(&self, post_id: &PostId) -> Result<Post, GatewayError> {
        self.json(self.get(&["posts", post_id.0.as_str()])?).await
    }

    async fn fetch_roster(
        &self,
        department_id: &str,
        post_id: &PostId,
    ) -> Result<Vec<Applicant>, GatewayError> {
        let post_id = post_id.0.as_str();
        self.json(self.get(&["departments", department_id, "posts", post_id, "applicants"])?)
            .await
    }

    async fn run_match(
        &self,
        post_id: &PostId,
        request: MatchRequest,
    ) -> Result<MatchResponse, GatewayError> {
        self.json(self.post(&["posts", post_id.0.as_str(), "match"])?.json(&request))
            .await
    }

    async fn select(
        &self,
        post_id: &PostId,
        request: TransitionRequest,
    ) -> Result<TransitionResponse, GatewayError> {
        self.json(self.post(&["posts", post_id.0.as_str(), "select"])?.json(&request))
            .await
    }

    async fn reject(
        &self,
        post_id: &PostId,
        request: TransitionRequest,
    ) -> Result<TransitionResponse, GatewayError> {
        self.json(self.post(&["posts", post_id.0.as_str(), "reject"])?.json(&request))
            .await
    }

    async fn auto_select(&self, post_id: &PostId) -> Result<AutoSelectResponse, GatewayError> {
        self.json(self.post(&["posts", post_id.0.as_str(), "auto_select"])?)
            .await
    }

    async fn create_tie_break(
        &self,
        post_id: &PostId,
        request: TieBreakRequest,
    ) -> Result<TieBreakResponse, GatewayError> {
        self.json(self.post(&["posts", post_id.0.as_str(), "tiebreak"])?.json(&request))
            .await
    }

    async fn send_tie_break(
        &self,
        post_id: &PostId,
        request: TieBreakSendRequest,
    ) -> Result<TieBreakSendResponse, GatewayError> {
        self.json(
            self.post(&["posts", post_id.0.as_str(), "tiebreak", "send"])?
                .json(&request),
        )
        .await
    }

    async fn send_top_emails(
        &self,
        post_id: &PostId,
        query: NotificationQuery,
    ) -> Result<TopEmailsResponse, GatewayError> {
        let value = query.value.to_string();
        self.json(
            self.post(&["posts", post_id.0.as_str(), "send_top_emails"])?
                .query(&[("method", query.method), ("value", value.as_str())]),
        )
        .await
    }

    async fn schedule(
        &self,
        post_id: &PostId,
        request: ScheduleRequest,
    ) -> Result<ScheduleResponse, GatewayError> {
        self.json(self.post(&["posts", post_id.0.as_str(), "schedule"])?.json(&request))
            .await
    }

    async fn meetings(&self, post_id: &PostId) -> Result<Vec<Meeting>, GatewayError> {
        self.json(self.get(&["posts", post_id.0.as_str(), "meetings"])?)
            .await
    }

    async fn selected(&self, department_id: &str) -> Result<Vec<CandidateRecord>, GatewayError> {
        self.json(self.get(&["departments", department_id, "selected"])?)
            .await
    }

    async fn rejected(&self, department_id: &str) -> Result<Vec<CandidateRecord>, GatewayError> {
        self.json(self.get(&["departments", department_id, "rejected"])?)
            .await
    }

    async fn export_selected(&self, department_id: &str) -> Result<Vec<u8>, GatewayError> {
        let response = self
            .send(self.get(&["departments", department_id, "selected", "export"])?)
            .await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn analytics(&self, department_id: &str) -> Result<DepartmentAnalytics, GatewayError> {
        self.json(self.get(&["departments", department_id, "analytics"])?)
            .await
    }

    async fn notifications(
        &self,
        department_id: &str,
    ) -> Result<Vec<DepartmentNotice>, GatewayError> {
        self.json(self.get(&["departments", department_id, "notifications"])?)
            .await
    }
}
