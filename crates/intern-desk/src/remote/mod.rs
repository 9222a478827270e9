//! Boundary to the remote placement service.
//!
//! Scoring, message composition and persistence all live behind this trait; the pipeline only
//! decides which calls to make and in which order.

mod http;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::pipeline::domain::{
    Applicant, ApplicantId, CandidateRecord, Meeting, OutboundMessage, Post, PostId,
    RankedApplicant, SelectionPolicy,
};

pub use http::HttpPlacementGateway;

/// Error enumeration for calls against the placement service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("request rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("unable to decode response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRequest {
    pub mode: SelectionPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResponse {
    #[serde(default)]
    pub ranked: bool,
    #[serde(default)]
    pub matched_top: Vec<RankedApplicant>,
}

/// Body for select/reject. `expected_version` is the optimistic concurrency token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub applicant_id: ApplicantId,
    pub expected_version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub candidate: Applicant,
    #[serde(default)]
    pub email: Option<OutboundMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoSelectResponse {
    #[serde(default)]
    pub selected_count: usize,
    #[serde(default)]
    pub selected_candidates: Vec<CandidateRecord>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieBreakRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_link: Option<String>,
    pub applicant_ids: Vec<ApplicantId>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieBreakResponse {
    #[serde(default)]
    pub created: usize,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub links: BTreeMap<ApplicantId, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieBreakSendRequest {
    pub links: BTreeMap<ApplicantId, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieBreakSendResponse {
    pub sent_count: usize,
    #[serde(default)]
    pub emails: Vec<OutboundMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopEmailsResponse {
    #[serde(default)]
    pub sent_count: Option<usize>,
    #[serde(default)]
    pub emails: Vec<OutboundMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub applicant_id: ApplicantId,
    pub datetime_iso: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleResponse {
    pub join_url: String,
    #[serde(default)]
    pub meeting_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentAnalytics {
    #[serde(default)]
    pub active_internships: usize,
    #[serde(default)]
    pub past_internships: usize,
    #[serde(default)]
    pub selected_candidates: usize,
    #[serde(default)]
    pub rejected_candidates: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentNotice {
    pub id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub post: Post,
}

/// Wire form of a notification method: `?method=positions|top_percent&value=N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationQuery {
    pub method: &'static str,
    pub value: u32,
}

/// Remote collaborator contract. Every call carries the operator's bearer credential.
#[async_trait]
pub trait PlacementGateway: Send + Sync {
    async fn list_posts(&self, department_id: &str) -> Result<Vec<Post>, GatewayError>;
    async fn past_posts(&self, department_id: &str) -> Result<Vec<Post>, GatewayError>;
    async fn restore_post(
        &self,
        department_id: &str,
        post_id: &PostId,
    ) -> Result<RestoreResponse, GatewayError>;
    async fn fetch_post(&self, post_id: &PostId) -> Result<Post, GatewayError>;
    async fn fetch_roster(
        &self,
        department_id: &str,
        post_id: &PostId,
    ) -> Result<Vec<Applicant>, GatewayError>;

    async fn run_match(
        &self,
        post_id: &PostId,
        request: MatchRequest,
    ) -> Result<MatchResponse, GatewayError>;

    async fn select(
        &self,
        post_id: &PostId,
        request: TransitionRequest,
    ) -> Result<TransitionResponse, GatewayError>;
    async fn reject(
        &self,
        post_id: &PostId,
        request: TransitionRequest,
    ) -> Result<TransitionResponse, GatewayError>;
    async fn auto_select(&self, post_id: &PostId) -> Result<AutoSelectResponse, GatewayError>;

    async fn create_tie_break(
        &self,
        post_id: &PostId,
        request: TieBreakRequest,
    ) -> Result<TieBreakResponse, GatewayError>;
    async fn send_tie_break(
        &self,
        post_id: &PostId,
        request: TieBreakSendRequest,
    ) -> Result<TieBreakSendResponse, GatewayError>;
    async fn send_top_emails(
        &self,
        post_id: &PostId,
        query: NotificationQuery,
    ) -> Result<TopEmailsResponse, GatewayError>;

    async fn schedule(
        &self,
        post_id: &PostId,
        request: ScheduleRequest,
    ) -> Result<ScheduleResponse, GatewayError>;
    async fn meetings(&self, post_id: &PostId) -> Result<Vec<Meeting>, GatewayError>;

    async fn selected(&self, department_id: &str) -> Result<Vec<CandidateRecord>, GatewayError>;
    async fn rejected(&self, department_id: &str) -> Result<Vec<CandidateRecord>, GatewayError>;
    async fn export_selected(&self, department_id: &str) -> Result<Vec<u8>, GatewayError>;
    async fn analytics(&self, department_id: &str) -> Result<DepartmentAnalytics, GatewayError>;
    async fn notifications(
        &self,
        department_id: &str,
    ) -> Result<Vec<DepartmentNotice>, GatewayError>;
}
