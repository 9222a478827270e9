use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime};
use tracing::{debug, info, warn};

use super::domain::{ApplicantId, Meeting, PostId};
use super::error::{InvalidInput, PipelineError};
use crate::remote::{PlacementGateway, ScheduleRequest};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Accepts RFC 3339 or a local `YYYY-MM-DD[T ]HH:MM[:SS]` value. Offsets keep the wall-clock time.
pub fn parse_datetime(raw: &str) -> Result<NaiveDateTime, InvalidInput> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.naive_local());
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| InvalidInput::DateTime {
            value: raw.to_string(),
        })
}

/// Wire form sent to the service: RFC 3339 input passes through, local input is normalised.
fn normalize_datetime(raw: &str) -> Result<String, InvalidInput> {
    let trimmed = raw.trim();
    if DateTime::parse_from_rfc3339(trimmed).is_ok() {
        return Ok(trimmed.to_string());
    }
    parse_datetime(trimmed).map(|parsed| parsed.format("%Y-%m-%dT%H:%M:%S").to_string())
}

/// Requests interviews for one post and keeps the meeting list as last fetched.
pub struct InterviewScheduler<G: ?Sized> {
    gateway: Arc<G>,
    post_id: PostId,
    meetings: Vec<Meeting>,
}

impl<G> InterviewScheduler<G>
where
    G: PlacementGateway + ?Sized,
{
    pub fn new(gateway: Arc<G>, post_id: PostId) -> Self {
        Self {
            gateway,
            post_id,
            meetings: Vec::new(),
        }
    }

    pub fn meetings(&self) -> &[Meeting] {
        &self.meetings
    }

    pub async fn schedule(
        &mut self,
        applicant_id: &ApplicantId,
        datetime: &str,
        note: Option<&str>,
    ) -> Result<Meeting, PipelineError> {
        let datetime_iso = normalize_datetime(datetime)?;
        let note = note
            .map(str::trim)
            .filter(|note| !note.is_empty())
            .map(str::to_string);

        let request = ScheduleRequest {
            applicant_id: applicant_id.clone(),
            datetime_iso: datetime_iso.clone(),
            note: note.clone(),
        };
        let response = self
            .gateway
            .schedule(&self.post_id, request)
            .await
            .inspect_err(|err| {
                warn!(
                    post_id = %self.post_id,
                    applicant_id = %applicant_id,
                    error = %err,
                    "interview scheduling failed"
                )
            })?;

        let meetings = self.gateway.meetings(&self.post_id).await?;
        let meeting = meetings
            .iter()
            .find(|meeting| match &response.meeting_id {
                Some(meeting_id) => &meeting.meeting_id == meeting_id,
                None => meeting.join_url == response.join_url,
            })
            .cloned()
            .unwrap_or_else(|| Meeting {
                meeting_id: response.meeting_id.clone().unwrap_or_default(),
                post_id: self.post_id.clone(),
                applicant_id: applicant_id.clone(),
                scheduled_for: datetime_iso,
                join_url: response.join_url.clone(),
                note,
            });
        self.meetings = meetings;

        info!(
            post_id = %self.post_id,
            applicant_id = %applicant_id,
            meeting_id = %meeting.meeting_id,
            "interview scheduled"
        );
        Ok(meeting)
    }

    /// Re-reads the full list; nothing is cached beyond the previous read.
    pub async fn list_meetings(&mut self) -> Result<&[Meeting], PipelineError> {
        self.meetings = self.gateway.meetings(&self.post_id).await?;
        debug!(post_id = %self.post_id, meetings = self.meetings.len(), "meetings refreshed");
        Ok(&self.meetings)
    }
}
