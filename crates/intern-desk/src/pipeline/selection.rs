use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::controller::PipelineState;
use super::domain::{Applicant, ApplicantId, ApplicantStatus, OutboundMessage, Post, PostId};
use super::error::PipelineError;
use crate::remote::{AutoSelectResponse, PlacementGateway, TransitionRequest};
use crate::session::Session;

/// Post record and roster as last reported by the placement service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RosterSnapshot {
    pub post: Post,
    pub roster: Vec<Applicant>,
}

impl RosterSnapshot {
    pub fn applicant(&self, applicant_id: &ApplicantId) -> Option<&Applicant> {
        self.roster
            .iter()
            .find(|applicant| &applicant.id == applicant_id)
    }

    pub fn with_status(&self, status: ApplicantStatus) -> impl Iterator<Item = &Applicant> {
        self.roster
            .iter()
            .filter(move |applicant| applicant.status == status)
    }
}

/// Result of a successful select or reject, read back from the refreshed roster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionOutcome {
    pub applicant: Applicant,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<OutboundMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Select,
    Reject,
}

impl Transition {
    fn label(self) -> &'static str {
        match self {
            Transition::Select => "select",
            Transition::Reject => "reject",
        }
    }
}

/// Source of truth for applicant status within one post view.
///
/// The local roster is a cache: every successful transition is followed by a full reload of
/// the roster and post, so server-side effects such as post closure are never patched in by hand.
pub struct SelectionStateTracker<G: ?Sized> {
    session: Session,
    gateway: Arc<G>,
    post_id: PostId,
    snapshot: Option<RosterSnapshot>,
}

impl<G> SelectionStateTracker<G>
where
    G: PlacementGateway + ?Sized,
{
    pub fn new(session: Session, gateway: Arc<G>, post_id: PostId) -> Self {
        Self {
            session,
            gateway,
            post_id,
            snapshot: None,
        }
    }

    pub fn post_id(&self) -> &PostId {
        &self.post_id
    }

    pub fn snapshot(&self) -> Option<&RosterSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn post(&self) -> Option<&Post> {
        self.snapshot.as_ref().map(|snapshot| &snapshot.post)
    }

    pub fn roster(&self) -> &[Applicant] {
        self.snapshot
            .as_ref()
            .map(|snapshot| snapshot.roster.as_slice())
            .unwrap_or_default()
    }

    /// Replaces the cached post and roster wholesale.
    pub async fn load(&mut self) -> Result<&RosterSnapshot, PipelineError> {
        let snapshot = self.fetch_snapshot().await?;
        Ok(self.snapshot.insert(snapshot))
    }

    pub async fn select(
        &mut self,
        applicant_id: &ApplicantId,
    ) -> Result<TransitionOutcome, PipelineError> {
        self.transition(applicant_id, Transition::Select).await
    }

    pub async fn reject(
        &mut self,
        applicant_id: &ApplicantId,
    ) -> Result<TransitionOutcome, PipelineError> {
        self.transition(applicant_id, Transition::Reject).await
    }

    /// Lets the service fill open positions from the top of its ranking, then reloads.
    pub async fn auto_select(&mut self) -> Result<AutoSelectResponse, PipelineError> {
        if self.snapshot.is_none() {
            return Err(PipelineError::OutOfSequence {
                action: "auto-select",
                state: PipelineState::Idle,
            });
        }

        let response = self
            .gateway
            .auto_select(&self.post_id)
            .await
            .inspect_err(|err| warn!(post_id = %self.post_id, error = %err, "auto-select failed"))?;

        self.snapshot = Some(self.fetch_snapshot().await?);
        info!(
            post_id = %self.post_id,
            selected = response.selected_count,
            "auto-select completed"
        );
        Ok(response)
    }

    async fn transition(
        &mut self,
        applicant_id: &ApplicantId,
        transition: Transition,
    ) -> Result<TransitionOutcome, PipelineError> {
        let snapshot = self
            .snapshot
            .as_ref()
            .ok_or(PipelineError::OutOfSequence {
                action: transition.label(),
                state: PipelineState::Idle,
            })?;

        let current = snapshot.applicant(applicant_id).ok_or_else(|| {
            PipelineError::NotFound(format!(
                "applicant {applicant_id} is not on the roster for post {}",
                self.post_id
            ))
        })?;

        if current.status.is_terminal() {
            return Err(PipelineError::already_resolved(applicant_id, current.status));
        }

        let request = TransitionRequest {
            applicant_id: applicant_id.clone(),
            expected_version: current.version,
        };

        let call = match transition {
            Transition::Select => self.gateway.select(&self.post_id, request).await,
            Transition::Reject => self.gateway.reject(&self.post_id, request).await,
        };
        let response = call.map_err(|err| {
            warn!(
                post_id = %self.post_id,
                applicant_id = %applicant_id,
                action = transition.label(),
                error = %err,
                "status transition refused"
            );
            PipelineError::from(err)
        })?;

        let refreshed = self.fetch_snapshot().await?;
        let applicant = refreshed
            .applicant(applicant_id)
            .cloned()
            .unwrap_or_else(|| response.candidate.clone());
        self.snapshot = Some(refreshed);

        info!(
            post_id = %self.post_id,
            applicant_id = %applicant_id,
            status = %applicant.status,
            "applicant resolved"
        );

        Ok(TransitionOutcome {
            applicant,
            notice: response.email,
            message: response.message,
        })
    }

    async fn fetch_snapshot(&self) -> Result<RosterSnapshot, PipelineError> {
        let post = self.gateway.fetch_post(&self.post_id).await?;
        let roster = self
            .gateway
            .fetch_roster(self.session.department_id(), &self.post_id)
            .await?;
        Ok(RosterSnapshot { post, roster })
    }
}
