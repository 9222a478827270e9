use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::domain::{Applicant, ApplicantId, MatchResult, Meeting, Post, PostId, SelectionPolicy};
use super::error::PipelineError;
use super::interview::InterviewScheduler;
use super::notification::{
    DeliveryReport, MessageTemplate, NotificationDispatcher, NotificationMethod, PreviewBundle,
};
use super::projector::{self, Shortlist};
use super::selection::{SelectionStateTracker, TransitionOutcome};
use super::tiebreak::{TieBreakCoordinator, TieBreakRound};
use crate::remote::{AutoSelectResponse, MatchRequest, PlacementGateway};
use crate::session::Session;

/// Screen-level workflow position. Only applicant status is ever terminal, never the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Loaded,
    Matched,
    Shortlisted,
    TieBreakPending,
    Notified,
    Resolved,
}

impl PipelineState {
    pub const fn label(self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Loaded => "loaded",
            PipelineState::Matched => "matched",
            PipelineState::Shortlisted => "shortlisted",
            PipelineState::TieBreakPending => "tie_break_pending",
            PipelineState::Notified => "notified",
            PipelineState::Resolved => "resolved",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Read-only view of the controller for rendering or serialisation.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSnapshot {
    pub post_id: PostId,
    pub state: PipelineState,
    pub policy: SelectionPolicy,
    pub post: Option<Post>,
    pub roster: Vec<Applicant>,
    pub shortlist: Option<Shortlist>,
    pub tie_break: Option<TieBreakRound>,
    pub meetings: Vec<Meeting>,
}

/// Drives load, match, shortlist, tie-break, notify, resolve and schedule for one post.
pub struct PipelineController<G: ?Sized> {
    session: Session,
    gateway: Arc<G>,
    post_id: PostId,
    state: PipelineState,
    policy: SelectionPolicy,
    match_result: Option<MatchResult>,
    shortlist: Option<Shortlist>,
    tracker: SelectionStateTracker<G>,
    tie_break: TieBreakCoordinator<G>,
    dispatcher: NotificationDispatcher<G>,
    scheduler: InterviewScheduler<G>,
}

impl<G> PipelineController<G>
where
    G: PlacementGateway + ?Sized,
{
    pub fn new(session: Session, gateway: Arc<G>, post_id: PostId) -> Self {
        Self {
            tracker: SelectionStateTracker::new(session.clone(), gateway.clone(), post_id.clone()),
            tie_break: TieBreakCoordinator::new(gateway.clone(), post_id.clone()),
            dispatcher: NotificationDispatcher::new(gateway.clone(), post_id.clone()),
            scheduler: InterviewScheduler::new(gateway.clone(), post_id.clone()),
            session,
            gateway,
            post_id,
            state: PipelineState::Idle,
            policy: SelectionPolicy::default(),
            match_result: None,
            shortlist: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn post_id(&self) -> &PostId {
        &self.post_id
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    pub fn post(&self) -> Option<&Post> {
        self.tracker.post()
    }

    pub fn roster(&self) -> &[Applicant] {
        self.tracker.roster()
    }

    pub fn match_result(&self) -> Option<&MatchResult> {
        self.match_result.as_ref()
    }

    pub fn shortlist(&self) -> Option<&Shortlist> {
        self.shortlist.as_ref()
    }

    pub fn tie_break(&self) -> Option<&TieBreakRound> {
        self.tie_break.round()
    }

    pub fn meetings(&self) -> &[Meeting] {
        self.scheduler.meetings()
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            post_id: self.post_id.clone(),
            state: self.state,
            policy: self.policy,
            post: self.post().cloned(),
            roster: self.roster().to_vec(),
            shortlist: self.shortlist.clone(),
            tie_break: self.tie_break.round().cloned(),
            meetings: self.meetings().to_vec(),
        }
    }

    /// Fetches the post and roster. Later states are kept on reload.
    pub async fn load(&mut self) -> Result<&Post, PipelineError> {
        self.tracker.load().await?;
        if self.state == PipelineState::Idle {
            self.state = PipelineState::Loaded;
        }
        self.sync_statuses();
        self.reproject();
        info!(post_id = %self.post_id, applicants = self.roster().len(), "pipeline loaded");
        self.tracker.post().ok_or(PipelineError::OutOfSequence {
            action: "load",
            state: self.state,
        })
    }

    /// Runs a fresh remote match and projects it. Prior shortlist and tie-break links are discarded.
    pub async fn run_match(
        &mut self,
        policy: Option<SelectionPolicy>,
    ) -> Result<&Shortlist, PipelineError> {
        self.require_loaded("run a match")?;
        let policy = policy.unwrap_or(self.policy);

        let response = self
            .gateway
            .run_match(&self.post_id, MatchRequest { mode: policy })
            .await
            .inspect_err(|err| warn!(post_id = %self.post_id, error = %err, "match run failed"))?;

        self.policy = policy;
        self.tie_break.discard();
        self.match_result = Some(MatchResult {
            policy,
            ranked: response.matched_top,
        });
        self.state = PipelineState::Matched;
        self.reproject();
        self.state = PipelineState::Shortlisted;

        let shortlist = self.shortlist.as_ref().ok_or(PipelineError::OutOfSequence {
            action: "project a shortlist",
            state: self.state,
        })?;
        info!(
            post_id = %self.post_id,
            policy = %policy,
            ranked = shortlist.ranked().len(),
            shortlisted = shortlist.len(),
            "match projected"
        );
        Ok(shortlist)
    }

    /// Re-projects the current match under a new policy. Tie-break links do not survive.
    pub fn set_policy(&mut self, policy: SelectionPolicy) -> Option<&Shortlist> {
        self.policy = policy;
        if self.match_result.is_some() {
            self.tie_break.discard();
            self.reproject();
            self.state = PipelineState::Shortlisted;
        }
        debug!(post_id = %self.post_id, policy = %policy, "selection policy changed");
        self.shortlist.as_ref()
    }

    pub async fn create_tie_break(
        &mut self,
        custom_link: Option<&str>,
    ) -> Result<&TieBreakRound, PipelineError> {
        let shortlist = self.shortlist.as_ref().ok_or(PipelineError::OutOfSequence {
            action: "create a tie-break",
            state: self.state,
        })?;

        self.tie_break.create_tie_break(shortlist, custom_link).await?;
        self.state = PipelineState::TieBreakPending;
        self.tie_break.round().ok_or(PipelineError::EmptyTieBreak)
    }

    pub async fn send_tie_break_emails(&mut self) -> Result<DeliveryReport, PipelineError> {
        let report = self
            .tie_break
            .send_tie_break_emails(&self.dispatcher)
            .await?;
        self.state = PipelineState::Notified;
        Ok(report)
    }

    pub fn notification_method(&self) -> Result<NotificationMethod, PipelineError> {
        let post = self.tracker.post().ok_or(PipelineError::OutOfSequence {
            action: "resolve a notification method",
            state: self.state,
        })?;
        Ok(NotificationMethod::for_policy(self.policy, post))
    }

    /// Renders the shortlist notification locally. Nothing is sent.
    pub fn preview_notifications(
        &self,
        template: &MessageTemplate,
    ) -> Result<PreviewBundle, PipelineError> {
        let shortlist = self.shortlist.as_ref().ok_or(PipelineError::OutOfSequence {
            action: "preview notifications",
            state: self.state,
        })?;
        let post = self.tracker.post().ok_or(PipelineError::OutOfSequence {
            action: "preview notifications",
            state: self.state,
        })?;

        let method = NotificationMethod::for_policy(self.policy, post);
        Ok(self
            .dispatcher
            .preview(post, method, shortlist.entries(), template)?)
    }

    pub async fn dispatch_notifications(
        &mut self,
        bundle: &PreviewBundle,
    ) -> Result<DeliveryReport, PipelineError> {
        if self.shortlist.is_none() {
            return Err(PipelineError::OutOfSequence {
                action: "dispatch notifications",
                state: self.state,
            });
        }
        if bundle.post_id != self.post_id {
            return Err(PipelineError::Conflict(format!(
                "preview was rendered for post {}, not {}",
                bundle.post_id, self.post_id
            )));
        }

        let report = self.dispatcher.dispatch(bundle).await?;
        self.state = PipelineState::Notified;
        Ok(report)
    }

    pub async fn select(
        &mut self,
        applicant_id: &ApplicantId,
    ) -> Result<TransitionOutcome, PipelineError> {
        self.require_loaded("select")?;
        let outcome = self.tracker.select(applicant_id).await?;
        self.after_transition();
        Ok(outcome)
    }

    pub async fn reject(
        &mut self,
        applicant_id: &ApplicantId,
    ) -> Result<TransitionOutcome, PipelineError> {
        self.require_loaded("reject")?;
        let outcome = self.tracker.reject(applicant_id).await?;
        self.after_transition();
        Ok(outcome)
    }

    pub async fn auto_select(&mut self) -> Result<AutoSelectResponse, PipelineError> {
        self.require_loaded("auto-select")?;
        let response = self.tracker.auto_select().await?;
        self.after_transition();
        Ok(response)
    }

    pub async fn schedule(
        &mut self,
        applicant_id: &ApplicantId,
        datetime: &str,
        note: Option<&str>,
    ) -> Result<Meeting, PipelineError> {
        self.require_loaded("schedule an interview")?;
        self.scheduler.schedule(applicant_id, datetime, note).await
    }

    pub async fn list_meetings(&mut self) -> Result<&[Meeting], PipelineError> {
        self.scheduler.list_meetings().await
    }

    fn require_loaded(&self, action: &'static str) -> Result<(), PipelineError> {
        if self.state == PipelineState::Idle || self.tracker.snapshot().is_none() {
            return Err(PipelineError::OutOfSequence {
                action,
                state: self.state,
            });
        }
        Ok(())
    }

    fn after_transition(&mut self) {
        self.sync_statuses();
        self.reproject();
        self.state = PipelineState::Resolved;
    }

    /// Copies refreshed roster statuses onto the ranked entries; scores and order are untouched.
    fn sync_statuses(&mut self) {
        let Some(result) = self.match_result.as_mut() else {
            return;
        };
        let roster = self.tracker.roster();
        for entry in &mut result.ranked {
            if let Some(applicant) = roster.iter().find(|applicant| applicant.id == entry.id) {
                entry.status = applicant.status;
            }
        }
    }

    fn reproject(&mut self) {
        let (Some(result), Some(post)) = (self.match_result.as_ref(), self.tracker.post()) else {
            return;
        };
        self.shortlist = Some(projector::project(
            result,
            self.policy,
            post,
            self.tracker.roster(),
        ));
    }
}
