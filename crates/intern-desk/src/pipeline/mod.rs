//! Applicant-selection pipeline for a single internship post.
//!
//! The placement service scores, composes messages and persists; this module decides the order
//! of calls and keeps the local view consistent with what the service last reported.

pub mod controller;
pub mod domain;
pub mod error;
pub mod interview;
pub mod notification;
pub mod projector;
pub mod router;
pub mod selection;
pub mod tiebreak;

#[cfg(test)]
mod tests;

pub use controller::{PipelineController, PipelineSnapshot, PipelineState};
pub use domain::{
    Applicant, ApplicantId, ApplicantStatus, CandidateRecord, MatchResult, Meeting,
    OutboundMessage, Post, PostId, RankedApplicant, SelectionPolicy,
};
pub use error::{InvalidInput, PipelineError};
pub use interview::{parse_datetime, InterviewScheduler};
pub use notification::{
    render, DeliveryKind, DeliveryReport, DocumentFormat, MessageTemplate, NotificationDispatcher,
    NotificationMethod, PreviewBundle, RenderedDocument,
};
pub use projector::{project, rank_roster, shortlist_len, RankingSource, Shortlist};
pub use router::{pipeline_router, status_for, PipelineWorkspace};
pub use selection::{RosterSnapshot, SelectionStateTracker, TransitionOutcome};
pub use tiebreak::{tie_group, TieBreakCoordinator, TieBreakRound, TieGroup};
