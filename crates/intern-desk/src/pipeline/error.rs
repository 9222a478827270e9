use super::controller::PipelineState;
use super::domain::ApplicantId;
use crate::remote::GatewayError;

/// Operator input the pipeline refuses before any remote call is made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidInput {
    #[error("'{value}' is not a recognised date-time (expected ISO 8601 or YYYY-MM-DD HH:MM)")]
    DateTime { value: String },
    #[error("'{value}' is not a selection policy (expected a percentage such as 20% or 'positions')")]
    Policy { value: String },
    #[error("shortlist is empty")]
    EmptyShortlist,
    #[error("shortlist boundary applicant {applicant_id} has no score to tie-break on")]
    UnscoredBoundary { applicant_id: ApplicantId },
    #[error("notification {field} template is empty")]
    TemplateEmpty { field: &'static str },
    #[error("tie-break link '{value}' is not an http(s) URL")]
    Link { value: String },
}

/// Failure surfaced at a pipeline operation boundary. Local state is never partially applied.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("placement service unreachable: {0}")]
    Transport(String),
    #[error("placement service rejected the request ({status}): {detail}")]
    RemoteRejection { status: u16, detail: String },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    InvalidInput(#[from] InvalidInput),
    #[error("no tie-break links exist yet; create a tie-break first")]
    EmptyTieBreak,
    #[error("cannot {action} while the pipeline is {state}")]
    OutOfSequence {
        action: &'static str,
        state: PipelineState,
    },
}

impl PipelineError {
    pub(crate) fn already_resolved(
        applicant_id: &ApplicantId,
        status: impl std::fmt::Display,
    ) -> Self {
        PipelineError::Conflict(format!("applicant {applicant_id} is already {status}"))
    }
}

impl From<GatewayError> for PipelineError {
    fn from(value: GatewayError) -> Self {
        match value {
            GatewayError::Transport(detail) => PipelineError::Transport(detail),
            GatewayError::Rejected { status, detail } => {
                PipelineError::RemoteRejection { status, detail }
            }
            GatewayError::Conflict(detail) => PipelineError::Conflict(detail),
            GatewayError::NotFound(detail) => PipelineError::NotFound(detail),
            GatewayError::Decode(detail) => PipelineError::RemoteRejection {
                status: 200,
                detail: format!("unreadable response: {detail}"),
            },
        }
    }
}
