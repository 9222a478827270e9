use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::controller::{PipelineController, PipelineState};
use super::domain::{ApplicantId, OutboundMessage, PostId, RankedApplicant, SelectionPolicy};
use super::error::PipelineError;
use super::notification::{self, DocumentFormat, MessageTemplate};
use super::projector::{RankingSource, Shortlist};
use crate::remote::PlacementGateway;
use crate::session::Session;

type SharedController<G> = Arc<AsyncMutex<PipelineController<G>>>;

/// One controller per post, loaded on first use and kept for the life of the session.
pub struct PipelineWorkspace<G: ?Sized> {
    session: Session,
    gateway: Arc<G>,
    controllers: Mutex<HashMap<PostId, SharedController<G>>>,
}

impl<G> PipelineWorkspace<G>
where
    G: PlacementGateway + ?Sized,
{
    pub fn new(session: Session, gateway: Arc<G>) -> Self {
        Self {
            session,
            gateway,
            controllers: Mutex::new(HashMap::new()),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn gateway(&self) -> Arc<G> {
        self.gateway.clone()
    }

    /// Controller for `post_id`, loaded before it is handed out. With `refresh` the post and
    /// roster are fetched again even when already loaded. A post that never loads is not kept.
    pub async fn open(
        &self,
        post_id: &PostId,
        refresh: bool,
    ) -> Result<OwnedMutexGuard<PipelineController<G>>, PipelineError> {
        let shared = self.shared(post_id);
        let mut controller = shared.clone().lock_owned().await;
        if refresh || controller.state() == PipelineState::Idle {
            if let Err(error) = controller.load().await {
                if controller.state() == PipelineState::Idle {
                    self.forget(post_id, &shared);
                }
                return Err(error);
            }
        }
        Ok(controller)
    }

    /// Number of posts with a live controller.
    pub fn open_posts(&self) -> usize {
        self.lock_controllers().len()
    }

    fn shared(&self, post_id: &PostId) -> SharedController<G> {
        self.lock_controllers()
            .entry(post_id.clone())
            .or_insert_with(|| {
                Arc::new(AsyncMutex::new(PipelineController::new(
                    self.session.clone(),
                    self.gateway.clone(),
                    post_id.clone(),
                )))
            })
            .clone()
    }

    fn forget(&self, post_id: &PostId, shared: &SharedController<G>) {
        let mut controllers = self.lock_controllers();
        if controllers
            .get(post_id)
            .is_some_and(|current| Arc::ptr_eq(current, shared))
        {
            controllers.remove(post_id);
        }
    }

    fn lock_controllers(&self) -> MutexGuard<'_, HashMap<PostId, SharedController<G>>> {
        self.controllers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ShortlistView<'a> {
    policy: SelectionPolicy,
    source: RankingSource,
    entries: &'a [RankedApplicant],
    ranked: &'a [RankedApplicant],
    boundary_score: Option<f64>,
}

impl<'a> From<&'a Shortlist> for ShortlistView<'a> {
    fn from(shortlist: &'a Shortlist) -> Self {
        Self {
            policy: shortlist.policy(),
            source: shortlist.source(),
            entries: shortlist.entries(),
            ranked: shortlist.ranked(),
            boundary_score: shortlist.boundary().and_then(|entry| entry.score),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PolicyBody {
    #[serde(default)]
    pub policy: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TieBreakBody {
    #[serde(default)]
    pub custom_link: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TemplateBody {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl TemplateBody {
    fn into_template(self) -> MessageTemplate {
        let defaults = MessageTemplate::default();
        MessageTemplate {
            subject: self.subject.unwrap_or(defaults.subject),
            body: self.body.unwrap_or(defaults.body),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScheduleBody {
    pub applicant_id: String,
    pub datetime: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RenderQuery {
    #[serde(default)]
    pub format: Option<DocumentFormat>,
}

/// Router builder exposing the pipeline to a hosting shell.
pub fn pipeline_router<G>(workspace: Arc<PipelineWorkspace<G>>) -> Router
where
    G: PlacementGateway + ?Sized + 'static,
{
    Router::new()
        .route("/api/v1/pipeline/posts/:post_id", get(snapshot_handler::<G>))
        .route("/api/v1/pipeline/posts/:post_id/load", post(load_handler::<G>))
        .route("/api/v1/pipeline/posts/:post_id/match", post(match_handler::<G>))
        .route("/api/v1/pipeline/posts/:post_id/policy", put(policy_handler::<G>))
        .route(
            "/api/v1/pipeline/posts/:post_id/tiebreak",
            post(tie_break_handler::<G>),
        )
        .route(
            "/api/v1/pipeline/posts/:post_id/tiebreak/send",
            post(tie_break_send_handler::<G>),
        )
        .route(
            "/api/v1/pipeline/posts/:post_id/notifications/preview",
            post(preview_handler::<G>),
        )
        .route(
            "/api/v1/pipeline/posts/:post_id/notifications/dispatch",
            post(dispatch_handler::<G>),
        )
        .route(
            "/api/v1/pipeline/posts/:post_id/applicants/:applicant_id/select",
            post(select_handler::<G>),
        )
        .route(
            "/api/v1/pipeline/posts/:post_id/applicants/:applicant_id/reject",
            post(reject_handler::<G>),
        )
        .route(
            "/api/v1/pipeline/posts/:post_id/auto-select",
            post(auto_select_handler::<G>),
        )
        .route(
            "/api/v1/pipeline/posts/:post_id/meetings",
            get(meetings_handler::<G>).post(schedule_handler::<G>),
        )
        .route("/api/v1/pipeline/render", post(render_handler))
        .with_state(workspace)
}

/// HTTP status for each failure kind.
pub fn status_for(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::Conflict(_) | PipelineError::OutOfSequence { .. } => StatusCode::CONFLICT,
        PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
        PipelineError::InvalidInput(_) | PipelineError::EmptyTieBreak => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        PipelineError::RemoteRejection { .. } => StatusCode::BAD_GATEWAY,
        PipelineError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub(crate) fn error_response(error: PipelineError) -> Response {
    let payload = json!({
        "error": error.to_string(),
    });
    (status_for(&error), Json(payload)).into_response()
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, PipelineError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn snapshot_handler<G>(
    State(workspace): State<Arc<PipelineWorkspace<G>>>,
    Path(post_id): Path<String>,
) -> Response
where
    G: PlacementGateway + ?Sized + 'static,
{
    let controller = match workspace.open(&PostId(post_id), false).await {
        Ok(controller) => controller,
        Err(error) => return error_response(error),
    };
    respond(StatusCode::OK, Ok(controller.snapshot()))
}

pub(crate) async fn load_handler<G>(
    State(workspace): State<Arc<PipelineWorkspace<G>>>,
    Path(post_id): Path<String>,
) -> Response
where
    G: PlacementGateway + ?Sized + 'static,
{
    let controller = match workspace.open(&PostId(post_id), true).await {
        Ok(controller) => controller,
        Err(error) => return error_response(error),
    };
    respond(StatusCode::OK, Ok(controller.snapshot()))
}

pub(crate) async fn match_handler<G>(
    State(workspace): State<Arc<PipelineWorkspace<G>>>,
    Path(post_id): Path<String>,
    body: Option<Json<PolicyBody>>,
) -> Response
where
    G: PlacementGateway + ?Sized + 'static,
{
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let policy = match body.policy.as_deref().map(str::parse::<SelectionPolicy>).transpose() {
        Ok(policy) => policy,
        Err(error) => return error_response(error.into()),
    };

    let mut controller = match workspace.open(&PostId(post_id), false).await {
        Ok(controller) => controller,
        Err(error) => return error_response(error),
    };
    match controller.run_match(policy).await {
        Ok(shortlist) => (StatusCode::OK, Json(ShortlistView::from(shortlist))).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn policy_handler<G>(
    State(workspace): State<Arc<PipelineWorkspace<G>>>,
    Path(post_id): Path<String>,
    Json(body): Json<PolicyBody>,
) -> Response
where
    G: PlacementGateway + ?Sized + 'static,
{
    let policy = match body.policy.as_deref().unwrap_or_default().parse::<SelectionPolicy>() {
        Ok(policy) => policy,
        Err(error) => return error_response(error.into()),
    };

    let mut controller = match workspace.open(&PostId(post_id), false).await {
        Ok(controller) => controller,
        Err(error) => return error_response(error),
    };
    let state = controller.state();
    match controller.set_policy(policy) {
        Some(shortlist) => (StatusCode::OK, Json(ShortlistView::from(shortlist))).into_response(),
        None => {
            let payload = json!({
                "policy": policy,
                "state": state,
            });
            (StatusCode::ACCEPTED, Json(payload)).into_response()
        }
    }
}

pub(crate) async fn tie_break_handler<G>(
    State(workspace): State<Arc<PipelineWorkspace<G>>>,
    Path(post_id): Path<String>,
    body: Option<Json<TieBreakBody>>,
) -> Response
where
    G: PlacementGateway + ?Sized + 'static,
{
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let mut controller = match workspace.open(&PostId(post_id), false).await {
        Ok(controller) => controller,
        Err(error) => return error_response(error),
    };
    let result = controller
        .create_tie_break(body.custom_link.as_deref())
        .await
        .cloned();
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn tie_break_send_handler<G>(
    State(workspace): State<Arc<PipelineWorkspace<G>>>,
    Path(post_id): Path<String>,
) -> Response
where
    G: PlacementGateway + ?Sized + 'static,
{
    let mut controller = match workspace.open(&PostId(post_id), false).await {
        Ok(controller) => controller,
        Err(error) => return error_response(error),
    };
    respond(StatusCode::OK, controller.send_tie_break_emails().await)
}

pub(crate) async fn preview_handler<G>(
    State(workspace): State<Arc<PipelineWorkspace<G>>>,
    Path(post_id): Path<String>,
    body: Option<Json<TemplateBody>>,
) -> Response
where
    G: PlacementGateway + ?Sized + 'static,
{
    let template = body.map(|Json(body)| body).unwrap_or_default().into_template();
    let controller = match workspace.open(&PostId(post_id), false).await {
        Ok(controller) => controller,
        Err(error) => return error_response(error),
    };
    respond(StatusCode::OK, controller.preview_notifications(&template))
}

pub(crate) async fn dispatch_handler<G>(
    State(workspace): State<Arc<PipelineWorkspace<G>>>,
    Path(post_id): Path<String>,
    body: Option<Json<TemplateBody>>,
) -> Response
where
    G: PlacementGateway + ?Sized + 'static,
{
    let template = body.map(|Json(body)| body).unwrap_or_default().into_template();
    let mut controller = match workspace.open(&PostId(post_id), false).await {
        Ok(controller) => controller,
        Err(error) => return error_response(error),
    };
    let bundle = match controller.preview_notifications(&template) {
        Ok(bundle) => bundle,
        Err(error) => return error_response(error),
    };
    respond(StatusCode::OK, controller.dispatch_notifications(&bundle).await)
}

pub(crate) async fn select_handler<G>(
    State(workspace): State<Arc<PipelineWorkspace<G>>>,
    Path((post_id, applicant_id)): Path<(String, String)>,
) -> Response
where
    G: PlacementGateway + ?Sized + 'static,
{
    let mut controller = match workspace.open(&PostId(post_id), false).await {
        Ok(controller) => controller,
        Err(error) => return error_response(error),
    };
    respond(
        StatusCode::OK,
        controller.select(&ApplicantId(applicant_id)).await,
    )
}

pub(crate) async fn reject_handler<G>(
    State(workspace): State<Arc<PipelineWorkspace<G>>>,
    Path((post_id, applicant_id)): Path<(String, String)>,
) -> Response
where
    G: PlacementGateway + ?Sized + 'static,
{
    let mut controller = match workspace.open(&PostId(post_id), false).await {
        Ok(controller) => controller,
        Err(error) => return error_response(error),
    };
    respond(
        StatusCode::OK,
        controller.reject(&ApplicantId(applicant_id)).await,
    )
}

pub(crate) async fn auto_select_handler<G>(
    State(workspace): State<Arc<PipelineWorkspace<G>>>,
    Path(post_id): Path<String>,
) -> Response
where
    G: PlacementGateway + ?Sized + 'static,
{
    let mut controller = match workspace.open(&PostId(post_id), false).await {
        Ok(controller) => controller,
        Err(error) => return error_response(error),
    };
    respond(StatusCode::OK, controller.auto_select().await)
}

pub(crate) async fn schedule_handler<G>(
    State(workspace): State<Arc<PipelineWorkspace<G>>>,
    Path(post_id): Path<String>,
    Json(body): Json<ScheduleBody>,
) -> Response
where
    G: PlacementGateway + ?Sized + 'static,
{
    let mut controller = match workspace.open(&PostId(post_id), false).await {
        Ok(controller) => controller,
        Err(error) => return error_response(error),
    };
    let result = controller
        .schedule(
            &ApplicantId(body.applicant_id),
            &body.datetime,
            body.note.as_deref(),
        )
        .await;
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn meetings_handler<G>(
    State(workspace): State<Arc<PipelineWorkspace<G>>>,
    Path(post_id): Path<String>,
) -> Response
where
    G: PlacementGateway + ?Sized + 'static,
{
    let mut controller = match workspace.open(&PostId(post_id), false).await {
        Ok(controller) => controller,
        Err(error) => return error_response(error),
    };
    let result = controller.list_meetings().await.map(<[_]>::to_vec);
    respond(StatusCode::OK, result)
}

pub(crate) async fn render_handler(
    Query(query): Query<RenderQuery>,
    Json(message): Json<OutboundMessage>,
) -> Response {
    let format = query.format.unwrap_or(DocumentFormat::PlainText);
    let document = notification::render(&message, format);
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, format.content_type())],
        document.content,
    )
        .into_response()
}
