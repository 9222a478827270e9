use crate::infra::AppState;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use intern_desk::department::DepartmentDirectory;
use intern_desk::error::AppError;
use intern_desk::pipeline::{pipeline_router, CandidateRecord, Post, PostId, PipelineWorkspace};
use intern_desk::remote::{DepartmentAnalytics, DepartmentNotice, PlacementGateway, RestoreResponse};
use serde_json::json;
use std::sync::Arc;

type Directory<G> = Arc<DepartmentDirectory<G>>;

/// Pipeline facade plus department views and the operational endpoints.
pub(crate) fn with_pipeline_routes<G>(workspace: Arc<PipelineWorkspace<G>>) -> axum::Router
where
    G: PlacementGateway + ?Sized + 'static,
{
    let directory = Arc::new(DepartmentDirectory::new(
        workspace.session().clone(),
        workspace.gateway(),
    ));

    pipeline_router(workspace)
        .merge(department_routes(directory))
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

fn department_routes<G>(directory: Directory<G>) -> axum::Router
where
    G: PlacementGateway + ?Sized + 'static,
{
    axum::Router::new()
        .route(
            "/api/v1/department/posts",
            axum::routing::get(posts_endpoint::<G>),
        )
        .route(
            "/api/v1/department/past-posts",
            axum::routing::get(past_posts_endpoint::<G>),
        )
        .route(
            "/api/v1/department/past-posts/:post_id/restore",
            axum::routing::post(restore_endpoint::<G>),
        )
        .route(
            "/api/v1/department/selected",
            axum::routing::get(selected_endpoint::<G>),
        )
        .route(
            "/api/v1/department/rejected",
            axum::routing::get(rejected_endpoint::<G>),
        )
        .route(
            "/api/v1/department/selected/export",
            axum::routing::get(export_endpoint::<G>),
        )
        .route(
            "/api/v1/department/analytics",
            axum::routing::get(analytics_endpoint::<G>),
        )
        .route(
            "/api/v1/department/notifications",
            axum::routing::get(notifications_endpoint::<G>),
        )
        .with_state(directory)
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

async fn posts_endpoint<G>(
    State(directory): State<Directory<G>>,
) -> Result<Json<Vec<Post>>, AppError>
where
    G: PlacementGateway + ?Sized,
{
    Ok(Json(directory.posts().await?))
}

async fn past_posts_endpoint<G>(
    State(directory): State<Directory<G>>,
) -> Result<Json<Vec<Post>>, AppError>
where
    G: PlacementGateway + ?Sized,
{
    Ok(Json(directory.past_posts().await?))
}

async fn restore_endpoint<G>(
    State(directory): State<Directory<G>>,
    Path(post_id): Path<String>,
) -> Result<Json<RestoreResponse>, AppError>
where
    G: PlacementGateway + ?Sized,
{
    let post_id = PostId(post_id);
    Ok(Json(directory.restore(&post_id).await?))
}

async fn selected_endpoint<G>(
    State(directory): State<Directory<G>>,
) -> Result<Json<Vec<CandidateRecord>>, AppError>
where
    G: PlacementGateway + ?Sized,
{
    Ok(Json(directory.selected().await?))
}

async fn rejected_endpoint<G>(
    State(directory): State<Directory<G>>,
) -> Result<Json<Vec<CandidateRecord>>, AppError>
where
    G: PlacementGateway + ?Sized,
{
    Ok(Json(directory.rejected().await?))
}

/// Streams the export bytes untouched so downloads match the service's file.
async fn export_endpoint<G>(
    State(directory): State<Directory<G>>,
) -> Result<impl IntoResponse, AppError>
where
    G: PlacementGateway + ?Sized,
{
    let export = directory.export_selected().await?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"selected_candidates.csv\"",
            ),
        ],
        export.bytes,
    ))
}

async fn analytics_endpoint<G>(
    State(directory): State<Directory<G>>,
) -> Result<Json<DepartmentAnalytics>, AppError>
where
    G: PlacementGateway + ?Sized,
{
    Ok(Json(directory.analytics().await?))
}

async fn notifications_endpoint<G>(
    State(directory): State<Directory<G>>,
) -> Result<Json<Vec<DepartmentNotice>>, AppError>
where
    G: PlacementGateway + ?Sized,
{
    Ok(Json(directory.notifications().await?))
}
