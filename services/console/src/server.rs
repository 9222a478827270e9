use crate::cli::ServeArgs;
use crate::infra::{sandbox_session, AppState, SandboxPlacementGateway};
use crate::routes::with_pipeline_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use intern_desk::config::AppConfig;
use intern_desk::error::AppError;
use intern_desk::pipeline::{PipelineWorkspace, PostId};
use intern_desk::remote::{HttpPlacementGateway, PlacementGateway};
use intern_desk::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let workspace = Arc::new(build_workspace(&config)?);
    if let Some(post) = args.post.take() {
        let post_id = PostId(post);
        if let Err(err) = workspace.open(&post_id, true).await {
            warn!(post_id = %post_id, error = %err, "initial post load failed");
        }
    }

    let app = with_pipeline_routes(workspace)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "placement pipeline console ready");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Talks to the configured service when a session is available, otherwise to the sandbox.
fn build_workspace(
    config: &AppConfig,
) -> Result<PipelineWorkspace<dyn PlacementGateway>, AppError> {
    match config.remote.session() {
        Ok(session) => {
            let gateway: Arc<dyn PlacementGateway> =
                Arc::new(HttpPlacementGateway::new(&config.remote, session.clone())?);
            info!(
                base_url = %config.remote.base_url,
                department = session.department_id(),
                "using remote placement service"
            );
            Ok(PipelineWorkspace::new(session, gateway))
        }
        Err(err) => {
            warn!(reason = %err, "no operator session configured, serving the sandbox");
            let gateway: Arc<dyn PlacementGateway> = Arc::new(SandboxPlacementGateway::seeded());
            Ok(PipelineWorkspace::new(sandbox_session(), gateway))
        }
    }
}
