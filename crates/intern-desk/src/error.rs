use crate::config::ConfigError;
use crate::department::DepartmentError;
use crate::pipeline::{status_for, PipelineError};
use crate::remote::GatewayError;
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Gateway(GatewayError),
    Pipeline(PipelineError),
    Department(DepartmentError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Gateway(err) => write!(f, "placement service error: {}", err),
            AppError::Pipeline(err) => write!(f, "{}", err),
            AppError::Department(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Gateway(err) => Some(err),
            AppError::Pipeline(err) => Some(err),
            AppError::Department(err) => Some(err),
        }
    }
}

fn gateway_status(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
        GatewayError::Conflict(_) => StatusCode::CONFLICT,
        GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
        GatewayError::Rejected { .. } | GatewayError::Decode(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Pipeline(err) => status_for(err),
            AppError::Gateway(err) | AppError::Department(DepartmentError::Gateway(err)) => {
                gateway_status(err)
            }
            AppError::Department(DepartmentError::Csv(_)) => StatusCode::BAD_GATEWAY,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_)
            | AppError::Department(DepartmentError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<GatewayError> for AppError {
    fn from(value: GatewayError) -> Self {
        Self::Gateway(value)
    }
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

impl From<DepartmentError> for AppError {
    fn from(value: DepartmentError) -> Self {
        Self::Department(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_errors_keep_their_http_status() {
        let response = AppError::from(PipelineError::Conflict(
            "applicant a is already selected".to_string(),
        ))
        .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = AppError::from(DepartmentError::Gateway(GatewayError::Transport(
            "refused".to_string(),
        )))
        .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn configuration_errors_are_internal() {
        let response =
            AppError::from(ConfigError::MissingSession("PLACEMENT_API_TOKEN")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
