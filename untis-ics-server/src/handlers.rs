use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{SubsecRound, Utc};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use untis_ics_core::prelude::*;

use crate::cache::RedisCache;

#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn TimetableSource>,
    pub cache: CalendarCache<RedisCache>,
    pub options: IcsOptions,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/calendar.ics", get(calendar_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

async fn root_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "Untis ICS Calendar Service",
        "version": env!("CARGO_PKG_VERSION"),
        "calendar": state.options.calendar_name,
        "source": state.source.description(),
        "endpoints": {
            "health": "/health",
            "calendar": "/calendar.ics"
        }
    }))
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn calendar_handler(State(state): State<AppState>) -> Result<Response, AppError> {
    let (calendar, status) = state
        .cache
        .get_or_build(
            state.source.as_ref(),
            &state.options,
            Utc::now().trunc_subsecs(0),
        )
        .await?;
    tracing::debug!("Serving calendar ({})", status.as_str());

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8"),
            (header::HeaderName::from_static("x-cache"), status.as_str()),
        ],
        calendar,
    )
        .into_response())
}

#[derive(Debug)]
struct AppError(untis_ics_core::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self.0 {
            untis_ics_core::Error::Config(_) | untis_ics_core::Error::Timezone(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Configuration error")
            }
            untis_ics_core::Error::Authentication(_) => {
                (StatusCode::BAD_GATEWAY, "Timetable login failed")
            }
            untis_ics_core::Error::Provider { .. } | untis_ics_core::Error::Http(_) => {
                (StatusCode::BAD_GATEWAY, "Timetable service error")
            }
            untis_ics_core::Error::Timeout => (StatusCode::GATEWAY_TIMEOUT, "Request timed out"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };
        tracing::error!("{}: {}", error_message, self.0);

        let body = Json(ErrorResponse {
            error: error_message.to_string(),
            message: self.0.to_string(),
        });

        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<untis_ics_core::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
