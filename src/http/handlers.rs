use super::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// GET /api/speech-token
/// Exchange the server-held key for a short-lived `{token, region}`
pub async fn issue_token(State(state): State<AppState>) -> impl IntoResponse {
    let Some(issuer) = state.issuer else {
        warn!("Speech token requested but no key or region is configured");
        return error_response(
            StatusCode::BAD_REQUEST,
            "You forgot to add your speech key or region to the configuration.",
        );
    };

    match issuer.issue().await {
        Ok(issued) => {
            info!("Issued speech token for region {}", issued.region);
            (StatusCode::OK, Json(issued)).into_response()
        }
        Err(e) => {
            error!("Failed to issue speech token: {:#}", e);
            error_response(
                StatusCode::UNAUTHORIZED,
                "There was an error authorizing your speech key.",
            )
        }
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
