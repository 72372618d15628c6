//! Credential issuing service
//!
//! Keeps the speech service key on the server and hands clients short-lived
//! tokens:
//! - GET /api/speech-token - `{token, region}` for the audio services
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::ErrorResponse;
pub use routes::create_router;
pub use state::AppState;
