pub mod auth;
pub mod email;
pub mod email_queue;
pub mod leads;

use axum::routing::{get, patch, post};
use axum::Router;

use crate::state::SharedState;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        // Auth
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/logout", post(auth::logout))
        // Leads
        .route("/api/v1/leads", get(leads::list).post(leads::create))
        .route(
            "/api/v1/leads/{id}",
            get(leads::get).delete(leads::delete),
        )
        .route("/api/v1/leads/{id}/status", patch(leads::update_status))
        .route(
            "/api/v1/leads/{id}/follow-ups",
            get(leads::follow_ups),
        )
        .route(
            "/api/v1/leads/{id}/follow-ups/cancel",
            post(leads::cancel_follow_ups),
        )
        // Mail
        .route("/api/v1/queue/stats", get(email_queue::queue_stats))
        .route("/api/v1/email-queue/stats", get(email_queue::stats))
        .route("/api/v1/email-queue/pending", get(email_queue::pending))
        .route("/api/v1/email-queue/process", post(email_queue::process))
        // Operator checks
        .route("/api/v1/email/verify", get(email::verify))
        .route("/api/v1/email/test", post(email::send_test))
}
