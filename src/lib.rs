pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod intake;
pub mod mail;
pub mod models;
pub mod rate_limit;
pub mod routes;
pub mod state;
pub mod worker;

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, Method};
use axum::Router;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::mail::followup::{FollowUpProcessor, FollowUpScheduler, ProcessorSettings};
use crate::mail::notifications::Notifier;
use crate::mail::orchestrator::LeadMailer;
use crate::mail::queue::{EmailQueue, QueueSettings};
use crate::mail::template::TemplateStore;
use crate::mail::transport::DeliveryTransport;
use crate::rate_limit::{IntakeRateLimiter, LoginRateLimiter, SendRateLimiter};
use crate::state::{AppState, SharedState};

const MAX_BODY_BYTES: usize = 256 * 1024;

/// Build the router with the system clock and the transport picked from config.
pub fn build_app(pool: PgPool, config: Config) -> (Router, SharedState) {
    let transport = mail::build_transport(&config);
    let state = build_state(pool, config, Arc::new(SystemClock), transport);
    (router(state.clone()), state)
}

/// Wire every mail component around one clock, one transport and one send budget.
pub fn build_state(
    pool: PgPool,
    config: Config,
    clock: Arc<dyn Clock>,
    transport: Arc<dyn DeliveryTransport>,
) -> SharedState {
    let mail = &config.mail;

    let send_limiter = Arc::new(SendRateLimiter::new(
        clock.clone(),
        mail.hourly_limit,
        mail.daily_limit,
    ));

    let notifier = Notifier {
        from: mail.from.clone(),
        admin_recipient: mail.admin_recipient.clone(),
        base_url: config.base_url.clone(),
    };

    let queue = Arc::new(EmailQueue::new(
        send_limiter.clone(),
        transport.clone(),
        notifier.clone(),
        clock.clone(),
        QueueSettings {
            send_delay: mail.send_delay,
            max_retries: mail.max_retries,
            transport_timeout: mail.transport_timeout,
        },
    ));

    let scheduler = Arc::new(FollowUpScheduler::new(
        pool.clone(),
        clock.clone(),
        mail.max_retries,
    ));

    let processor = Arc::new(FollowUpProcessor::new(
        scheduler.clone(),
        send_limiter.clone(),
        transport.clone(),
        TemplateStore::new(&mail.template_dir, &mail.template_fallback_dir),
        ProcessorSettings {
            from: mail.from.clone(),
            batch_limit: mail.batch_limit,
            batch_delay: mail.batch_delay,
            transport_timeout: mail.transport_timeout,
        },
    ));

    let mailer = LeadMailer::new(queue.clone(), scheduler.clone());
    let intake_limiter = IntakeRateLimiter::new(config.intake_per_minute);

    Arc::new(AppState {
        pool,
        config,
        clock,
        transport,
        notifier,
        send_limiter,
        queue,
        scheduler,
        processor,
        mailer,
        intake_limiter,
        login_limiter: LoginRateLimiter::new(),
    })
}

pub fn router(state: SharedState) -> Router {
    let cors = cors_layer(state.config.cors_origin.as_deref());

    Router::new()
        .merge(routes::api_routes())
        .route("/health", axum::routing::get(health))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("referrer-policy"),
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ]);

    match origin.and_then(|o| HeaderValue::from_str(o).ok()) {
        Some(origin) => layer.allow_origin(origin).allow_credentials(true),
        None => layer.allow_origin(Any),
    }
}

async fn health() -> &'static str {
    "ok"
}
