use std::sync::Arc;

use sqlx::PgPool;

use crate::clock::Clock;
use crate::config::Config;
use crate::mail::followup::{FollowUpProcessor, FollowUpScheduler};
use crate::mail::notifications::Notifier;
use crate::mail::orchestrator::LeadMailer;
use crate::mail::queue::EmailQueue;
use crate::mail::transport::DeliveryTransport;
use crate::rate_limit::{IntakeRateLimiter, LoginRateLimiter, SendRateLimiter};

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub transport: Arc<dyn DeliveryTransport>,
    pub notifier: Notifier,
    /// One send budget for the queue and the follow-up processor.
    pub send_limiter: Arc<SendRateLimiter>,
    pub queue: Arc<EmailQueue>,
    pub scheduler: Arc<FollowUpScheduler>,
    pub processor: Arc<FollowUpProcessor>,
    pub mailer: LeadMailer,
    pub intake_limiter: IntakeRateLimiter,
    pub login_limiter: LoginRateLimiter,
}
