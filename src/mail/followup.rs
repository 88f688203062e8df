use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use super::template::{self, TemplateStore};
use super::transport::{self, DeliveryTransport, OutgoingEmail};
use super::DeliveryError;
use crate::clock::Clock;
use crate::db;
use crate::db::follow_ups::NewFollowUp;
use crate::models::{FollowUpJob, FollowUpStatus, LeadSnapshot};
use crate::rate_limit::SendRateLimiter;

/// Discount offered in follow-ups when the job metadata carries none.
pub const DEFAULT_DISCOUNT: i64 = 30;

/// One step of the post-submission mail sequence.
#[derive(Debug, Clone, Copy)]
pub struct CadenceStep {
    pub email_type: &'static str,
    pub template_name: &'static str,
    pub subject: &'static str,
    /// Delay after lead creation.
    pub offset_secs: i64,
}

pub const CADENCE: [CadenceStep; 5] = [
    CadenceStep {
        email_type: "confirmation",
        template_name: "confirmation",
        subject: "Deine Tattoo-Anfrage ist eingegangen",
        offset_secs: 60,
    },
    CadenceStep {
        email_type: "followup_1h",
        template_name: "followup-1h",
        subject: "Dein Rabatt wartet auf dich",
        offset_secs: 60 * 60,
    },
    CadenceStep {
        email_type: "followup_8h",
        template_name: "followup-8h",
        subject: "Noch Fragen zu deinem Tattoo?",
        offset_secs: 8 * 60 * 60,
    },
    CadenceStep {
        email_type: "followup_24h",
        template_name: "followup-24h",
        subject: "Dein Rabatt läuft bald ab",
        offset_secs: 24 * 60 * 60,
    },
    CadenceStep {
        email_type: "followup_3d",
        template_name: "followup-3d",
        subject: "Letzte Erinnerung: dein Tattoo-Rabatt",
        offset_secs: 3 * 24 * 60 * 60,
    },
];

/// Owns the persisted follow-up jobs: scheduling, selection and status moves.
pub struct FollowUpScheduler {
    pool: PgPool,
    clock: Arc<dyn Clock>,
    max_retries: i32,
}

impl FollowUpScheduler {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>, max_retries: u32) -> Self {
        Self {
            pool,
            clock,
            max_retries: i32::try_from(max_retries).unwrap_or(i32::MAX),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert one pending job per cadence step. Either all of them are
    /// stored or none are.
    pub async fn schedule_follow_ups(
        &self,
        lead: &LeadSnapshot,
    ) -> Result<Vec<FollowUpJob>, sqlx::Error> {
        let now = self.clock.now();
        let metadata = json!({
            "lead_id": lead.id,
            "discount_percentage": lead.discount_percentage,
        });

        let mut tx = self.pool.begin().await?;
        let mut jobs = Vec::with_capacity(CADENCE.len());

        for step in &CADENCE {
            let job = db::follow_ups::insert(
                &mut *tx,
                &NewFollowUp {
                    lead_id: lead.id,
                    email_type: step.email_type,
                    template_name: step.template_name,
                    subject: step.subject,
                    recipient_email: &lead.email,
                    recipient_name: &lead.name,
                    scheduled_at: now + chrono::Duration::seconds(step.offset_secs),
                    max_retries: self.max_retries,
                    metadata: &metadata,
                },
            )
            .await?;
            jobs.push(job);
        }

        tx.commit().await?;

        tracing::info!("Scheduled {} follow-up emails for lead {}", jobs.len(), lead.id);
        Ok(jobs)
    }

    pub async fn due_jobs(&self, limit: i64) -> Result<Vec<FollowUpJob>, sqlx::Error> {
        db::follow_ups::due(&self.pool, self.clock.now(), limit).await
    }

    /// Take a selected job for sending if it is still pending.
    pub async fn claim(&self, id: Uuid) -> Result<Option<FollowUpJob>, sqlx::Error> {
        db::follow_ups::claim(&self.pool, id, self.clock.now()).await
    }

    pub async fn mark_sent(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        db::follow_ups::mark_sent(&self.pool, id, self.clock.now()).await
    }

    pub async fn mark_failed(
        &self,
        id: Uuid,
        reason: &str,
    ) -> Result<Option<FollowUpJob>, sqlx::Error> {
        db::follow_ups::mark_failed(&self.pool, id, reason, self.clock.now()).await
    }

    /// Cancel every still-pending job of a lead. Sent and failed jobs keep their status.
    pub async fn cancel_for_lead(&self, lead_id: Uuid) -> Result<u64, sqlx::Error> {
        let cancelled = db::follow_ups::cancel_for_lead(&self.pool, lead_id, self.clock.now()).await?;
        if cancelled > 0 {
            tracing::info!("Cancelled {cancelled} pending follow-up emails for lead {lead_id}");
        }
        Ok(cancelled)
    }
}

#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub from: String,
    pub batch_limit: i64,
    pub batch_delay: Duration,
    pub transport_timeout: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub sent: u32,
    pub failed: u32,
    /// Due jobs left untouched because the send budget ran out.
    pub deferred: u32,
    /// Selected jobs that were cancelled before their turn came.
    pub cancelled: u32,
}

/// Periodically sends due follow-up jobs through the shared transport and limiter.
pub struct FollowUpProcessor {
    scheduler: Arc<FollowUpScheduler>,
    limiter: Arc<SendRateLimiter>,
    transport: Arc<dyn DeliveryTransport>,
    templates: TemplateStore,
    settings: ProcessorSettings,
    processing: AtomicBool,
}

struct BatchGuard<'a>(&'a AtomicBool);

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl FollowUpProcessor {
    pub fn new(
        scheduler: Arc<FollowUpScheduler>,
        limiter: Arc<SendRateLimiter>,
        transport: Arc<dyn DeliveryTransport>,
        templates: TemplateStore,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            scheduler,
            limiter,
            transport,
            templates,
            settings,
            processing: AtomicBool::new(false),
        }
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Send one batch of due jobs. Returns `Ok(None)` when a batch is already running.
    pub async fn run_batch(&self) -> Result<Option<BatchSummary>, sqlx::Error> {
        if self
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Follow-up batch already running, skipping");
            return Ok(None);
        }
        let _guard = BatchGuard(&self.processing);

        let jobs = self.scheduler.due_jobs(self.settings.batch_limit).await?;
        if jobs.is_empty() {
            return Ok(Some(BatchSummary::default()));
        }

        tracing::info!("Processing {} due follow-up emails", jobs.len());

        let total = jobs.len();
        let mut summary = BatchSummary::default();

        for (index, job) in jobs.iter().enumerate() {
            self.limiter.reset_if_expired();
            if let Err(blocked) = self.limiter.check() {
                summary.deferred = (total - index) as u32;
                tracing::warn!(
                    "{:?} mail limit reached ({}/{}), deferring {} follow-up emails",
                    blocked.window,
                    blocked.used,
                    blocked.cap,
                    summary.deferred
                );
                break;
            }

            let job = match self.scheduler.claim(job.id).await {
                Ok(Some(job)) => job,
                Ok(None) => {
                    summary.cancelled += 1;
                    tracing::info!("Follow-up {} is no longer pending, skipping", job.id);
                    continue;
                }
                Err(e) => {
                    tracing::error!("Failed to claim follow-up {}: {e}", job.id);
                    continue;
                }
            };

            match self.deliver(&job).await {
                Ok(delivery) => {
                    self.limiter.increment();
                    summary.sent += 1;
                    tracing::info!(
                        "Sent {} email to {} (job {}, message id {:?})",
                        job.email_type,
                        job.recipient_email,
                        job.id,
                        delivery.message_id
                    );
                    match self.scheduler.mark_sent(job.id).await {
                        Ok(true) => {}
                        Ok(false) => tracing::warn!(
                            "Follow-up {} was cancelled while it was being sent",
                            job.id
                        ),
                        Err(e) => {
                            tracing::error!("Failed to mark follow-up {} as sent: {e}", job.id)
                        }
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    self.record_failure(&job, &e.to_string()).await;
                }
            }

            if index + 1 < total && !self.settings.batch_delay.is_zero() {
                tokio::time::sleep(self.settings.batch_delay).await;
            }
        }

        tracing::info!(
            "Follow-up batch done: {} sent, {} failed, {} deferred, {} cancelled",
            summary.sent,
            summary.failed,
            summary.deferred,
            summary.cancelled
        );
        Ok(Some(summary))
    }

    async fn deliver(&self, job: &FollowUpJob) -> Result<transport::Delivery, DeliveryError> {
        let email = self.render(job).await?;
        let delivery = transport::send_with_timeout(
            self.transport.as_ref(),
            &email,
            self.settings.transport_timeout,
        )
        .await?;
        Ok(delivery)
    }

    /// Build the mail for a job from its template as it is on disk right now.
    pub async fn render(&self, job: &FollowUpJob) -> Result<OutgoingEmail, DeliveryError> {
        let source = self.templates.load(&job.template_name).await?;

        let discount = job
            .metadata
            .get("discount_percentage")
            .and_then(|v| v.as_i64())
            .unwrap_or(DEFAULT_DISCOUNT);

        let vars = json!({
            "name": template::escape_html(&job.recipient_name),
            "discount": discount,
        });

        Ok(OutgoingEmail::html(
            &job.recipient_email,
            &self.settings.from,
            &job.subject,
            template::render(&source, &vars),
        ))
    }

    async fn record_failure(&self, job: &FollowUpJob, reason: &str) {
        match self.scheduler.mark_failed(job.id, reason).await {
            Ok(Some(updated)) if updated.is(FollowUpStatus::Failed) => {
                tracing::error!(
                    "Follow-up {} ({}) to {} failed permanently after {} attempts: {reason}",
                    job.id,
                    job.email_type,
                    job.recipient_email,
                    updated.retry_count
                );
            }
            Ok(Some(updated)) => {
                tracing::warn!(
                    "Follow-up {} ({}) failed, attempt {}/{}: {reason}",
                    job.id,
                    job.email_type,
                    updated.retry_count,
                    updated.max_retries
                );
            }
            Ok(None) => {
                tracing::info!("Follow-up {} was cancelled while sending", job.id);
            }
            Err(e) => {
                tracing::error!("Failed to record failure for follow-up {}: {e}", job.id);
            }
        }
    }
}
