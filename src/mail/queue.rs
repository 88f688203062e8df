use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::notifications::{EmailKind, Notifier};
use super::transport::{self, Delivery, DeliveryTransport};
use super::DeliveryError;
use crate::clock::Clock;
use crate::models::LeadSnapshot;
use crate::rate_limit::{Blocked, SendRateLimiter};

/// An immediate notification waiting in memory.
#[derive(Debug, Clone)]
pub struct EmailJob {
    pub kind: EmailKind,
    pub lead: LeadSnapshot,
    pub retry_count: u32,
    /// Not eligible before this instant; set when the job is parked behind a rate limit.
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl EmailJob {
    pub fn new(kind: EmailKind, lead: LeadSnapshot) -> Self {
        Self {
            kind,
            lead,
            retry_count: 0,
            scheduled_for: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub send_delay: Duration,
    pub max_retries: u32,
    pub transport_timeout: Duration,
}

/// Why a drain pass stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Another drain was already running; nothing was done.
    AlreadyRunning,
    /// The queue is empty.
    Empty,
    /// The head job is not due until the given time.
    Waiting(DateTime<Utc>),
    /// The send budget is exhausted; the head job was parked until the window resets.
    RateLimited(Blocked),
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: bool,
    pub rate_limits: RateLimitStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStats {
    pub hourly: String,
    pub daily: String,
    pub hourly_resets_at: DateTime<Utc>,
    pub daily_resets_at: DateTime<Utc>,
}

/// In-memory FIFO of immediate notifications, drained one job at a time.
///
/// The head job blocks the queue: nothing behind it is sent while it waits
/// for its `scheduled_for` time or for the rate limit. A failed job goes to
/// the tail so the others get their turn first.
pub struct EmailQueue {
    jobs: Mutex<VecDeque<EmailJob>>,
    processing: AtomicBool,
    limiter: Arc<SendRateLimiter>,
    transport: Arc<dyn DeliveryTransport>,
    notifier: Notifier,
    clock: Arc<dyn Clock>,
    settings: QueueSettings,
}

/// Clears the processing flag even if a drain panics.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl EmailQueue {
    pub fn new(
        limiter: Arc<SendRateLimiter>,
        transport: Arc<dyn DeliveryTransport>,
        notifier: Notifier,
        clock: Arc<dyn Clock>,
        settings: QueueSettings,
    ) -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            processing: AtomicBool::new(false),
            limiter,
            transport,
            notifier,
            clock,
            settings,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<EmailJob>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a job to the tail without starting a drain.
    pub fn push(&self, job: EmailJob) -> usize {
        let mut jobs = self.lock();
        jobs.push_back(job);
        jobs.len()
    }

    /// Append a job and start draining if the queue is idle.
    pub fn enqueue(self: &Arc<Self>, job: EmailJob) {
        let kind = job.kind;
        let lead_id = job.lead.id;
        let size = self.push(job);
        tracing::info!("Queued {kind} email for lead {lead_id} (queue size: {size})");
        self.trigger();
    }

    /// Spawn a drain unless one is running or there is nothing to do.
    pub fn trigger(self: &Arc<Self>) {
        if self.is_processing() || self.len() == 0 {
            return;
        }
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = queue.drain().await;
            tracing::debug!("Queue drain finished: {outcome:?}");
        });
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Send jobs from the head until the queue empties or the head has to wait.
    /// Never runs concurrently with itself.
    pub async fn drain(&self) -> DrainOutcome {
        loop {
            let outcome = self.drain_pass().await;
            // A job pushed between the last empty check and the flag being
            // cleared saw a running drain and did not start its own.
            if outcome != DrainOutcome::Empty || self.is_empty() {
                return outcome;
            }
        }
    }

    async fn drain_pass(&self) -> DrainOutcome {
        if self
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return DrainOutcome::AlreadyRunning;
        }
        let _guard = ProcessingGuard(&self.processing);

        let outcome = loop {
            let job = {
                let mut jobs = self.lock();
                let Some(head) = jobs.front_mut() else {
                    break DrainOutcome::Empty;
                };

                let now = self.clock.now();
                if let Some(at) = head.scheduled_for.filter(|at| *at > now) {
                    tracing::info!("Next queued email not due until {at}, waiting");
                    break DrainOutcome::Waiting(at);
                }

                self.limiter.reset_if_expired();
                if let Err(blocked) = self.limiter.check() {
                    tracing::warn!(
                        "{:?} mail limit reached ({}/{}), next email at {}",
                        blocked.window,
                        blocked.used,
                        blocked.cap,
                        blocked.resets_at
                    );
                    head.scheduled_for = Some(blocked.resets_at);
                    break DrainOutcome::RateLimited(blocked);
                }

                match jobs.pop_front() {
                    Some(job) => job,
                    None => break DrainOutcome::Empty,
                }
            };

            self.process(job).await;
        };

        tracing::info!("Queue processing stopped, {} job(s) remaining", self.len());
        outcome
    }

    async fn process(&self, mut job: EmailJob) {
        let usage = self.limiter.usage();
        tracing::info!(
            "Sending {} for lead {} (hourly {}, daily {})",
            job.kind,
            job.lead.id,
            usage.hourly.display(),
            usage.daily.display()
        );

        match self.deliver(&job).await {
            Ok(delivery) => {
                self.limiter.increment();
                tracing::info!(
                    "Sent {} for lead {} (message id {:?})",
                    job.kind,
                    job.lead.id,
                    delivery.message_id
                );

                if !self.is_empty() && !self.settings.send_delay.is_zero() {
                    tokio::time::sleep(self.settings.send_delay).await;
                }
            }
            Err(e) => {
                job.retry_count += 1;
                if job.retry_count < self.settings.max_retries {
                    tracing::warn!(
                        "Failed to send {} for lead {} (attempt {}/{}): {e}",
                        job.kind,
                        job.lead.id,
                        job.retry_count,
                        self.settings.max_retries
                    );
                    self.push(job);
                } else {
                    tracing::error!(
                        "Discarding {} for lead {} after {} attempts: {e}",
                        job.kind,
                        job.lead.id,
                        job.retry_count
                    );
                }
            }
        }
    }

    async fn deliver(&self, job: &EmailJob) -> Result<Delivery, DeliveryError> {
        let email = self
            .notifier
            .build(job.kind, &job.lead)
            .map_err(DeliveryError::Render)?;

        let delivery = transport::send_with_timeout(
            self.transport.as_ref(),
            &email,
            self.settings.transport_timeout,
        )
        .await?;

        Ok(delivery)
    }

    pub fn stats(&self) -> QueueStats {
        let usage = self.limiter.usage();
        QueueStats {
            pending: self.len(),
            processing: self.is_processing(),
            rate_limits: RateLimitStats {
                hourly: usage.hourly.display(),
                daily: usage.daily.display(),
                hourly_resets_at: usage.hourly.resets_at,
                daily_resets_at: usage.daily.resets_at,
            },
        }
    }
}
