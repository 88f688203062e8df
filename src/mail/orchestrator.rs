use std::sync::Arc;

use tokio::task::JoinHandle;
use uuid::Uuid;

use super::followup::FollowUpScheduler;
use super::notifications::EmailKind;
use super::queue::{EmailJob, EmailQueue};
use crate::models::LeadSnapshot;

/// Starts every mail a lead is owed. Nothing here can fail the caller:
/// scheduling errors are logged and the immediate mails are still queued.
#[derive(Clone)]
pub struct LeadMailer {
    queue: Arc<EmailQueue>,
    scheduler: Arc<FollowUpScheduler>,
}

impl LeadMailer {
    pub fn new(queue: Arc<EmailQueue>, scheduler: Arc<FollowUpScheduler>) -> Self {
        Self { queue, scheduler }
    }

    /// Persist the follow-up sequence in the background and queue the admin
    /// and user notifications. The returned handle resolves once scheduling
    /// has finished, successfully or not.
    pub fn on_lead_created(&self, lead: LeadSnapshot) -> JoinHandle<()> {
        let scheduler = Arc::clone(&self.scheduler);
        let snapshot = lead.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = scheduler.schedule_follow_ups(&snapshot).await {
                tracing::error!("Failed to schedule follow-ups for lead {}: {e}", snapshot.id);
            }
        });

        self.queue
            .enqueue(EmailJob::new(EmailKind::AdminNotification, lead.clone()));
        self.queue
            .enqueue(EmailJob::new(EmailKind::UserConfirmation, lead));

        handle
    }

    /// Stop the follow-up sequence of a lead.
    pub async fn on_lead_deleted(&self, lead_id: Uuid) -> Result<u64, sqlx::Error> {
        self.scheduler.cancel_for_lead(lead_id).await
    }
}
