use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct FollowUpJob {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub email_type: String,
    pub template_name: String,
    pub subject: String,
    pub recipient_email: String,
    pub recipient_name: String,
    pub scheduled_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub status: String,
    pub retry_count: i32,
    pub max_retries: i32,
    pub error_message: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowUpStatus {
    Pending,
    Sent,
    Failed,
    Cancelled,
}

impl FollowUpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FollowUpStatus::Pending => "pending",
            FollowUpStatus::Sent => "sent",
            FollowUpStatus::Failed => "failed",
            FollowUpStatus::Cancelled => "cancelled",
        }
    }
}

impl FollowUpJob {
    pub fn is(&self, status: FollowUpStatus) -> bool {
        self.status == status.as_str()
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct FollowUpStatusCount {
    pub status: String,
    pub count: i64,
    pub earliest_scheduled: Option<DateTime<Utc>>,
    pub latest_scheduled: Option<DateTime<Utc>>,
}
