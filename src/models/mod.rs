pub mod admin_user;
pub mod follow_up;
pub mod lead;

pub use admin_user::AdminUser;
pub use follow_up::{FollowUpJob, FollowUpStatus, FollowUpStatusCount};
pub use lead::{Lead, LeadSnapshot, LeadStatus};
