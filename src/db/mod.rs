pub mod admin_users;
pub mod follow_ups;
pub mod leads;
