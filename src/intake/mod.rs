pub mod metadata;
pub mod pipeline;
pub mod validate;
