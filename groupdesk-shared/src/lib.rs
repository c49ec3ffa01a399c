pub mod models;
pub mod pii;

pub use models::jobs::{EmailJob, Job, PnrSyncJob, QueueName};
pub use pii::Masked;
