use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Background queues. Workers for both are placeholders that only log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueName {
    Email,
    PnrSync,
}

impl QueueName {
    pub const ALL: [QueueName; 2] = [QueueName::Email, QueueName::PnrSync];

    /// Redis list key backing the queue.
    pub fn key(&self) -> &'static str {
        match self {
            QueueName::Email => "jobs:email",
            QueueName::PnrSync => "jobs:pnr-sync",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailJob {
    pub id: Uuid,
    pub agency_id: Uuid,
    pub template: String,
    pub subject: String,
    pub context: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PnrSyncJob {
    pub id: Uuid,
    pub flight_group_id: Uuid,
    pub hold_id: Uuid,
    pub pax_type: String,
    pub seats: i32,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    Email(EmailJob),
    PnrSync(PnrSyncJob),
}

impl Job {
    pub fn queue(&self) -> QueueName {
        match self {
            Job::Email(_) => QueueName::Email,
            Job::PnrSync(_) => QueueName::PnrSync,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Job::Email(job) => job.id,
            Job::PnrSync(job) => job.id,
        }
    }

    pub fn email(agency_id: Uuid, template: &str, subject: &str, context: serde_json::Value) -> Self {
        Job::Email(EmailJob {
            id: Uuid::new_v4(),
            agency_id,
            template: template.to_string(),
            subject: subject.to_string(),
            context,
            enqueued_at: Utc::now(),
        })
    }

    pub fn pnr_sync(flight_group_id: Uuid, hold_id: Uuid, pax_type: &str, seats: i32) -> Self {
        Job::PnrSync(PnrSyncJob {
            id: Uuid::new_v4(),
            flight_group_id,
            hold_id,
            pax_type: pax_type.to_string(),
            seats,
            enqueued_at: Utc::now(),
        })
    }
}
