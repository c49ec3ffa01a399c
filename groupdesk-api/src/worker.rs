use std::sync::Arc;

use chrono::Utc;
use groupdesk_core::JobQueue;
use groupdesk_inventory::InventoryService;
use groupdesk_shared::{Job, QueueName};
use tokio::time::{sleep, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

/// Releases expired holds back to their buckets on a fixed interval.
pub async fn start_expiry_sweeper(inventory: InventoryService, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Hold expiry sweeper started, running every {:?}", every);

    loop {
        ticker.tick().await;
        match inventory.sweep_expired(Utc::now()).await {
            Ok(0) => {}
            Ok(expired) => info!("Expired {} stale holds", expired),
            Err(e) => error!("Hold expiry sweep failed: {}", e),
        }
    }
}

/// Drains one job queue. Delivery is a log line until an outbound
/// integration exists for the queue.
pub async fn start_job_consumer(jobs: Arc<dyn JobQueue>, queue: QueueName, poll_interval: Duration) {
    info!("Job consumer for {} started", queue.key());

    loop {
        match jobs.dequeue(queue).await {
            Ok(Some(job)) => handle_job(&job),
            Ok(None) => sleep(poll_interval).await,
            Err(e) => {
                error!("Failed to read from {}: {}", queue.key(), e);
                sleep(poll_interval).await;
            }
        }
    }
}

fn handle_job(job: &Job) {
    match job {
        Job::Email(email) => info!(
            "Email job {}: template {} for agency {} ({})",
            email.id, email.template, email.agency_id, email.subject
        ),
        Job::PnrSync(sync) => info!(
            "PNR sync job {}: {} x {} issued on group {} (hold {})",
            sync.id, sync.seats, sync.pax_type, sync.flight_group_id, sync.hold_id
        ),
    }
}

/// Spawns the sweeper and one consumer per queue.
pub fn spawn_all(inventory: InventoryService, jobs: Arc<dyn JobQueue>, sweep_every: Duration, poll_interval: Duration) {
    if sweep_every.is_zero() {
        warn!("Hold expiry sweeper disabled");
    } else {
        tokio::spawn(start_expiry_sweeper(inventory, sweep_every));
    }
    for queue in QueueName::ALL {
        tokio::spawn(start_job_consumer(jobs.clone(), queue, poll_interval));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groupdesk_store::MemoryJobQueue;

    #[tokio::test]
    async fn test_consumer_drains_queue() {
        let queue = Arc::new(MemoryJobQueue::new());
        queue
            .enqueue(&Job::pnr_sync(uuid::Uuid::new_v4(), uuid::Uuid::new_v4(), "ADT", 4))
            .await
            .unwrap();
        queue
            .enqueue(&Job::pnr_sync(uuid::Uuid::new_v4(), uuid::Uuid::new_v4(), "CHD", 1))
            .await
            .unwrap();

        let jobs: Arc<dyn JobQueue> = queue.clone();
        let handle = tokio::spawn(start_job_consumer(jobs, QueueName::PnrSync, Duration::from_millis(5)));

        for _ in 0..100 {
            if queue.len(QueueName::PnrSync).await == 0 {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
        handle.abort();
        assert_eq!(queue.len(QueueName::PnrSync).await, 0);
    }
}
