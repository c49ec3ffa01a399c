//! Flight group status machine and the sales gate in front of the ledger.
//!
//! DRAFT -> PUBLISHED -> CLOSED, with CANCELLED reachable from DRAFT or
//! PUBLISHED. CLOSED and CANCELLED are terminal.

use chrono::{DateTime, Utc};

use crate::{CoreError, CoreResult, FlightGroup, FlightGroupStatus, SeatBucket};

/// Checks that `group` may move to `target`. `buckets` are the group's
/// current seat buckets; they gate publishing.
pub fn validate_transition(
    group: &FlightGroup,
    buckets: &[SeatBucket],
    target: FlightGroupStatus,
) -> CoreResult<()> {
    let from = group.status;
    let reject = |reason: &str| CoreError::InvalidTransition {
        from: from.to_string(),
        to: target.to_string(),
        reason: reason.to_string(),
    };

    match (from, target) {
        (FlightGroupStatus::Draft, FlightGroupStatus::Published) => {
            if buckets.is_empty() {
                return Err(reject("group has no seat buckets"));
            }
            if let Some(empty) = buckets.iter().find(|b| b.total_seats <= 0) {
                return Err(reject(&format!("{} bucket has no seats", empty.pax_type)));
            }
            if group.sales_start >= group.sales_end {
                return Err(reject("sales window is empty"));
            }
            Ok(())
        }
        (FlightGroupStatus::Published, FlightGroupStatus::Closed) => Ok(()),
        (FlightGroupStatus::Draft | FlightGroupStatus::Published, FlightGroupStatus::Cancelled) => Ok(()),
        (from, to) if from == to => Err(reject("group is already in this status")),
        (from, _) if from.is_terminal() => Err(reject("group is in a terminal status")),
        _ => Err(reject("transition is not allowed")),
    }
}

/// New holds need a PUBLISHED group inside its sales window.
pub fn ensure_on_sale(group: &FlightGroup, now: DateTime<Utc>) -> CoreResult<()> {
    if group.status != FlightGroupStatus::Published {
        return Err(CoreError::GroupNotOnSale {
            group_id: group.id,
            reason: format!("status is {}", group.status),
        });
    }
    if now < group.sales_start {
        return Err(CoreError::GroupNotOnSale {
            group_id: group.id,
            reason: "sales have not started".to_string(),
        });
    }
    if now > group.sales_end {
        return Err(CoreError::GroupNotOnSale {
            group_id: group.id,
            reason: "sales have ended".to_string(),
        });
    }
    Ok(())
}

/// Seat buckets can be created or changed until the group is closed or cancelled.
pub fn ensure_editable(group: &FlightGroup) -> CoreResult<()> {
    if group.status.is_terminal() {
        return Err(CoreError::InvalidTransition {
            from: group.status.to_string(),
            to: group.status.to_string(),
            reason: "seat buckets of a closed or cancelled group cannot change".to_string(),
        });
    }
    Ok(())
}

pub fn ensure_deletable(group: &FlightGroup) -> CoreResult<()> {
    if group.status != FlightGroupStatus::Draft {
        return Err(CoreError::Conflict(format!(
            "flight group {} is {}; only DRAFT groups can be deleted",
            group.id, group.status
        )));
    }
    Ok(())
}
