use std::sync::Arc;

use groupdesk_core::{Agency, AgencyRepository, FlightGroupRepository, Role, User, UserRepository};
use groupdesk_inventory::{InventoryPolicy, InventoryService};
use groupdesk_store::app_config::{BootstrapConfig, InventoryConfig};

use crate::auth::hash_password;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
    pub bcrypt_cost: u32,
}

#[derive(Clone)]
pub struct AppState {
    pub agencies: Arc<dyn AgencyRepository>,
    pub users: Arc<dyn UserRepository>,
    pub groups: Arc<dyn FlightGroupRepository>,
    pub inventory: InventoryService,
    pub auth: AuthConfig,
}

pub fn inventory_policy(config: &InventoryConfig) -> anyhow::Result<InventoryPolicy> {
    let hold_ttl = i64::try_from(config.hold_ttl_seconds)
        .ok()
        .and_then(chrono::TimeDelta::try_seconds)
        .ok_or_else(|| anyhow::anyhow!("hold ttl of {}s is out of range", config.hold_ttl_seconds))?;
    Ok(InventoryPolicy {
        hold_ttl,
        retry_backoff: std::time::Duration::from_millis(config.retry_backoff_ms),
        enforce_single_currency: config.enforce_single_currency,
    })
}

/// Creates the first agency and its administrator when the store is empty.
/// Returns whether anything was created.
pub async fn bootstrap_admin(state: &AppState, seed: &BootstrapConfig) -> anyhow::Result<bool> {
    if !state.agencies.list().await?.is_empty() {
        return Ok(false);
    }

    let agency = Agency::new(&seed.agency_name, &seed.agency_code, None)?;
    let agency = state.agencies.create(&agency).await?;

    let hash = hash_password(seed.admin_password.expose().clone(), state.auth.bcrypt_cost)
        .await?;
    let admin = User::new(agency.id, &seed.admin_username, hash, Role::Admin)?;
    let admin = state.users.create(&admin).await?;

    tracing::info!("Bootstrapped agency {} with administrator {}", agency.code, admin.username);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inventory_policy_from_config() {
        let policy = inventory_policy(&InventoryConfig::default()).unwrap();
        assert_eq!(policy.hold_ttl, chrono::Duration::minutes(15));
        assert_eq!(policy.retry_backoff, std::time::Duration::from_millis(50));

        let config = InventoryConfig { hold_ttl_seconds: u64::MAX, ..InventoryConfig::default() };
        assert!(inventory_policy(&config).is_err());
    }
}
