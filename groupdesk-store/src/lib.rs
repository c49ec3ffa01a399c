pub mod agency_repo;
pub mod app_config;
pub mod database;
pub mod error;
pub mod flight_group_repo;
pub mod ledger_repo;
pub mod memory;
pub mod redis_repo;
mod rows;
pub mod user_repo;

pub use agency_repo::StoreAgencyRepository;
pub use database::DbClient;
pub use error::StoreError;
pub use flight_group_repo::StoreFlightGroupRepository;
pub use ledger_repo::StoreInventoryLedger;
pub use memory::{MemoryJobQueue, MemoryStore};
pub use redis_repo::RedisClient;
pub use user_repo::StoreUserRepository;
