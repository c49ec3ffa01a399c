pub mod pricing;
pub mod service;

pub use pricing::FareQuote;
pub use service::{InventoryPolicy, InventoryService};
