//! OAI-PMH harvester producing data-portal catalog packages.
//!
//! The harvester runs in three stages against a host catalog:
//! - **Gather**: list every identifier of a remote repository into records
//! - **Fetch**: retrieve each record and normalize its metadata
//! - **Import**: map the normalized content onto a catalog package
//!
//! The host side is abstracted by [`traits::CatalogHost`]; [`memory::InMemoryCatalog`]
//! is a complete in-process implementation and [`executor::HarvestExecutor`]
//! drives a whole job through all three stages.

pub mod config;
pub mod executor;
pub mod harvest;
pub mod logging;
pub mod memory;
pub mod model;
pub mod munge;
pub mod traits;

// Re-export common types for convenience
pub use config::*;
pub use executor::*;
pub use harvest::{HttpClientFactory, OaipmhHarvester};
pub use logging::init_logging;
pub use memory::InMemoryCatalog;
pub use model::*;
pub use traits::*;
