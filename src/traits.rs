use crate::model::{GroupRef, HarvestJob, HarvestRecord, HarvestSource, TargetPackage};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Persistence and catalog operations provided by the host application.
#[async_trait]
pub trait CatalogHost: Send + Sync {
    /// Creates and persists a new record under `job`, returning it with its storage id.
    async fn create_record(
        &self,
        job: &HarvestJob,
        identifier: &str,
    ) -> Result<HarvestRecord, HostError>;

    /// Persists the current state of `record` (content, state, package link).
    async fn save_record(&self, record: &HarvestRecord) -> Result<(), HostError>;

    async fn load_record(&self, record_id: &str) -> Result<HarvestRecord, HostError>;

    /// Job-level error sink.
    async fn record_job_error(&self, job: &HarvestJob, message: &str);

    /// Record-level error sink.
    async fn record_object_error(&self, record: &HarvestRecord, message: &str);

    /// Looks a group up by its id; returns the stored group id.
    async fn lookup_group(&self, group: &GroupRef) -> Result<String, HostError>;

    /// Creates a group; returns the stored group id.
    async fn create_group(&self, group: &GroupRef) -> Result<String, HostError>;

    /// Owning organization of the source, copied onto every package it produces.
    async fn owning_organization(&self, source: &HarvestSource)
        -> Result<Option<String>, HostError>;

    /// Creates the package or updates the existing one with the same id; returns its id.
    async fn create_or_update_package(
        &self,
        package: &TargetPackage,
        record: &HarvestRecord,
    ) -> Result<String, HostError>;
}
