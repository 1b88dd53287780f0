//! In-memory [`CatalogHost`] implementation for tests and local runs.
//!
//! Records, packages and groups live in plain collections behind one
//! `std::sync::RwLock`. Packages are keyed by id, so create-or-update with
//! the same id replaces the stored package; a different id claiming an
//! existing package name is a conflict, as in a real catalog.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::model::{GroupRef, HarvestJob, HarvestRecord, HarvestSource, TargetPackage};
use crate::traits::{CatalogHost, HostError};

#[derive(Default)]
struct CatalogState {
    /// Insertion order is gather order
    records: Vec<HarvestRecord>,
    job_errors: Vec<(String, String)>,
    object_errors: Vec<(String, String)>,
    packages: BTreeMap<String, TargetPackage>,
    groups: BTreeMap<String, GroupRef>,
    /// source id to owning organization
    organizations: HashMap<String, String>,
}

impl CatalogState {
    /// Clears `current` on every other record harvesting the same identifier
    /// or linked to the same package.
    fn supersede(&mut self, record: &HarvestRecord) {
        for other in self.records.iter_mut().filter(|r| r.id != record.id && r.current) {
            let same_package = record.package_id.is_some() && other.package_id == record.package_id;
            if other.identifier == record.identifier || same_package {
                debug!(record_id = %other.id, superseded_by = %record.id, "Record superseded");
                other.current = false;
            }
        }
    }
}

/// In-process catalog host.
#[derive(Default)]
pub struct InMemoryCatalog {
    state: RwLock<CatalogState>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the owning organization reported for `source_id`.
    ///
    /// Sources without an entry fall back to their own `owner_org`.
    pub fn with_organization(self, source_id: &str, organization: &str) -> Self {
        self.write_or_recover()
            .organizations
            .insert(source_id.to_string(), organization.to_string());
        self
    }

    /// Records of `job_id` in creation order.
    pub fn records_for_job(&self, job_id: &str) -> Vec<HarvestRecord> {
        self.read_or_recover()
            .records
            .iter()
            .filter(|r| r.job_id == job_id)
            .cloned()
            .collect()
    }

    pub fn job_errors(&self, job_id: &str) -> Vec<String> {
        self.read_or_recover()
            .job_errors
            .iter()
            .filter(|(job, _)| job == job_id)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn object_errors(&self, record_id: &str) -> Vec<String> {
        self.read_or_recover()
            .object_errors
            .iter()
            .filter(|(record, _)| record == record_id)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn packages(&self) -> Vec<TargetPackage> {
        self.read_or_recover().packages.values().cloned().collect()
    }

    pub fn package(&self, id: &str) -> Option<TargetPackage> {
        self.read_or_recover().packages.get(id).cloned()
    }

    pub fn groups(&self) -> Vec<GroupRef> {
        self.read_or_recover().groups.values().cloned().collect()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, CatalogState>, HostError> {
        self.state
            .read()
            .map_err(|_| HostError::Storage("catalog lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, CatalogState>, HostError> {
        self.state
            .write()
            .map_err(|_| HostError::Storage("catalog lock poisoned".to_string()))
    }

    // Inspection and error sinks cannot fail, so they read through poisoning.
    fn read_or_recover(&self) -> RwLockReadGuard<'_, CatalogState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_or_recover(&self) -> RwLockWriteGuard<'_, CatalogState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CatalogHost for InMemoryCatalog {
    async fn create_record(
        &self,
        job: &HarvestJob,
        identifier: &str,
    ) -> Result<HarvestRecord, HostError> {
        let record = HarvestRecord::new(Uuid::new_v4().to_string(), &job.id, identifier);
        self.write()?.records.push(record.clone());
        Ok(record)
    }

    async fn save_record(&self, record: &HarvestRecord) -> Result<(), HostError> {
        let mut state = self.write()?;
        let stored = state
            .records
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| HostError::NotFound(format!("record {}", record.id)))?;
        *stored = record.clone();
        if record.current {
            state.supersede(record);
        }
        Ok(())
    }

    async fn load_record(&self, record_id: &str) -> Result<HarvestRecord, HostError> {
        self.read()?
            .records
            .iter()
            .find(|r| r.id == record_id)
            .cloned()
            .ok_or_else(|| HostError::NotFound(format!("record {record_id}")))
    }

    async fn record_job_error(&self, job: &HarvestJob, message: &str) {
        self.write_or_recover()
            .job_errors
            .push((job.id.clone(), message.to_string()));
    }

    async fn record_object_error(&self, record: &HarvestRecord, message: &str) {
        self.write_or_recover()
            .object_errors
            .push((record.id.clone(), message.to_string()));
    }

    async fn lookup_group(&self, group: &GroupRef) -> Result<String, HostError> {
        let state = self.read()?;
        state
            .groups
            .get(&group.id)
            .or_else(|| state.groups.values().find(|g| g.name == group.name))
            .map(|g| g.id.clone())
            .ok_or_else(|| HostError::NotFound(format!("group {}", group.id)))
    }

    async fn create_group(&self, group: &GroupRef) -> Result<String, HostError> {
        let mut state = self.write()?;
        if state.groups.values().any(|g| g.name == group.name) {
            return Err(HostError::Conflict(format!(
                "group name '{}' already in use",
                group.name
            )));
        }
        debug!(group_id = %group.id, name = %group.name, "Created group");
        state.groups.insert(group.id.clone(), group.clone());
        Ok(group.id.clone())
    }

    async fn owning_organization(
        &self,
        source: &HarvestSource,
    ) -> Result<Option<String>, HostError> {
        Ok(self
            .read()?
            .organizations
            .get(&source.id)
            .cloned()
            .or_else(|| source.owner_org.clone()))
    }

    async fn create_or_update_package(
        &self,
        package: &TargetPackage,
        record: &HarvestRecord,
    ) -> Result<String, HostError> {
        let mut state = self.write()?;
        if let Some(other) = state
            .packages
            .values()
            .find(|p| p.name == package.name && p.id != package.id)
        {
            return Err(HostError::Conflict(format!(
                "package name '{}' already used by {}",
                package.name, other.id
            )));
        }
        let updated = state
            .packages
            .insert(package.id.clone(), package.clone())
            .is_some();
        let linked = HarvestRecord {
            package_id: Some(package.id.clone()),
            ..record.clone()
        };
        state.supersede(&linked);
        debug!(
            package_id = %package.id,
            identifier = %record.identifier,
            updated,
            "Stored package"
        );
        Ok(package.id.clone())
    }
}
