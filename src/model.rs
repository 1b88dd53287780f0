use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Remote endpoint configuration, owned by the host for the lifetime of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestSource {
    pub id: String,
    pub url: String,
    /// Raw JSON configuration blob, parsed permissively by [`crate::config::SourceConfig`].
    pub config: Option<String>,
    pub owner_org: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    New,
    Running,
    Finished,
    Errored,
}

/// One harvesting run against a [`HarvestSource`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestJob {
    pub id: String,
    pub source: HarvestSource,
    pub status: JobStatus,
}

impl HarvestJob {
    pub fn new(id: impl Into<String>, source: HarvestSource) -> Self {
        Self {
            id: id.into(),
            source,
            status: JobStatus::New,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordState {
    Discovered,
    Fetched,
    Imported,
    Errored,
}

/// One discovered remote item ("harvest object" on the host side).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestRecord {
    /// Host-assigned storage id
    pub id: String,
    pub job_id: String,
    /// OAI-PMH identifier, stable across runs
    pub identifier: String,
    /// JSON-serialized [`ContentMapping`], set by the fetch stage
    pub content: Option<String>,
    pub state: RecordState,
    pub package_id: Option<String>,
    pub current: bool,
    pub errors: Vec<String>,
}

impl HarvestRecord {
    pub fn new(id: impl Into<String>, job_id: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            job_id: job_id.into(),
            identifier: identifier.into(),
            content: None,
            state: RecordState::Discovered,
            package_id: None,
            current: false,
            errors: Vec::new(),
        }
    }
}

/// A single field of a [`ContentMapping`].
///
/// Schema fields are lists in document order; `metadata_modified` is a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentValue {
    List(Vec<String>),
    Text(String),
}

impl ContentValue {
    pub fn first(&self) -> Option<&str> {
        match self {
            ContentValue::List(values) => values.first().map(String::as_str),
            ContentValue::Text(text) => Some(text.as_str()),
        }
    }

    pub fn values(&self) -> Vec<&str> {
        match self {
            ContentValue::List(values) => values.iter().map(String::as_str).collect(),
            ContentValue::Text(text) => vec![text.as_str()],
        }
    }
}

/// Normalized record: field name to extracted values. Absent fields are missing keys.
pub type ContentMapping = BTreeMap<String, ContentValue>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub url: String,
    pub format: String,
    pub resource_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extra {
    pub key: String,
    pub value: Option<String>,
}

/// Group payload used for lookup-or-create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRef {
    pub id: String,
    pub name: String,
    pub title: String,
}

/// Catalog package assembled by the import stage. Rebuilt from scratch on every import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPackage {
    pub id: String,
    pub name: String,
    pub title: Option<String>,
    pub notes: Option<String>,
    pub maintainer: Option<String>,
    pub maintainer_email: Option<String>,
    pub url: Option<String>,
    pub author: Option<String>,
    pub license_id: Option<String>,
    pub owner_org: Option<String>,
    pub tags: Vec<String>,
    pub extras: Vec<Extra>,
    pub resources: Vec<Resource>,
    /// Group ids, set groups first then series groups
    pub groups: Vec<String>,
}

/// Name/title/description advertised to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvesterInfo {
    pub name: String,
    pub title: String,
    pub description: String,
}
