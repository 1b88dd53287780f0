//! Core traits and types for the OAI-PMH harvest pipeline.
//!
//! This module defines the seams of the harvester:
//! - Protocol access via [`OaiClient`], built per call by a [`ClientFactory`]
//! - Extension points via [`HarvestHooks`]
//! - Standardized error handling via [`HarvestError`]

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

use crate::config::SourceConfig;
use crate::harvest::xml::XmlElement;
use crate::model::{ContentMapping, HarvestRecord, HarvestSource, TargetPackage};
use crate::traits::HostError;

// ============================================================================
// Protocol Client Trait
// ============================================================================

/// OAI-level record header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub identifier: String,

    /// Raw `datestamp` as sent by the repository (`YYYY-MM-DD` or full UTC time)
    pub datestamp: Option<String>,

    /// `setSpec` memberships in document order
    pub set_specs: Vec<String>,

    pub deleted: bool,
}

/// A record returned by `GetRecord`: its header plus the metadata document.
///
/// `metadata` is the single element child of the OAI `<metadata>` container,
/// e.g. `<oai_dc:dc>` for Dublin Core.
#[derive(Debug, Clone)]
pub struct OaiRecord {
    pub header: RecordHeader,
    pub metadata: XmlElement,
}

/// Access to a remote OAI-PMH repository.
///
/// Implementations are cheap to construct and are rebuilt for every pipeline
/// call, so they must not carry state between calls.
#[async_trait]
pub trait OaiClient: Send + Sync {
    /// Performs an `Identify` handshake.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::SourceUnreachable`] on any network or protocol error.
    async fn identify(&self) -> Result<(), HarvestError>;

    /// Lists identifiers one page at a time, following resumption tokens.
    ///
    /// Each call starts a fresh listing. The `set` argument is only sent when
    /// `set_spec` is `Some`.
    ///
    /// # Errors
    ///
    /// Items are [`HarvestError::ListingFailed`] when a page cannot be retrieved;
    /// the stream ends after the first error.
    fn list_identifiers<'a>(
        &'a self,
        metadata_prefix: &'a str,
        set_spec: Option<&'a str>,
    ) -> BoxStream<'a, Result<String, HarvestError>>;

    /// Retrieves one full record.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::RecordFetchFailed`] if the record is missing,
    /// deleted, or the response is malformed.
    async fn get_record(
        &self,
        identifier: &str,
        metadata_prefix: &str,
    ) -> Result<OaiRecord, HarvestError>;
}

/// Builds an [`OaiClient`] for a source.
pub trait ClientFactory: Send + Sync {
    fn build(
        &self,
        source: &HarvestSource,
        config: &SourceConfig,
    ) -> Result<Box<dyn OaiClient>, HarvestError>;
}

impl<F> ClientFactory for F
where
    F: Fn(&HarvestSource, &SourceConfig) -> Result<Box<dyn OaiClient>, HarvestError> + Send + Sync,
{
    fn build(
        &self,
        source: &HarvestSource,
        config: &SourceConfig,
    ) -> Result<Box<dyn OaiClient>, HarvestError> {
        self(source, config)
    }
}

// ============================================================================
// Extension Hooks
// ============================================================================

/// Optional customization points around fetch and import.
///
/// All methods default to no-ops.
pub trait HarvestHooks: Send + Sync {
    /// Called before `GetRecord` is issued for `record`.
    fn before_record_fetch(&self, _record: &HarvestRecord) {}

    /// Called after a record was retrieved successfully.
    fn after_record_fetch(&self, _record: &OaiRecord) {}

    /// Last chance to change the assembled package before it is handed to the host.
    ///
    /// # Errors
    ///
    /// An error fails the import of this record.
    fn extend_package(
        &self,
        _content: &ContentMapping,
        package: TargetPackage,
    ) -> Result<TargetPackage, HarvestError> {
        Ok(package)
    }
}

/// [`HarvestHooks`] that changes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl HarvestHooks for NoHooks {}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during harvesting.
#[derive(Error, Debug)]
pub enum HarvestError {
    /// Identify handshake failed
    #[error("Source unreachable: {0}")]
    SourceUnreachable(String),

    /// Identifier listing failed mid-pagination
    #[error("Listing identifiers failed: {0}")]
    ListingFailed(String),

    /// A single record could not be retrieved
    #[error("Get record failed for '{identifier}': {reason}")]
    RecordFetchFailed { identifier: String, reason: String },

    /// Metadata could not be normalized or serialized
    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    /// No schema is registered for the metadata prefix
    #[error("Unsupported metadata format: {0}")]
    UnsupportedFormat(String),

    /// Building the target package failed
    #[error("Import failed: {0}")]
    ImportAssemblyFailed(String),

    /// Import was invoked without a fetched record
    #[error("No harvest object received")]
    MissingRecord,

    /// A host operation failed
    #[error("Host operation failed: {0}")]
    Host(#[from] HostError),
}

impl HarvestError {
    pub fn fetch_failed(identifier: &str, reason: impl ToString) -> Self {
        Self::RecordFetchFailed {
            identifier: identifier.to_string(),
            reason: reason.to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
