//! Harvest module - OAI-PMH access, metadata normalization and package assembly.
//!
//! This module provides the building blocks of the harvester:
//! - **Traits**: [`OaiClient`], [`ClientFactory`], [`HarvestHooks`] seams
//! - **Client**: HTTP protocol access via [`client::HttpOaiClient`]
//! - **Formats**: declarative metadata schemas in [`formats::SchemaRegistry`]
//! - **Mapping**: content to package assembly in [`mapping`]
//! - **Pipeline**: gather, fetch and import via [`pipeline::OaipmhHarvester`]

pub mod client;
pub mod formats;
pub mod mapping;
pub mod pipeline;
pub mod traits;
pub mod xml;

// Re-export commonly used types
pub use traits::{
    ClientFactory, HarvestError, HarvestHooks, NoHooks, OaiClient, OaiRecord, RecordHeader,
};

pub use client::{HttpClientFactory, HttpOaiClient, RequestError};
pub use formats::{FieldKind, MetadataSchema, SchemaRegistry};
pub use mapping::{ImportOptions, PackageIdPolicy};
pub use pipeline::OaipmhHarvester;
pub use xml::{XmlElement, XmlError, XmlPath};
