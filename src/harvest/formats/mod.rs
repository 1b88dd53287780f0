//! Metadata schema registry.
//!
//! A schema is pure configuration: a table of logical field names to
//! extraction rules plus the namespace bindings the rule paths use. Adding a
//! metadata format means registering one more table.
//!
//! Built-in tables:
//! - [`dublin_core`] - `oai_dc`
//! - [`ddi`] - `oai_ddi`

pub mod ddi;
pub mod dublin_core;

use std::collections::HashMap;

use crate::harvest::traits::HarvestError;
use crate::harvest::xml::{XmlElement, XmlPath};
use crate::model::{ContentMapping, ContentValue};

/// Cardinality of an extracted field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// First matching value, stored as a single string
    Single,
    /// All matching values in document order
    TextList,
}

/// How to extract one logical field.
///
/// Values of all `paths` are concatenated in the order the paths are listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRule {
    pub kind: FieldKind,
    pub paths: Vec<String>,
}

/// Declarative field table for one metadata format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataSchema {
    pub fields: Vec<(String, FieldRule)>,
    pub namespaces: Vec<(String, String)>,
}

impl MetadataSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(mut self, prefix: &str, uri: &str) -> Self {
        self.namespaces.push((prefix.to_string(), uri.to_string()));
        self
    }

    pub fn text_list(self, field: &str, path: &str) -> Self {
        self.rule(field, FieldKind::TextList, &[path])
    }

    pub fn single(self, field: &str, path: &str) -> Self {
        self.rule(field, FieldKind::Single, &[path])
    }

    pub fn rule(mut self, field: &str, kind: FieldKind, paths: &[&str]) -> Self {
        self.fields.push((
            field.to_string(),
            FieldRule {
                kind,
                paths: paths.iter().map(|p| p.to_string()).collect(),
            },
        ));
        self
    }
}

struct CompiledField {
    name: String,
    kind: FieldKind,
    paths: Vec<XmlPath>,
}

/// Registry of metadata formats keyed by OAI metadata prefix.
#[derive(Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Vec<CompiledField>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `oai_dc` and `oai_ddi` tables.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        // Built-in tables are covered by tests; a failure here is a programming error.
        for (format, schema) in [
            (dublin_core::METADATA_PREFIX, dublin_core::schema()),
            (ddi::METADATA_PREFIX, ddi::schema()),
        ] {
            if let Err(e) = registry.register(format, schema) {
                tracing::error!(format, error = %e, "Built-in schema failed to compile");
            }
        }
        registry
    }

    /// Registers (or replaces) the table for `format`.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::ExtractionFailed`] if a path does not compile
    /// against the schema's namespace bindings.
    pub fn register(&mut self, format: &str, schema: MetadataSchema) -> Result<(), HarvestError> {
        let fields = schema
            .fields
            .iter()
            .map(|(name, rule)| {
                let paths = rule
                    .paths
                    .iter()
                    .map(|p| XmlPath::compile(p, &schema.namespaces))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| HarvestError::ExtractionFailed(format!("{format}.{name}: {e}")))?;
                Ok(CompiledField {
                    name: name.clone(),
                    kind: rule.kind,
                    paths,
                })
            })
            .collect::<Result<Vec<_>, HarvestError>>()?;

        self.schemas.insert(format.to_string(), fields);
        Ok(())
    }

    pub fn supports(&self, format: &str) -> bool {
        self.schemas.contains_key(format)
    }

    /// Extracts a [`ContentMapping`] from a parsed metadata document.
    ///
    /// Fields whose paths match nothing are left out of the mapping.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::UnsupportedFormat`] for an unregistered format.
    pub fn extract(
        &self,
        format: &str,
        document: &XmlElement,
    ) -> Result<ContentMapping, HarvestError> {
        let fields = self
            .schemas
            .get(format)
            .ok_or_else(|| HarvestError::UnsupportedFormat(format.to_string()))?;

        let mut content = ContentMapping::new();
        for field in fields {
            let mut values: Vec<String> = field
                .paths
                .iter()
                .flat_map(|path| path.evaluate(document))
                .collect();
            if values.is_empty() {
                continue;
            }
            let value = match field.kind {
                FieldKind::Single => ContentValue::Text(values.swap_remove(0)),
                FieldKind::TextList => ContentValue::List(values),
            };
            content.insert(field.name.clone(), value);
        }
        Ok(content)
    }

    /// Parses `raw` and extracts it, see [`SchemaRegistry::extract`].
    ///
    /// # Errors
    ///
    /// Also returns [`HarvestError::ExtractionFailed`] for a malformed document.
    pub fn extract_str(&self, format: &str, raw: &str) -> Result<ContentMapping, HarvestError> {
        if !self.supports(format) {
            return Err(HarvestError::UnsupportedFormat(format.to_string()));
        }
        let document =
            XmlElement::parse(raw).map_err(|e| HarvestError::ExtractionFailed(e.to_string()))?;
        self.extract(format, &document)
    }
}
