//! Dublin Core (`oai_dc`) field table.

use super::MetadataSchema;

pub const METADATA_PREFIX: &str = "oai_dc";

pub const OAI_DC_NAMESPACE: &str = "http://www.openarchives.org/OAI/2.0/oai_dc/";
pub const OAI_NAMESPACE: &str = "http://www.openarchives.org/OAI/2.0/";
pub const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";

/// The fifteen DC elements plus `maintainer_email`, which is not part of
/// Dublin Core and is read from the OAI namespace.
const FIELDS: &[(&str, &str)] = &[
    ("title", "oai_dc:dc/dc:title/text()"),
    ("creator", "oai_dc:dc/dc:creator/text()"),
    ("subject", "oai_dc:dc/dc:subject/text()"),
    ("description", "oai_dc:dc/dc:description/text()"),
    ("publisher", "oai_dc:dc/dc:publisher/text()"),
    ("maintainer_email", "oai_dc:dc/oai:maintainer_email/text()"),
    ("contributor", "oai_dc:dc/dc:contributor/text()"),
    ("date", "oai_dc:dc/dc:date/text()"),
    ("type", "oai_dc:dc/dc:type/text()"),
    ("format", "oai_dc:dc/dc:format/text()"),
    ("identifier", "oai_dc:dc/dc:identifier/text()"),
    ("source", "oai_dc:dc/dc:source/text()"),
    ("language", "oai_dc:dc/dc:language/text()"),
    ("relation", "oai_dc:dc/dc:relation/text()"),
    ("coverage", "oai_dc:dc/dc:coverage/text()"),
    ("rights", "oai_dc:dc/dc:rights/text()"),
];

pub fn schema() -> MetadataSchema {
    let schema = MetadataSchema::new()
        .namespace("oai_dc", OAI_DC_NAMESPACE)
        .namespace("oai", OAI_NAMESPACE)
        .namespace("dc", DC_NAMESPACE);
    FIELDS
        .iter()
        .fold(schema, |schema, (field, path)| schema.text_list(field, path))
}
