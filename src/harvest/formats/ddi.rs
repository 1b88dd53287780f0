//! DDI codebook (`oai_ddi`) field table.
//!
//! Codebook paths are deeper than Dublin Core. `subject`, `description` and
//! `publisher` also accept DC elements embedded in the codebook, which some
//! repositories use where the codebook has no equivalent.

use super::{FieldKind, MetadataSchema};
use crate::harvest::formats::dublin_core::DC_NAMESPACE;

pub const METADATA_PREFIX: &str = "oai_ddi";

pub const DDI_NAMESPACE: &str = "http://www.icpsr.umich.edu/DDI";

const STUDY: &str = "ddi:codeBook/ddi:stdyDscr";

pub fn schema() -> MetadataSchema {
    let citation = format!("{STUDY}/ddi:citation");
    let info = format!("{STUDY}/ddi:stdyInfo");

    MetadataSchema::new()
        .namespace("ddi", DDI_NAMESPACE)
        .namespace("dc", DC_NAMESPACE)
        .text_list("title", &format!("{citation}/ddi:titlStmt/ddi:titl/text()"))
        .text_list("creator", &format!("{citation}/ddi:rspStmt/ddi:AuthEnty/text()"))
        .rule(
            "subject",
            FieldKind::TextList,
            &[
                format!("{info}/ddi:subject/ddi:keyword/text()").as_str(),
                "ddi:codeBook/dc:subject/text()",
            ],
        )
        .rule(
            "description",
            FieldKind::TextList,
            &[
                format!("{info}/ddi:abstract/text()").as_str(),
                "ddi:codeBook/dc:description/text()",
            ],
        )
        .rule(
            "publisher",
            FieldKind::TextList,
            &[
                format!("{citation}/ddi:distStmt/ddi:contact/text()").as_str(),
                "ddi:codeBook/dc:publisher/text()",
            ],
        )
        .text_list("contributor", &format!("{citation}/ddi:contributor/text()"))
        .text_list("date", &format!("{citation}/ddi:prodStmt/ddi:prodDate/text()"))
        .text_list("series", &format!("{citation}/ddi:serStmt/ddi:serName/text()"))
        .text_list("type", &format!("{info}/ddi:sumDscr/ddi:dataKind/text()"))
        .text_list("format", "ddi:codeBook/ddi:fileDscr/ddi:fileType/text()")
        .text_list("identifier", &format!("{citation}/ddi:titlStmt/ddi:IDNo/text()"))
        .text_list(
            "source",
            &format!("{STUDY}/ddi:dataAccs/ddi:setAvail/ddi:accsPlac/@URI"),
        )
        .text_list("language", "ddi:codeBook/@xml:lang")
        .text_list("tempCoverage", &format!("{info}/ddi:sumDscr/ddi:timePrd/text()"))
        .text_list("geoCoverage", &format!("{info}/ddi:sumDscr/ddi:geogCover/text()"))
        .text_list(
            "rights",
            &format!("{citation}/ddi:prodStmt/ddi:copyright/text()"),
        )
}
