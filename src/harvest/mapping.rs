//! Content mapping to catalog package assembly.
//!
//! Everything here is pure: the pipeline adds the parts that need the host
//! (owning organization, group ids) on top of [`assemble_package`].

use crate::model::{ContentMapping, ContentValue, Extra, GroupRef, Resource, TargetPackage};
use crate::munge::{munge_tag, munge_title_to_name};

/// Destination package field and the content field it is read from.
pub const FIELD_MAPPING: &[(&str, &str)] = &[
    ("title", "title"),
    ("notes", "description"),
    ("maintainer", "publisher"),
    ("maintainer_email", "maintainer_email"),
    ("url", "source"),
];

/// Content fields split into tags instead of extras.
pub const TAG_FIELDS: &[&str] = &["subject", "type"];

pub const SET_SPEC_FIELD: &str = "set_spec";
pub const SERIES_FIELD: &str = "series";
pub const METADATA_MODIFIED_FIELD: &str = "metadata_modified";

/// Tag candidates are cut to this many characters before sanitizing.
pub const TAG_TRUNCATE: usize = 100;

pub const DEFAULT_RESOURCE_FORMAT: &str = "HTML";

/// How the package id is derived from the OAI identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PackageIdPolicy {
    /// id and name are both the sanitized identifier
    #[default]
    SanitizedName,
    /// id is the raw OAI identifier, name the sanitized one
    RawIdentifier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    pub id_policy: PackageIdPolicy,
    pub default_resource_format: String,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            id_policy: PackageIdPolicy::default(),
            default_resource_format: DEFAULT_RESOURCE_FORMAT.to_string(),
        }
    }
}

/// Returns `(id, name)` for a record identifier.
pub fn package_identity(identifier: &str, policy: PackageIdPolicy) -> (String, String) {
    let name = munge_title_to_name(identifier);
    match policy {
        PackageIdPolicy::SanitizedName => (name.clone(), name),
        PackageIdPolicy::RawIdentifier => (identifier.to_string(), name),
    }
}

/// Builds everything of the package that does not need the host.
pub fn assemble_package(
    identifier: &str,
    content: &ContentMapping,
    options: &ImportOptions,
) -> TargetPackage {
    let (id, name) = package_identity(identifier, options.id_policy);
    let mut package = TargetPackage {
        id,
        name,
        ..Default::default()
    };

    for (field, source) in FIELD_MAPPING {
        if let Some(value) = content.get(*source).and_then(ContentValue::first) {
            set_mapped_field(&mut package, field, value.to_string());
        }
    }

    package.author = join_values(content, "creator");
    package.license_id = join_values(content, "rights");

    let url = possible_resource_url(identifier, content);
    package.resources = extract_resources(url, identifier, content, options);

    let (tags, extras) = extract_tags_and_extras(content);
    package.tags = tags;
    package.extras = extras;

    package
}

fn set_mapped_field(package: &mut TargetPackage, field: &str, value: String) {
    let slot = match field {
        "title" => &mut package.title,
        "notes" => &mut package.notes,
        "maintainer" => &mut package.maintainer,
        "maintainer_email" => &mut package.maintainer_email,
        "url" => &mut package.url,
        _ => return,
    };
    *slot = Some(value);
}

/// All values of `field` joined with `", "`, or `None` if there are none.
pub fn join_values(content: &ContentMapping, field: &str) -> Option<String> {
    let values = content.get(field)?.values();
    (!values.is_empty()).then(|| values.join(", "))
}

/// First absolute HTTP(S) URL among the `identifier` values and then the
/// record identifier itself.
pub fn possible_resource_url<'a>(
    record_identifier: &'a str,
    content: &'a ContentMapping,
) -> Option<&'a str> {
    content
        .get("identifier")
        .map(ContentValue::values)
        .unwrap_or_default()
        .into_iter()
        .chain(std::iter::once(record_identifier))
        .find(|candidate| candidate.starts_with("http://") || candidate.starts_with("https://"))
}

/// Zero or one resource pointing at `url`.
pub fn extract_resources(
    url: Option<&str>,
    record_identifier: &str,
    content: &ContentMapping,
    options: &ImportOptions,
) -> Vec<Resource> {
    let Some(url) = url else {
        return Vec::new();
    };

    let format = content
        .get("format")
        .and_then(ContentValue::first)
        .unwrap_or(&options.default_resource_format)
        .to_string();
    let name = content
        .get("title")
        .and_then(ContentValue::first)
        .unwrap_or(record_identifier)
        .to_string();

    vec![Resource {
        name,
        url: url.to_string(),
        resource_type: format.clone(),
        format,
    }]
}

/// Raw tag candidates from `subject` and `type`: list values as they are,
/// a plain string split on `;`.
pub fn tag_candidates(content: &ContentMapping) -> Vec<&str> {
    TAG_FIELDS
        .iter()
        .filter_map(|field| content.get(*field))
        .flat_map(|value| match value {
            ContentValue::List(values) => values.iter().map(String::as_str).collect::<Vec<_>>(),
            ContentValue::Text(text) => text.split(';').collect(),
        })
        .filter(|candidate| !candidate.trim().is_empty())
        .collect()
}

/// Truncates to [`TAG_TRUNCATE`] characters, then sanitizes.
pub fn sanitize_tag(candidate: &str) -> String {
    let truncated: String = candidate.chars().take(TAG_TRUNCATE).collect();
    munge_tag(&truncated)
}

/// Splits content into sanitized tags and extras (every field that is neither
/// a tag field nor consumed by the mapping table).
pub fn extract_tags_and_extras(content: &ContentMapping) -> (Vec<String>, Vec<Extra>) {
    let tags = tag_candidates(content).into_iter().map(sanitize_tag).collect();

    let extras = content
        .iter()
        .filter(|(key, _)| {
            !FIELD_MAPPING.iter().any(|(_, source)| source == key)
                && !TAG_FIELDS.contains(&key.as_str())
        })
        .map(|(key, value)| Extra {
            key: key.clone(),
            value: value.first().filter(|v| !v.is_empty()).map(str::to_string),
        })
        .collect();

    (tags, extras)
}

/// Group names from `set_spec` and `series`, in that order.
pub fn group_names(content: &ContentMapping) -> (Vec<String>, Vec<String>) {
    let names = |field: &str| -> Vec<String> {
        content
            .get(field)
            .map(ContentValue::values)
            .unwrap_or_default()
            .into_iter()
            .filter(|name| !name.trim().is_empty())
            .map(str::to_string)
            .collect()
    };
    (names(SET_SPEC_FIELD), names(SERIES_FIELD))
}

pub fn group_ref(name: &str) -> GroupRef {
    GroupRef {
        id: name.to_string(),
        name: munge_title_to_name(name),
        title: name.to_string(),
    }
}
