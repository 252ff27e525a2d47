//! Ingestion of catalog entries from an upstream index plus per-item
//! metadata documents.
//!
//! The index can be newline-separated `name url` pairs, a YAML list, or a
//! JSON array — spec.md §4.1 calls this "a simple newline/YAML/JSON form".
//! One bad item must never sink the whole catalog (spec.md §7: the catalog
//! resolver is the one component allowed to swallow errors, but must log).

use log::warn;
use serde_derive::Deserialize;
use serde_json::Value;

use crate::config::ImageAllowList;

/// One `name -> git url` entry parsed from an index document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct YamlEntry {
    name: String,
    url: String,
}

/// Parses an index document, trying JSON, then YAML, then the plain
/// `name url` line form, in that order. Returns an empty vec (logged) on
/// total failure rather than propagating — ingestion failures for one
/// source must not prevent other sources, or other items, from loading.
pub fn parse_index(doc: &str) -> Vec<IndexEntry> {
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(doc) {
        return items
            .into_iter()
            .filter_map(|v| {
                let name = v.get("name")?.as_str()?.to_string();
                let url = v.get("url")?.as_str()?.to_string();
                Some(IndexEntry { name, url })
            })
            .collect();
    }
    if let Ok(entries) = serde_yaml::from_str::<Vec<YamlEntry>>(doc) {
        return entries
            .into_iter()
            .map(|e| IndexEntry {
                name: e.name,
                url: e.url,
            })
            .collect();
    }
    let mut out = Vec::new();
    for (lineno, line) in doc.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some(name), Some(url)) => out.push(IndexEntry {
                name: name.to_string(),
                url: url.to_string(),
            }),
            _ => warn!("catalog index line {} is not 'name url': {:?}", lineno, line),
        }
    }
    out
}

/// Raw metadata as fetched from a module's metadata document, before
/// schema-version validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMetadata {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub resources_recommended: Option<String>,
    pub docker_image: String,
    #[serde(default)]
    pub docker_tags: Vec<String>,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// The schema version this document was authored against.
    pub schema_version: u32,
}

/// The metadata schema version this resolver understands. Documents
/// authored against a newer version are dropped (and logged) rather than
/// partially trusted.
pub const SUPPORTED_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    UnsupportedSchemaVersion(u32),
    MissingTitle,
    DisallowedImage(String),
    Malformed(String),
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ValidationFailure::UnsupportedSchemaVersion(v) => {
                write!(f, "unsupported schema_version {}", v)
            }
            ValidationFailure::MissingTitle => write!(f, "missing title"),
            ValidationFailure::DisallowedImage(img) => {
                write!(f, "docker image '{}' not in allow-list", img)
            }
            ValidationFailure::Malformed(e) => write!(f, "malformed metadata document: {}", e),
        }
    }
}

/// Parses and validates a metadata document. Returns the failure reason
/// rather than an error type: the caller logs and drops, it never fails
/// the whole catalog (spec.md §4.1, §7).
pub fn parse_and_validate_metadata(
    doc: &str,
    allow_list: &ImageAllowList,
) -> Result<RawMetadata, ValidationFailure> {
    let raw: RawMetadata =
        serde_json::from_str(doc).map_err(|e| ValidationFailure::Malformed(e.to_string()))?;
    if raw.schema_version != SUPPORTED_SCHEMA_VERSION {
        return Err(ValidationFailure::UnsupportedSchemaVersion(raw.schema_version));
    }
    if raw.title.trim().is_empty() {
        return Err(ValidationFailure::MissingTitle);
    }
    if !allow_list.is_allowed(&raw.docker_image) {
        return Err(ValidationFailure::DisallowedImage(raw.docker_image.clone()));
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allow_list() -> ImageAllowList {
        ImageAllowList {
            prefixes: vec!["deephdc/".into(), "ai4oshub/".into()],
        }
    }

    #[test]
    fn parses_json_index() {
        let doc = r#"[{"name": "demo-app", "url": "https://github.com/org/demo-app"}]"#;
        let entries = parse_index(doc);
        assert_eq!(entries, vec![IndexEntry {
            name: "demo-app".into(),
            url: "https://github.com/org/demo-app".into(),
        }]);
    }

    #[test]
    fn parses_yaml_index() {
        let doc = "- name: demo-app\n  url: https://github.com/org/demo-app\n";
        let entries = parse_index(doc);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "demo-app");
    }

    #[test]
    fn parses_plain_line_index_and_skips_bad_lines() {
        let doc = "demo-app https://github.com/org/demo-app\n# comment\nbadline\n";
        let entries = parse_index(doc);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "demo-app");
    }

    #[test]
    fn validation_drops_disallowed_image() {
        let doc = r#"{"title":"Demo","docker_image":"evilcorp/demo","schema_version":1}"#;
        let err = parse_and_validate_metadata(doc, &allow_list()).unwrap_err();
        assert_eq!(err, ValidationFailure::DisallowedImage("evilcorp/demo".into()));
    }

    #[test]
    fn validation_drops_unsupported_schema_version() {
        let doc = r#"{"title":"Demo","docker_image":"deephdc/demo","schema_version":99}"#;
        let err = parse_and_validate_metadata(doc, &allow_list()).unwrap_err();
        assert_eq!(err, ValidationFailure::UnsupportedSchemaVersion(99));
    }

    #[test]
    fn validation_accepts_good_document() {
        let doc = r#"{"title":"Demo","docker_image":"deephdc/demo","schema_version":1}"#;
        assert!(parse_and_validate_metadata(doc, &allow_list()).is_ok());
    }
}
