//! Update Manifest
//!
//! Lenient reading of the remote `version.json` descriptor and platform asset resolution.

use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    #[error("Update manifest missing version.")]
    MissingVersion,
}

/// Remote update descriptor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: String,
    /// Platform key -> absolute URL or path relative to the manifest
    pub downloads: BTreeMap<String, String>,
    pub download_url: Option<String>,
    pub notes: Option<String>,
    pub required: bool,
    /// Platform key -> hex SHA-256 of that platform's artifact
    pub sha256: BTreeMap<String, String>,
}

impl Manifest {
    /// Build a manifest from an arbitrary JSON document.
    ///
    /// Update servers are not trusted to be well-formed: fields of the wrong
    /// type are ignored rather than failing the whole document. Only a
    /// missing or empty `version` is fatal.
    pub fn from_json(document: &Value) -> Result<Self, ManifestError> {
        let version = match document.get("version") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(ManifestError::MissingVersion),
        };

        Ok(Self {
            version,
            downloads: string_map(document.get("downloads")),
            download_url: non_empty_string(document.get("downloadUrl")),
            notes: document
                .get("notes")
                .and_then(Value::as_str)
                .map(str::to_string),
            required: document
                .get("required")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            sha256: string_map(document.get("sha256")),
        })
    }

    /// Expected digest for a platform's artifact, if the manifest publishes one
    pub fn checksum_for(&self, platform_key: &str) -> Option<&str> {
        self.sha256.get(platform_key).map(String::as_str)
    }
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    let Some(Value::Object(entries)) = value else {
        return BTreeMap::new();
    };

    entries
        .iter()
        .filter_map(|(key, value)| {
            non_empty_string(Some(value)).map(|value| (key.clone(), value))
        })
        .collect()
}

/// Pick the downloadable artifact for `platform_key`.
///
/// Prefers `downloads[platform_key]`, then `downloadUrl`. Relative values
/// are resolved against `source_url`, the URL the manifest was fetched from.
/// Malformed URLs yield `None`.
pub fn resolve_asset(manifest: &Manifest, source_url: &str, platform_key: &str) -> Option<Url> {
    let raw = manifest
        .downloads
        .get(platform_key)
        .or(manifest.download_url.as_ref())?;

    let base = Url::parse(source_url).ok()?;
    base.join(raw).ok()
}
