//! Registry package document model and version resolution.

use super::RegistryError;
use semver::{Version, VersionReq};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Dist-tag consulted when the descriptor names no version.
pub const DEFAULT_TAG: &str = "latest";

/// The package document served at `<registry>/<name>`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageDocument {
    /// Package name as recorded by the registry.
    #[serde(default)]
    pub name: Option<String>,
    /// Named pointers to published versions.
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: BTreeMap<String, String>,
    /// Published version records keyed by version string.
    #[serde(default)]
    pub versions: BTreeMap<String, VersionRecord>,
}

/// Metadata for a single published version.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VersionRecord {
    /// The `repository` field exactly as published.
    #[serde(default)]
    pub repository: Option<serde_json::Value>,
    /// Commit the version claims to have been built from.
    #[serde(rename = "gitHead", default)]
    pub git_head: Option<String>,
    /// Distribution details.
    #[serde(default)]
    pub dist: Option<Dist>,
}

/// The `dist` block of a version record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Dist {
    /// SHA-1 of the published tarball.
    #[serde(default)]
    pub shasum: Option<String>,
    /// Download location of the published tarball.
    #[serde(default)]
    pub tarball: Option<String>,
}

/// Distribution details required by later stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistInfo {
    /// SHA-1 of the published tarball, if recorded.
    pub shasum: Option<String>,
    /// Download location of the published tarball.
    pub tarball: String,
}

/// Resolve `spec` to a published version string.
///
/// A dist-tag named `spec` (default `latest`) wins. Otherwise `spec` is taken
/// literally when it names a published version. A spec that is not itself a
/// version but parses as a range selects the highest matching release.
///
/// # Errors
///
/// Returns [`RegistryError::NoLatestTag`] when no spec is given and the
/// document has no `latest` tag, and [`RegistryError::UnknownVersion`] when
/// nothing matches.
///
/// # Examples
///
/// ```
/// use provenance_verifier::registry::{PackageDocument, resolve_version};
///
/// let document: PackageDocument = serde_json::from_str(
///     r#"{"dist-tags":{"latest":"2.0.0"},"versions":{"1.4.0":{},"2.0.0":{}}}"#,
/// )?;
/// assert_eq!(resolve_version(&document, None)?, "2.0.0");
/// assert_eq!(resolve_version(&document, Some("^1"))?, "1.4.0");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn resolve_version(
    document: &PackageDocument,
    spec: Option<&str>,
) -> Result<String, RegistryError> {
    let tag = spec.unwrap_or(DEFAULT_TAG);
    if let Some(version) = document.dist_tags.get(tag) {
        return Ok(version.clone());
    }
    let Some(spec) = spec else {
        return Err(RegistryError::NoLatestTag);
    };
    if document.versions.contains_key(spec) {
        return Ok(spec.to_owned());
    }
    let best = match (Version::parse(spec), VersionReq::parse(spec)) {
        (Err(_), Ok(range)) => highest_matching(document, &range),
        _ => None,
    };
    best.ok_or_else(|| RegistryError::UnknownVersion {
        spec: spec.to_owned(),
    })
}

/// Return the highest published non-prerelease version matching `range`.
fn highest_matching(document: &PackageDocument, range: &VersionReq) -> Option<String> {
    document
        .versions
        .keys()
        .filter_map(|key| Version::parse(key).ok().map(|parsed| (parsed, key)))
        .filter(|(parsed, _)| parsed.pre.is_empty() && range.matches(parsed))
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, key)| key.clone())
}

/// Look up the record for `version`.
///
/// # Errors
///
/// Returns [`RegistryError::MissingVersionRecord`] when the document has no
/// such version.
pub fn version_record<'a>(
    document: &'a PackageDocument,
    version: &str,
) -> Result<&'a VersionRecord, RegistryError> {
    document
        .versions
        .get(version)
        .ok_or_else(|| RegistryError::MissingVersionRecord {
            version: version.to_owned(),
        })
}

/// Extract the shasum and tarball location of `version`.
///
/// # Errors
///
/// Returns [`RegistryError::MissingTarball`] when the record has no
/// non-empty `dist.tarball`.
pub fn dist_info(record: &VersionRecord, version: &str) -> Result<DistInfo, RegistryError> {
    let dist = record.dist.as_ref();
    let tarball = dist
        .and_then(|d| d.tarball.as_deref())
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| RegistryError::MissingTarball {
            version: version.to_owned(),
        })?;
    Ok(DistInfo {
        shasum: dist.and_then(|d| d.shasum.clone()),
        tarball: tarball.to_owned(),
    })
}
