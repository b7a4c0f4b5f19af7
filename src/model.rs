//! Canonical component coordinates.
//!
//! A [`Spec`] is the parsed identity of a requested component:
//! `{type}/{provider}/{namespace|-}/{name}/{revision|-}` where `revision`
//! is `{version|_}-{buildVersion|_}`. The `-` placeholder marks an absent
//! namespace or revision; the `_` wildcard marks a version or build that
//! the fetcher should resolve to a concrete value.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wildcard marker for an unspecified version or build ("pick best").
pub const WILDCARD: &str = "_";

/// Placeholder marker for an absent namespace or revision segment.
pub const ABSENT: &str = "-";

/// A component coordinate string could not be parsed.
#[derive(Error, Debug)]
#[error("Malformed component coordinate '{coordinate}': {reason}")]
pub struct MalformedSpecError {
    /// The coordinate string as received
    pub coordinate: String,

    /// What was wrong with it
    pub reason: String,
}

impl MalformedSpecError {
    fn new(coordinate: &str, reason: impl Into<String>) -> Self {
        Self {
            coordinate: coordinate.to_string(),
            reason: reason.into(),
        }
    }
}

/// Parsed, canonical identity of a component coordinate.
///
/// `namespace` and the revision fields (`version`, `build`) are the only
/// fields a fetcher may rewrite, and only once, during resolution — see
/// [`Spec::with_resolution`]. A `Spec` is never mutated after a fetch
/// result referencing it exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spec {
    /// Artifact kind (e.g. `"conda"` for binary packages, `"condasrc"`
    /// for source archives)
    #[serde(rename = "type")]
    pub artifact_type: String,

    /// Registry/channel identifier (e.g. `"conda-forge"`)
    pub provider: String,

    /// Optional dimension narrowing which build is wanted (e.g. a target
    /// architecture); `None` is encoded as `-` on the wire
    pub namespace: Option<String>,

    /// Component name
    pub name: String,

    /// Requested version; `None` is encoded as `_` (resolve automatically)
    pub version: Option<String>,

    /// Requested build qualifier; `None` is encoded as `_`
    pub build: Option<String>,
}

impl Spec {
    /// Parses a coordinate string into a `Spec`.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedSpecError`] if the coordinate does not have
    /// exactly five `/`-separated segments or a mandatory segment is empty.
    pub fn parse(coordinate: &str) -> Result<Self, MalformedSpecError> {
        let parts: Vec<&str> = coordinate.split('/').collect();
        if parts.len() != 5 {
            return Err(MalformedSpecError::new(
                coordinate,
                format!("expected 5 segments, found {}", parts.len()),
            ));
        }

        let (artifact_type, provider, namespace, name, revision) =
            (parts[0], parts[1], parts[2], parts[3], parts[4]);

        for (segment, label) in [
            (artifact_type, "type"),
            (provider, "provider"),
            (name, "name"),
            (revision, "revision"),
        ] {
            if segment.is_empty() {
                return Err(MalformedSpecError::new(
                    coordinate,
                    format!("empty {label} segment"),
                ));
            }
        }

        let namespace = match namespace {
            "" | ABSENT => None,
            other => Some(other.to_string()),
        };

        let (version, build) = Self::parse_revision(revision);

        Ok(Self {
            artifact_type: artifact_type.to_string(),
            provider: provider.to_string(),
            namespace,
            name: name.to_string(),
            version,
            build,
        })
    }

    /// Splits a revision segment into its version and build halves.
    ///
    /// `-` (or an empty segment) means both are unspecified; otherwise the
    /// segment splits on the first `-`, with `_` or an empty half mapping
    /// to `None`.
    fn parse_revision(raw: &str) -> (Option<String>, Option<String>) {
        if raw.is_empty() || raw == ABSENT {
            return (None, None);
        }
        match raw.split_once('-') {
            Some((version, build)) => (Self::concrete(version), Self::concrete(build)),
            None => (Self::concrete(raw), None),
        }
    }

    fn concrete(half: &str) -> Option<String> {
        match half {
            "" | WILDCARD => None,
            other => Some(other.to_string()),
        }
    }

    /// Renders the canonical revision segment.
    pub fn revision(&self) -> String {
        match (&self.version, &self.build) {
            (None, None) => ABSENT.to_string(),
            (version, build) => format!(
                "{}-{}",
                version.as_deref().unwrap_or(WILDCARD),
                build.as_deref().unwrap_or(WILDCARD)
            ),
        }
    }

    /// Renders the canonical coordinate string.
    ///
    /// Satisfies `Spec::parse(spec.to_url()) == spec` for every valid spec.
    pub fn to_url(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.artifact_type,
            self.provider,
            self.namespace.as_deref().unwrap_or(ABSENT),
            self.name,
            self.revision()
        )
    }

    /// Produces the resolved spec a fetcher records after filling in
    /// concrete identity fields.
    ///
    /// This is the single permitted rewrite of `namespace` and the
    /// revision: `None` arguments leave the corresponding field as it was.
    /// `name` carries the provider's authoritative casing.
    pub fn with_resolution(
        &self,
        name: Option<&str>,
        namespace: Option<&str>,
        version: Option<&str>,
        build: Option<&str>,
    ) -> Spec {
        Spec {
            artifact_type: self.artifact_type.clone(),
            provider: self.provider.clone(),
            namespace: namespace
                .map(str::to_string)
                .or_else(|| self.namespace.clone()),
            name: name.map(str::to_string).unwrap_or_else(|| self.name.clone()),
            version: version.map(str::to_string).or_else(|| self.version.clone()),
            build: build.map(str::to_string).or_else(|| self.build.clone()),
        }
    }
}

/// A work item owning one [`Spec`] and its canonical coordinate URL.
///
/// The queue layer delivers a `Request`; the fetcher returns the outcome
/// as a value rather than mutating the request, so terminal states stay
/// exhaustively checkable.
#[derive(Debug, Clone)]
pub struct Request {
    /// Parsed component coordinate
    pub spec: Spec,

    /// Canonical coordinate URL for logging and correlation
    pub url: String,
}

impl Request {
    /// Builds a request from a coordinate string.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedSpecError`] if the coordinate cannot be parsed.
    pub fn new(coordinate: &str) -> Result<Self, MalformedSpecError> {
        let spec = Spec::parse(coordinate)?;
        Ok(Self {
            url: spec.to_url(),
            spec,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_coordinate() {
        let spec = Spec::parse("conda/conda-forge/linux-aarch64/numpy/1.13.0-py36").unwrap();
        assert_eq!(spec.artifact_type, "conda");
        assert_eq!(spec.provider, "conda-forge");
        assert_eq!(spec.namespace.as_deref(), Some("linux-aarch64"));
        assert_eq!(spec.name, "numpy");
        assert_eq!(spec.version.as_deref(), Some("1.13.0"));
        assert_eq!(spec.build.as_deref(), Some("py36"));
    }

    #[test]
    fn test_parse_absent_namespace_and_build_only_revision() {
        let spec = Spec::parse("conda/conda-forge/-/numpy/-py36").unwrap();
        assert_eq!(spec.namespace, None);
        assert_eq!(spec.version, None);
        assert_eq!(spec.build.as_deref(), Some("py36"));
    }

    #[test]
    fn test_parse_double_wildcard_revision() {
        let spec = Spec::parse("condasrc/conda-forge/-/numpy/_-_").unwrap();
        assert_eq!(spec.version, None);
        assert_eq!(spec.build, None);
        assert_eq!(spec.revision(), "-");
    }

    #[test]
    fn test_parse_bare_version_revision() {
        let spec = Spec::parse("conda/anaconda-main/linux-64/numpy/1.13.0").unwrap();
        assert_eq!(spec.version.as_deref(), Some("1.13.0"));
        assert_eq!(spec.build, None);
    }

    #[test]
    fn test_round_trip_law() {
        let coordinates = [
            "conda/conda-forge/linux-aarch64/numpy/1.13.0-py36",
            "conda/conda-forge/-/numpy/-py36",
            "condasrc/conda-forge/-/numpy/_-_",
            "conda/anaconda-main/linux-64/numpy/1.13.0-_",
            "conda/anaconda-r/noarch/r-base/-",
        ];
        for coordinate in coordinates {
            let spec = Spec::parse(coordinate).unwrap();
            let reparsed = Spec::parse(&spec.to_url()).unwrap();
            assert_eq!(reparsed, spec, "round trip failed for {coordinate}");
        }
    }

    #[test]
    fn test_parse_rejects_wrong_segment_count() {
        assert!(Spec::parse("conda/conda-forge/numpy/1.13.0").is_err());
        assert!(Spec::parse("conda/conda-forge/-/numpy/1.13.0-py36/extra").is_err());
    }

    #[test]
    fn test_parse_rejects_empty_segments() {
        assert!(Spec::parse("conda/conda-forge/-//1.13.0-py36").is_err());
        assert!(Spec::parse("/conda-forge/-/numpy/1.13.0-py36").is_err());
    }

    #[test]
    fn test_with_resolution_fills_wildcards() {
        let spec = Spec::parse("conda/conda-forge/-/numpy/_-py3").unwrap();
        let resolved = spec.with_resolution(None, Some("noarch"), Some("1.13.0"), Some("py36_0"));
        assert_eq!(resolved.namespace.as_deref(), Some("noarch"));
        assert_eq!(resolved.version.as_deref(), Some("1.13.0"));
        assert_eq!(resolved.build.as_deref(), Some("py36_0"));
        // Untouched fields carry over
        assert_eq!(resolved.provider, "conda-forge");
        assert_eq!(
            resolved.to_url(),
            "conda/conda-forge/noarch/numpy/1.13.0-py36_0"
        );
    }

    #[test]
    fn test_spec_serializes_with_wire_names() {
        let spec = Spec::parse("conda/conda-forge/noarch/numpy/1.13.0-py36").unwrap();
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["type"], "conda");
        assert_eq!(value["provider"], "conda-forge");
        assert_eq!(value["namespace"], "noarch");
    }

    #[test]
    fn test_request_carries_canonical_url() {
        let request = Request::new("conda/conda-forge/-/numpy/1.13.0").unwrap();
        assert_eq!(request.url, "conda/conda-forge/-/numpy/1.13.0-_");
        assert_eq!(request.spec.name, "numpy");
    }
}
