//! Pure release matching over dimension-level index entries.

use crate::model::WILDCARD;
use serde::{Deserialize, Serialize};

/// One entry of a dimension-level index (`repodata`), keyed on the wire by
/// its archive file name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoEntry {
    /// Archive file name, attached from the index map key
    #[serde(default)]
    pub file_name: String,

    pub name: String,

    pub version: String,

    #[serde(default)]
    pub build: String,

    #[serde(default)]
    pub build_number: u64,

    #[serde(default)]
    pub license: Option<String>,

    /// Epoch milliseconds, when the index records one
    #[serde(default)]
    pub timestamp: Option<i64>,

    /// Everything else the index publishes, carried verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Selects the entries matching `name` and the optional version/build
/// filters, ordered best-first.
///
/// Filters: name is exact; a version filter passes when absent, `_`, or an
/// exact match; a build filter passes when absent, `_`, or a prefix of the
/// entry's build (partial build qualifiers like `py3`). Survivors sort by
/// build string in descending lexicographic order; the sort is stable, so
/// entries with equal builds keep their relative order.
///
/// The whole ordered sequence comes back so callers can log alternatives;
/// an empty result is legitimate and the skip decision belongs to the
/// caller.
pub fn match_releases<'a>(
    entries: &'a [RepoEntry],
    name: &str,
    version: Option<&str>,
    build: Option<&str>,
) -> Vec<&'a RepoEntry> {
    let mut matches: Vec<&RepoEntry> = entries
        .iter()
        .filter(|entry| entry.name == name)
        .filter(|entry| {
            version.is_none_or(|v| v == WILDCARD || entry.version == v)
        })
        .filter(|entry| {
            build.is_none_or(|b| b == WILDCARD || entry.build.starts_with(b))
        })
        .collect();
    matches.sort_by(|a, b| b.build.cmp(&a.build));
    matches
}
