//! Encoding version to classification code lookup.

use std::collections::BTreeMap;

use point_engine::ClassSet;
use serde::{Deserialize, Serialize};

use crate::catalog::TileId;
use crate::error::{QuickLookError, Result};

/// Maps a tile's encoding version to the classification codes of the target
/// point class.
///
/// The default table covers bathymetric bottom: class 26 in LAS 1.2 tiles and
/// class 40 in LAS 1.4 tiles. An entry may hold several codes (ground and
/// bottom together, say). An override, when set, applies to every tile
/// regardless of version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationPolicy {
    table: BTreeMap<String, ClassSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    override_codes: Option<ClassSet>,
}

impl Default for ClassificationPolicy {
    fn default() -> Self {
        Self::from_map(default_table())
    }
}

/// Version table used when none is configured.
pub fn default_table() -> BTreeMap<String, ClassSet> {
    BTreeMap::from([
        ("1.2".to_string(), ClassSet::from(26)),
        ("1.4".to_string(), ClassSet::from(40)),
    ])
}

impl ClassificationPolicy {
    /// Policy with no entries.
    pub fn empty() -> Self {
        Self::from_map(BTreeMap::new())
    }

    pub fn from_map(table: BTreeMap<String, ClassSet>) -> Self {
        Self {
            table: table
                .into_iter()
                .map(|(version, codes)| (normalize(&version), codes))
                .collect(),
            override_codes: None,
        }
    }

    /// Add or replace one table entry.
    pub fn with_entry(mut self, version: impl AsRef<str>, codes: impl Into<ClassSet>) -> Self {
        self.table.insert(normalize(version.as_ref()), codes.into());
        self
    }

    /// Use `codes` for every tile; `None` restores table lookup.
    pub fn with_override(mut self, codes: Option<ClassSet>) -> Self {
        self.override_codes = codes;
        self
    }

    pub fn override_codes(&self) -> Option<&ClassSet> {
        self.override_codes.as_ref()
    }

    pub fn table(&self) -> &BTreeMap<String, ClassSet> {
        &self.table
    }

    /// Codes for `version`, or `None` when the table has no entry.
    pub fn lookup(&self, version: &str) -> Option<ClassSet> {
        self.override_codes
            .clone()
            .or_else(|| self.table.get(&normalize(version)).cloned())
    }

    /// Codes for a tile's version, failing with `UnknownFormatVersion`.
    pub fn resolve(&self, tile: &TileId, version: &str) -> Result<ClassSet> {
        self.lookup(version)
            .ok_or_else(|| QuickLookError::UnknownFormatVersion {
                tile: tile.clone(),
                version: version.to_string(),
            })
    }
}

/// `"1.4.0"` and `" 1.4 "` both become `"1.4"`.
fn normalize(version: &str) -> String {
    let mut parts = version.trim().split('.');
    match (parts.next(), parts.next()) {
        (Some(major), Some(minor)) => format!("{}.{}", major.trim(), minor.trim()),
        _ => version.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile() -> TileId {
        TileId::new("/data/tile.las")
    }

    #[test]
    fn test_default_table() {
        let policy = ClassificationPolicy::default();
        assert_eq!(policy.resolve(&tile(), "1.2").unwrap(), ClassSet::from(26));
        assert_eq!(policy.resolve(&tile(), "1.4").unwrap(), ClassSet::from(40));
        assert_eq!(policy.lookup(" 1.4.0 "), Some(ClassSet::from(40)));
    }

    #[test]
    fn test_unknown_version() {
        let policy = ClassificationPolicy::default();
        assert!(matches!(
            policy.resolve(&tile(), "1.3"),
            Err(QuickLookError::UnknownFormatVersion { version, .. }) if version == "1.3"
        ));
    }

    #[test]
    fn test_extend_without_touching_callers() {
        let policy = ClassificationPolicy::default().with_entry("1.3", 26);
        assert_eq!(policy.lookup("1.3"), Some(ClassSet::from(26)));
        assert_eq!(policy.table().len(), 3);

        let ground = ClassificationPolicy::empty().with_entry("1.4", 2);
        assert_eq!(ground.lookup("1.4"), Some(ClassSet::from(2)));
        assert_eq!(ground.lookup("1.2"), None);
    }

    #[test]
    fn test_override_bypasses_table() {
        let policy = ClassificationPolicy::default().with_override(Some(ClassSet::from(2)));
        assert_eq!(policy.lookup("1.2"), Some(ClassSet::from(2)));
        assert_eq!(policy.lookup("9.9"), Some(ClassSet::from(2)));
        assert_eq!(policy.clone().with_override(None).lookup("9.9"), None);
    }

    #[test]
    fn test_ground_and_bottom_together() {
        let policy = ClassificationPolicy::empty()
            .with_entry("1.2", [2, 26])
            .with_entry("1.4", [2, 40]);
        let codes = policy.resolve(&tile(), "1.2").unwrap();
        assert!(codes.contains(2) && codes.contains(26));
        assert!(!codes.contains(40));
        assert_eq!(policy.lookup("1.4").unwrap().to_string(), "2,40");
    }
}
