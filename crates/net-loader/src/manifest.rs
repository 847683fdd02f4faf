// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The net manifest: the JSON side of a network directory, describing the
//! architecture the tensor payload encodes.

use std::path::Path;

use crate::error::LoadError;

/// Policy head layout declared by the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Classical,
    Convolutional,
}

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::Classical => "classical",
            PolicyKind::Convolutional => "convolutional",
        }
    }
}

/// Per-residual-unit flags. Today that is only whether the unit carries a
/// squeeze-excitation gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResidualEntry {
    #[serde(default)]
    pub se: bool,
}

/// Contents of `net.json`.
///
/// `filters` and `blocks` are declarations; the loader cross-checks them
/// against the tensors and warns on disagreement rather than failing. The
/// `residual` list may be omitted entirely when no unit carries a gate.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NetManifest {
    pub name: String,
    pub filters: usize,
    pub blocks: usize,
    /// Spatial filter size of the input and tower convolutions. Head
    /// convolutions are 1x1 by construction.
    #[serde(default = "default_filter_size")]
    pub filter_size: usize,
    pub policy: PolicyKind,
    /// True when the payload holds folded weights and no normalization
    /// tensors.
    #[serde(default)]
    pub folded: bool,
    #[serde(default)]
    pub residual: Vec<ResidualEntry>,
}

fn default_filter_size() -> usize {
    3
}

impl NetManifest {
    /// Parses a manifest from JSON text. Does not validate; call
    /// [`NetManifest::validate`] before trusting the contents.
    pub fn from_json(text: &str) -> Result<Self, LoadError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads and parses a manifest file.
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Checks the declarations are usable: a name, a positive tower
    /// width, a positive filter size, and a residual list that either
    /// matches the block count or is absent.
    pub fn validate(&self) -> Result<(), LoadError> {
        if self.name.trim().is_empty() {
            return Err(LoadError::Manifest {
                detail: "net name is empty".to_string(),
            });
        }
        if self.filters == 0 {
            return Err(LoadError::Manifest {
                detail: "filter count must be positive".to_string(),
            });
        }
        if self.filter_size == 0 {
            return Err(LoadError::Manifest {
                detail: "filter size must be positive".to_string(),
            });
        }
        if !self.residual.is_empty() && self.residual.len() != self.blocks {
            return Err(LoadError::Manifest {
                detail: format!(
                    "residual list has {} entries for {} blocks",
                    self.residual.len(),
                    self.blocks
                ),
            });
        }
        Ok(())
    }

    /// The per-unit entries, one per block: the declared list when
    /// present, all-default entries otherwise.
    pub fn residual_entries(&self) -> Vec<ResidualEntry> {
        if self.residual.is_empty() {
            vec![ResidualEntry::default(); self.blocks]
        } else {
            self.residual.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> &'static str {
        r#"{
            "name": "tower-64x6",
            "filters": 64,
            "blocks": 6,
            "policy": "classical"
        }"#
    }

    #[test]
    fn test_minimal_manifest_gets_defaults() {
        let manifest = NetManifest::from_json(minimal_json()).unwrap();
        manifest.validate().unwrap();
        assert_eq!(manifest.filter_size, 3);
        assert!(!manifest.folded);
        assert!(manifest.residual.is_empty());
        assert_eq!(manifest.residual_entries().len(), 6);
        assert!(manifest.residual_entries().iter().all(|e| !e.se));
    }

    #[test]
    fn test_full_manifest_round_trips() {
        let manifest = NetManifest {
            name: "se-net".to_string(),
            filters: 128,
            blocks: 2,
            filter_size: 3,
            policy: PolicyKind::Convolutional,
            folded: true,
            residual: vec![ResidualEntry { se: true }, ResidualEntry { se: false }],
        };
        let json = serde_json::to_string_pretty(&manifest).unwrap();
        let back = NetManifest::from_json(&json).unwrap();
        assert_eq!(back, manifest);
        assert_eq!(back.policy.as_str(), "convolutional");
    }

    #[test]
    fn test_unknown_policy_kind_is_a_parse_error() {
        let json = minimal_json().replace("classical", "transformer");
        assert!(matches!(
            NetManifest::from_json(&json).unwrap_err(),
            LoadError::ManifestParse(_)
        ));
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        let mut manifest = NetManifest::from_json(minimal_json()).unwrap();
        manifest.name = "  ".to_string();
        assert!(matches!(
            manifest.validate().unwrap_err(),
            LoadError::Manifest { .. }
        ));
    }

    #[test]
    fn test_validate_rejects_zero_filters_and_filter_size() {
        let mut manifest = NetManifest::from_json(minimal_json()).unwrap();
        manifest.filters = 0;
        assert!(manifest.validate().is_err());

        let mut manifest = NetManifest::from_json(minimal_json()).unwrap();
        manifest.filter_size = 0;
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_residual_count_mismatch() {
        let mut manifest = NetManifest::from_json(minimal_json()).unwrap();
        manifest.residual = vec![ResidualEntry { se: true }];
        let err = manifest.validate().unwrap_err();
        assert!(matches!(err, LoadError::Manifest { .. }));
        assert!(err.to_string().contains("1 entries for 6 blocks"));
    }
}
