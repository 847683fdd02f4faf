// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Assembles a [`NetworkWeights`] container from a network directory.
//!
//! A network directory holds two files: `net.json` (the [`NetManifest`])
//! and `net.safetensors` (the parameters). Tensors are keyed by a fixed
//! layout derived from the manifest:
//!
//! ```text
//! input.conv.{weight,bias,bn.scale,bn.shift,bn.mean,bn.var}
//! tower.{i}.conv1.…   tower.{i}.conv2.…
//! tower.{i}.se.fc1.{weight,bias}   tower.{i}.se.fc2.{weight,bias}
//! policy.conv.… + policy.fc.{weight,bias}      (classical)
//! policy.conv1.… + policy.conv2.…              (convolutional)
//! value.conv.… + value.fc1.… + value.fc2.{weight,bias}
//! ```
//!
//! Legacy files omit `bias` or the `bn.scale`/`bn.shift` pair; absence
//! (including a zero-length tensor) is translated into the container's
//! construction defaults here, at the file boundary. Folded files carry
//! only `weight` and `bias` per convolution.

use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use safetensors::{Dtype, SafeTensors};

use net_weights::{
    ConvBlock, DenseLayer, NetworkWeights, PolicyHead, ResidualBlock, SqueezeExcitation,
    ValueHead,
};

use crate::error::LoadError;
use crate::manifest::{NetManifest, PolicyKind};

/// Manifest file name inside a network directory.
pub const MANIFEST_FILE: &str = "net.json";
/// Tensor payload file name inside a network directory.
pub const TENSORS_FILE: &str = "net.safetensors";

/// Reads network directories into weight containers.
pub struct NetLoader;

impl NetLoader {
    /// Loads a network directory: parses and validates the manifest,
    /// memory-maps the tensor payload, and assembles the container.
    ///
    /// # Errors
    ///
    /// Any manifest, tensor, or container-validation failure is returned
    /// as a [`LoadError`]; nothing is partially constructed.
    pub fn load(dir: &Path) -> Result<NetworkWeights, LoadError> {
        tracing::info!(dir = %dir.display(), "loading network");
        let manifest = NetManifest::from_file(&dir.join(MANIFEST_FILE))?;
        let file = File::open(dir.join(TENSORS_FILE))?;
        // Safety: the mapping is read-only and the file is not modified
        // for the lifetime of the map.
        let mmap = unsafe { Mmap::map(&file)? };
        let tensors = SafeTensors::deserialize(&mmap)
            .map_err(|e| LoadError::SafeTensors(e.to_string()))?;
        Self::from_parts(&manifest, &tensors)
    }

    /// Assembles a container from an already-parsed manifest and tensor
    /// payload. This is the file-free entry point used by tests and by
    /// callers that keep the payload in memory.
    pub fn from_parts(
        manifest: &NetManifest,
        tensors: &SafeTensors<'_>,
    ) -> Result<NetworkWeights, LoadError> {
        manifest.validate()?;
        let mut source = TensorSource::new(tensors);
        let filter_size = manifest.filter_size;
        let folded = manifest.folded;

        let input = source.conv_block("input.conv", filter_size, folded)?;

        let entries = manifest.residual_entries();
        let mut residual = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let conv1 = source.conv_block(&format!("tower.{i}.conv1"), filter_size, folded)?;
            let conv2 = source.conv_block(&format!("tower.{i}.conv2"), filter_size, folded)?;
            let se = if entry.se {
                let fc1 = source.dense(&format!("tower.{i}.se.fc1"))?;
                let fc2 = source.dense(&format!("tower.{i}.se.fc2"))?;
                Some(SqueezeExcitation::new(fc1, fc2)?)
            } else {
                None
            };
            residual.push(ResidualBlock { conv1, conv2, se });
        }

        // Head convolutions are 1x1; only the convolutional policy head
        // keeps the tower's filter size.
        let policy = match manifest.policy {
            PolicyKind::Classical => PolicyHead::Classical {
                conv: source.conv_block("policy.conv", 1, folded)?,
                fc: source.dense("policy.fc")?,
            },
            PolicyKind::Convolutional => PolicyHead::Convolutional {
                conv1: source.conv_block("policy.conv1", filter_size, folded)?,
                conv2: source.conv_block("policy.conv2", filter_size, folded)?,
            },
        };

        let value = ValueHead {
            conv: source.conv_block("value.conv", 1, folded)?,
            fc1: source.dense("value.fc1")?,
            fc2: source.dense("value.fc2")?,
        };

        let network = NetworkWeights {
            input,
            residual,
            policy,
            value,
        };
        network.validate()?;

        if network.filters() != manifest.filters {
            tracing::warn!(
                declared = manifest.filters,
                actual = network.filters(),
                "manifest filter count disagrees with the tensors"
            );
        }
        for name in tensors.names() {
            if !source.used.contains(name.as_str()) {
                tracing::warn!(tensor = %name, "tensor not referenced by the manifest layout");
            }
        }

        tracing::info!(net = %manifest.name, "{}", network.summary());
        Ok(network)
    }
}

/// Fetches named f32 buffers out of a safetensors payload, remembering
/// which names were consumed so the loader can flag strays.
struct TensorSource<'s, 'data> {
    st: &'s SafeTensors<'data>,
    used: HashSet<String>,
}

impl<'s, 'data> TensorSource<'s, 'data> {
    fn new(st: &'s SafeTensors<'data>) -> Self {
        Self {
            st,
            used: HashSet::new(),
        }
    }

    /// A required tensor, decoded to f32 values.
    fn f32(&mut self, name: &str) -> Result<Vec<f32>, LoadError> {
        let view = self
            .st
            .tensor(name)
            .map_err(|_| LoadError::TensorNotFound {
                name: name.to_string(),
            })?;
        if view.dtype() != Dtype::F32 {
            return Err(LoadError::Dtype {
                name: name.to_string(),
                dtype: format!("{:?}", view.dtype()),
            });
        }
        self.used.insert(name.to_string());
        let data = view.data();
        let mut values = Vec::with_capacity(data.len() / 4);
        for chunk in data.chunks_exact(4) {
            values.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }
        Ok(values)
    }

    /// An optional tensor. A missing name and a zero-length tensor both
    /// count as absent; legacy files use either form.
    fn optional_f32(&mut self, name: &str) -> Result<Option<Vec<f32>>, LoadError> {
        if self.st.tensor(name).is_err() {
            return Ok(None);
        }
        let values = self.f32(name)?;
        Ok(if values.is_empty() { None } else { Some(values) })
    }

    /// One convolution block at `prefix`, raw or folded.
    fn conv_block(
        &mut self,
        prefix: &str,
        filter_size: usize,
        folded: bool,
    ) -> Result<ConvBlock, LoadError> {
        let weights = self.f32(&format!("{prefix}.weight"))?;
        let biases = self.optional_f32(&format!("{prefix}.bias"))?;

        if folded {
            // Folding always produces real biases, so a folded file must
            // carry them.
            let biases = biases.ok_or_else(|| LoadError::TensorNotFound {
                name: format!("{prefix}.bias"),
            })?;
            return Ok(ConvBlock::folded(filter_size, weights, biases)?);
        }

        let means = self.f32(&format!("{prefix}.bn.mean"))?;
        let variances = self.f32(&format!("{prefix}.bn.var"))?;
        let scales = self.optional_f32(&format!("{prefix}.bn.scale"))?;
        let shifts = self.optional_f32(&format!("{prefix}.bn.shift"))?;

        let mut builder = ConvBlock::builder(filter_size, weights, means, variances);
        if let Some(biases) = biases {
            builder = builder.biases(biases);
        }
        builder = match (scales, shifts) {
            (Some(scales), Some(shifts)) => builder.affine(scales, shifts),
            (None, None) => builder,
            _ => {
                return Err(LoadError::Tensors {
                    name: prefix.to_string(),
                    detail: "bn.scale and bn.shift must be present together".to_string(),
                })
            }
        };
        Ok(builder.build()?)
    }

    /// One fully connected layer at `prefix`. Both tensors are required.
    fn dense(&mut self, prefix: &str) -> Result<DenseLayer, LoadError> {
        let weights = self.f32(&format!("{prefix}.weight"))?;
        let biases = self.f32(&format!("{prefix}.bias"))?;
        Ok(DenseLayer::new(weights, biases)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use safetensors::serialize;
    use safetensors::tensor::TensorView;

    fn f32_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Builds safetensors payloads for tests, one tensor at a time.
    struct TensorSet {
        entries: Vec<(String, Dtype, Vec<usize>, Vec<u8>)>,
    }

    impl TensorSet {
        fn new() -> Self {
            Self {
                entries: Vec::new(),
            }
        }

        fn add(&mut self, name: &str, values: &[f32]) {
            self.entries.push((
                name.to_string(),
                Dtype::F32,
                vec![values.len()],
                f32_bytes(values),
            ));
        }

        fn add_raw(&mut self, name: &str, dtype: Dtype, shape: Vec<usize>, bytes: Vec<u8>) {
            self.entries.push((name.to_string(), dtype, shape, bytes));
        }

        /// A full raw convolution block with identity normalization.
        fn conv(&mut self, prefix: &str, outputs: usize, inputs: usize, spatial: usize) {
            self.add(&format!("{prefix}.weight"), &vec![0.5; outputs * inputs * spatial]);
            self.add(&format!("{prefix}.bias"), &vec![0.1; outputs]);
            self.add(&format!("{prefix}.bn.scale"), &vec![1.0; outputs]);
            self.add(&format!("{prefix}.bn.shift"), &vec![0.0; outputs]);
            self.add(&format!("{prefix}.bn.mean"), &vec![0.0; outputs]);
            self.add(&format!("{prefix}.bn.var"), &vec![1.0; outputs]);
        }

        fn dense(&mut self, prefix: &str, inputs: usize, outputs: usize) {
            self.add(&format!("{prefix}.weight"), &vec![0.2; inputs * outputs]);
            self.add(&format!("{prefix}.bias"), &vec![0.0; outputs]);
        }

        fn bytes(&self) -> Vec<u8> {
            let views: Vec<(String, TensorView)> = self
                .entries
                .iter()
                .map(|(name, dtype, shape, bytes)| {
                    (
                        name.clone(),
                        TensorView::new(*dtype, shape.clone(), bytes).unwrap(),
                    )
                })
                .collect();
            serialize(views, &None).unwrap()
        }
    }

    fn classical_manifest(blocks: usize) -> NetManifest {
        NetManifest {
            name: "test-net".to_string(),
            filters: 2,
            blocks,
            filter_size: 1,
            policy: PolicyKind::Classical,
            folded: false,
            residual: Vec::new(),
        }
    }

    /// Tensors for a tiny classical net matching `classical_manifest`.
    fn classical_tensors(blocks: usize) -> TensorSet {
        let mut set = TensorSet::new();
        set.conv("input.conv", 2, 3, 1);
        for i in 0..blocks {
            set.conv(&format!("tower.{i}.conv1"), 2, 2, 1);
            set.conv(&format!("tower.{i}.conv2"), 2, 2, 1);
        }
        set.conv("policy.conv", 4, 2, 1);
        set.dense("policy.fc", 4, 2);
        set.conv("value.conv", 1, 2, 1);
        set.dense("value.fc1", 1, 3);
        set.dense("value.fc2", 3, 1);
        set
    }

    #[test]
    fn test_classical_net_assembles() {
        let bytes = classical_tensors(1).bytes();
        let st = SafeTensors::deserialize(&bytes).unwrap();
        let net = NetLoader::from_parts(&classical_manifest(1), &st).unwrap();

        assert_eq!(net.filters(), 2);
        assert_eq!(net.num_blocks(), 1);
        assert_eq!(net.policy.kind_name(), "classical");
        assert!(!net.is_folded());
        assert_eq!(net.input.inputs(), 3);
    }

    #[test]
    fn test_declared_filter_count_disagreement_is_not_fatal() {
        let bytes = classical_tensors(0).bytes();
        let st = SafeTensors::deserialize(&bytes).unwrap();
        let mut manifest = classical_manifest(0);
        // The declaration is advisory; the tensors are the truth.
        manifest.filters = 99;

        let net = NetLoader::from_parts(&manifest, &st).unwrap();
        assert_eq!(net.filters(), 2);
    }

    #[test]
    fn test_legacy_defaults_applied_at_the_boundary() {
        let mut set = classical_tensors(0);
        // A legacy input block: weights and statistics only.
        set.entries.retain(|(name, ..)| !name.starts_with("input.conv."));
        set.add("input.conv.weight", &vec![0.5; 6]);
        set.add("input.conv.bn.mean", &[0.0, 0.0]);
        set.add("input.conv.bn.var", &[1.0, 1.0]);

        let bytes = set.bytes();
        let st = SafeTensors::deserialize(&bytes).unwrap();
        let net = NetLoader::from_parts(&classical_manifest(0), &st).unwrap();

        assert_eq!(net.input.biases(), &[0.0, 0.0]);
        assert_eq!(net.input.scales(), &[1.0, 1.0]);
        assert_eq!(net.input.shifts(), &[0.0, 0.0]);
    }

    #[test]
    fn test_zero_length_tensor_counts_as_absent() {
        let mut set = classical_tensors(0);
        set.entries.retain(|(name, ..)| name != "input.conv.bias");
        set.add("input.conv.bias", &[]);

        let bytes = set.bytes();
        let st = SafeTensors::deserialize(&bytes).unwrap();
        let net = NetLoader::from_parts(&classical_manifest(0), &st).unwrap();
        assert_eq!(net.input.biases(), &[0.0, 0.0]);
    }

    #[test]
    fn test_missing_required_tensor_is_reported_by_name() {
        let mut set = classical_tensors(0);
        set.entries.retain(|(name, ..)| name != "input.conv.bn.mean");

        let bytes = set.bytes();
        let st = SafeTensors::deserialize(&bytes).unwrap();
        let err = NetLoader::from_parts(&classical_manifest(0), &st).unwrap_err();
        match err {
            LoadError::TensorNotFound { name } => assert_eq!(name, "input.conv.bn.mean"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_mixed_affine_pair_is_rejected() {
        let mut set = classical_tensors(0);
        set.entries.retain(|(name, ..)| name != "input.conv.bn.shift");

        let bytes = set.bytes();
        let st = SafeTensors::deserialize(&bytes).unwrap();
        let err = NetLoader::from_parts(&classical_manifest(0), &st).unwrap_err();
        assert!(matches!(err, LoadError::Tensors { name, .. } if name == "input.conv"));
    }

    #[test]
    fn test_non_f32_tensor_is_rejected() {
        let mut set = classical_tensors(0);
        set.entries.retain(|(name, ..)| name != "input.conv.bn.var");
        set.add_raw(
            "input.conv.bn.var",
            Dtype::I32,
            vec![2],
            vec![1, 0, 0, 0, 1, 0, 0, 0],
        );

        let bytes = set.bytes();
        let st = SafeTensors::deserialize(&bytes).unwrap();
        let err = NetLoader::from_parts(&classical_manifest(0), &st).unwrap_err();
        assert!(matches!(err, LoadError::Dtype { .. }));
    }

    #[test]
    fn test_folded_manifest_loads_without_bn_tensors() {
        let mut set = TensorSet::new();
        for prefix in ["input.conv", "policy.conv", "value.conv"] {
            let (outputs, inputs) = match prefix {
                "input.conv" => (2, 3),
                "policy.conv" => (4, 2),
                _ => (1, 2),
            };
            set.add(&format!("{prefix}.weight"), &vec![0.5; outputs * inputs]);
            set.add(&format!("{prefix}.bias"), &vec![0.1; outputs]);
        }
        set.dense("policy.fc", 4, 2);
        set.dense("value.fc1", 1, 3);
        set.dense("value.fc2", 3, 1);

        let mut manifest = classical_manifest(0);
        manifest.folded = true;

        let bytes = set.bytes();
        let st = SafeTensors::deserialize(&bytes).unwrap();
        let mut net = NetLoader::from_parts(&manifest, &st).unwrap();

        assert!(net.is_folded());
        assert!(matches!(
            net.fold_batch_norms().unwrap_err(),
            net_weights::WeightsError::AlreadyFolded
        ));
    }

    #[test]
    fn test_container_validation_runs_on_load() {
        let mut set = classical_tensors(1);
        // Break the tower: conv2 of block 0 maps to 3 channels.
        set.entries
            .retain(|(name, ..)| !name.starts_with("tower.0.conv2."));
        set.conv("tower.0.conv2", 3, 2, 1);

        let bytes = set.bytes();
        let st = SafeTensors::deserialize(&bytes).unwrap();
        let err = NetLoader::from_parts(&classical_manifest(1), &st).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Weights(net_weights::WeightsError::Structure { .. })
        ));
    }
}
