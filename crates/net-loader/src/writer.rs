// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Writes a weight container back out as a network directory.
//!
//! The tensor layout mirrors what [`crate::NetLoader`] reads. Raw networks
//! are written with their normalization tensors; folded networks are
//! written without them and with `folded = true` in the manifest, so a
//! reload reconstructs every block in the folded state and a second fold
//! stays impossible across the file boundary.

use std::path::Path;

use safetensors::tensor::TensorView;
use safetensors::{serialize, Dtype};

use net_weights::{ConvBlock, DenseLayer, NetworkWeights, PolicyHead};

use crate::error::LoadError;
use crate::loader::{MANIFEST_FILE, TENSORS_FILE};
use crate::manifest::NetManifest;

/// Saves `network` under `dir` as `net.json` plus `net.safetensors`.
///
/// The manifest is taken from `manifest` with its `folded` flag rewritten
/// to match the container, so callers can pass the manifest they loaded.
///
/// # Errors
///
/// Fails on I/O and serialization errors, and rejects a partially folded
/// container: a file holding a mix of raw and folded blocks could not be
/// reloaded safely, so fold all blocks or none before saving.
pub fn save(dir: &Path, manifest: &NetManifest, network: &NetworkWeights) -> Result<(), LoadError> {
    let folded = network.is_folded();
    if !folded && network.conv_blocks().any(ConvBlock::is_folded) {
        return Err(LoadError::Weights(net_weights::WeightsError::Structure {
            context: "save".to_string(),
            detail: "network is partially folded; fold all blocks or none before saving"
                .to_string(),
        }));
    }

    std::fs::create_dir_all(dir)?;

    let mut manifest = manifest.clone();
    manifest.folded = folded;
    let json = serde_json::to_string_pretty(&manifest)?;
    std::fs::write(dir.join(MANIFEST_FILE), json)?;

    let mut tensors = TensorWriter::new(folded);
    tensors.conv("input.conv", &network.input);
    for (i, unit) in network.residual.iter().enumerate() {
        tensors.conv(&format!("tower.{i}.conv1"), &unit.conv1);
        tensors.conv(&format!("tower.{i}.conv2"), &unit.conv2);
        if let Some(se) = &unit.se {
            tensors.dense(&format!("tower.{i}.se.fc1"), se.fc1());
            tensors.dense(&format!("tower.{i}.se.fc2"), se.fc2());
        }
    }
    match &network.policy {
        PolicyHead::Classical { conv, fc } => {
            tensors.conv("policy.conv", conv);
            tensors.dense("policy.fc", fc);
        }
        PolicyHead::Convolutional { conv1, conv2 } => {
            tensors.conv("policy.conv1", conv1);
            tensors.conv("policy.conv2", conv2);
        }
    }
    tensors.conv("value.conv", &network.value.conv);
    tensors.dense("value.fc1", &network.value.fc1);
    tensors.dense("value.fc2", &network.value.fc2);

    let payload = tensors.into_bytes()?;
    std::fs::write(dir.join(TENSORS_FILE), payload)?;

    tracing::info!(
        dir = %dir.display(),
        net = %manifest.name,
        folded,
        "network written"
    );
    Ok(())
}

/// Accumulates named f32 tensors and serializes them in one pass. Byte
/// buffers are owned here because safetensors views borrow their data.
struct TensorWriter {
    folded: bool,
    entries: Vec<(String, Vec<usize>, Vec<u8>)>,
}

impl TensorWriter {
    fn new(folded: bool) -> Self {
        Self {
            folded,
            entries: Vec::new(),
        }
    }

    fn add(&mut self, name: String, shape: Vec<usize>, values: &[f32]) {
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name, shape, bytes));
    }

    fn conv(&mut self, prefix: &str, block: &ConvBlock) {
        let fs = block.filter_size();
        self.add(
            format!("{prefix}.weight"),
            vec![block.outputs(), block.inputs(), fs, fs],
            block.weights(),
        );
        self.add(format!("{prefix}.bias"), vec![block.outputs()], block.biases());
        if !self.folded {
            let channels = vec![block.outputs()];
            self.add(format!("{prefix}.bn.scale"), channels.clone(), block.scales());
            self.add(format!("{prefix}.bn.shift"), channels.clone(), block.shifts());
            self.add(format!("{prefix}.bn.mean"), channels.clone(), block.means());
            self.add(format!("{prefix}.bn.var"), channels, block.variances());
        }
    }

    fn dense(&mut self, prefix: &str, layer: &DenseLayer) {
        self.add(
            format!("{prefix}.weight"),
            vec![layer.outputs(), layer.inputs()],
            layer.weights(),
        );
        self.add(format!("{prefix}.bias"), vec![layer.outputs()], layer.biases());
    }

    fn into_bytes(self) -> Result<Vec<u8>, LoadError> {
        let views = self
            .entries
            .iter()
            .map(|(name, shape, bytes)| {
                TensorView::new(Dtype::F32, shape.clone(), bytes)
                    .map(|view| (name.clone(), view))
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| LoadError::SafeTensors(e.to_string()))?;
        serialize(views, &None).map_err(|e| LoadError::SafeTensors(e.to_string()))
    }
}
