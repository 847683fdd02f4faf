// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for net-loader.

use net_weights::WeightsError;

/// Errors produced while reading or writing network files.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// I/O failure while reading or writing a net file.
    #[error("I/O error on net file: {0}")]
    Io(#[from] std::io::Error),

    /// The manifest was not valid JSON for the expected schema.
    #[error("failed to parse manifest JSON: {0}")]
    ManifestParse(#[from] serde_json::Error),

    /// The manifest parsed but its contents are unusable.
    #[error("invalid manifest: {detail}")]
    Manifest { detail: String },

    /// The safetensors payload could not be parsed or serialized.
    #[error("safetensors error: {0}")]
    SafeTensors(String),

    /// A tensor the manifest layout requires is missing from the payload.
    #[error("tensor not found: {name}")]
    TensorNotFound { name: String },

    /// A tensor is stored in a dtype other than F32.
    #[error("tensor {name} has unsupported dtype {dtype}, expected F32")]
    Dtype { name: String, dtype: String },

    /// A group of tensors that must occur together did not.
    #[error("inconsistent tensor set at {name}: {detail}")]
    Tensors { name: String, detail: String },

    /// The tensors were read but the weight container rejected them.
    #[error("invalid weights: {0}")]
    Weights(#[from] WeightsError),
}
