// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for net-weights.

/// Errors produced while constructing, validating, or folding weight
/// containers.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WeightsError {
    /// A per-channel buffer is empty, so the block has no output channels.
    #[error("{field} is empty: a block must have at least one output channel")]
    EmptyChannels { field: &'static str },

    /// Two buffers that must share a length do not.
    #[error("length mismatch in {field}: expected {expected} values, got {actual}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The weights buffer cannot be split evenly across the output
    /// channels for the given filter area.
    #[error(
        "weights length {len} cannot be split into {outputs} output channels \
         with a filter area of {spatial}"
    )]
    WeightShape {
        len: usize,
        outputs: usize,
        spatial: usize,
    },

    /// The filter size was zero.
    #[error("filter size must be at least 1")]
    ZeroFilterSize,

    /// The block has already been folded; folding is single-shot.
    #[error("batch normalization has already been folded into this block")]
    AlreadyFolded,

    /// Cross-block consistency violation inside a network container.
    #[error("inconsistent network structure in {context}: {detail}")]
    Structure { context: String, detail: String },
}
