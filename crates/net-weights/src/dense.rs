// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Fully connected weight/bias pairs.

use crate::error::WeightsError;

/// A fully connected layer's parameters: a flat weight matrix and one bias
/// per output. Used by the head projections and the squeeze-excitation
/// gates; carries no normalization parameters and is never folded.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseLayer {
    weights: Vec<f32>,
    biases: Vec<f32>,
}

impl DenseLayer {
    /// Builds a layer from a flat weight buffer and its biases. The number
    /// of outputs is the bias count; the weight length must divide evenly
    /// by it.
    ///
    /// # Errors
    ///
    /// Fails when `biases` is empty or `weights` cannot be split into
    /// `biases.len()` rows.
    pub fn new(weights: Vec<f32>, biases: Vec<f32>) -> Result<Self, WeightsError> {
        if biases.is_empty() {
            return Err(WeightsError::EmptyChannels { field: "dense biases" });
        }
        if weights.is_empty() || weights.len() % biases.len() != 0 {
            return Err(WeightsError::WeightShape {
                len: weights.len(),
                outputs: biases.len(),
                spatial: 1,
            });
        }
        Ok(Self { weights, biases })
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn biases(&self) -> &[f32] {
        &self.biases
    }

    pub fn outputs(&self) -> usize {
        self.biases.len()
    }

    pub fn inputs(&self) -> usize {
        self.weights.len() / self.biases.len()
    }

    pub fn num_parameters(&self) -> usize {
        self.weights.len() + self.biases.len()
    }
}
