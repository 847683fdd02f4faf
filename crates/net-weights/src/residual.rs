// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Residual tower units and their optional squeeze-excitation gates.

use crate::conv::ConvBlock;
use crate::dense::DenseLayer;
use crate::error::WeightsError;

/// A squeeze-excitation gate: a bottleneck projection (`fc1`) followed by
/// an expansion (`fc2`) whose output modulates the residual unit's
/// channels. Neither layer carries normalization parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqueezeExcitation {
    fc1: DenseLayer,
    fc2: DenseLayer,
}

impl SqueezeExcitation {
    /// Composes the gate and checks the seam between its two layers: the
    /// bottleneck output feeds the expansion input, and the expansion must
    /// produce two values (gate and bias) per channel it squeezed.
    ///
    /// # Errors
    ///
    /// Fails with [`WeightsError::Structure`] when the layer dimensions do
    /// not line up.
    pub fn new(fc1: DenseLayer, fc2: DenseLayer) -> Result<Self, WeightsError> {
        if fc2.inputs() != fc1.outputs() {
            return Err(WeightsError::Structure {
                context: "squeeze-excitation".to_string(),
                detail: format!(
                    "expansion reads {} values but the bottleneck produces {}",
                    fc2.inputs(),
                    fc1.outputs()
                ),
            });
        }
        if fc2.outputs() != 2 * fc1.inputs() {
            return Err(WeightsError::Structure {
                context: "squeeze-excitation".to_string(),
                detail: format!(
                    "expansion produces {} values for {} squeezed channels, expected {}",
                    fc2.outputs(),
                    fc1.inputs(),
                    2 * fc1.inputs()
                ),
            });
        }
        Ok(Self { fc1, fc2 })
    }

    pub fn fc1(&self) -> &DenseLayer {
        &self.fc1
    }

    pub fn fc2(&self) -> &DenseLayer {
        &self.fc2
    }

    /// Channel count the gate was built for.
    pub fn channels(&self) -> usize {
        self.fc1.inputs()
    }

    /// Width of the bottleneck.
    pub fn se_channels(&self) -> usize {
        self.fc1.outputs()
    }

    pub fn num_parameters(&self) -> usize {
        self.fc1.num_parameters() + self.fc2.num_parameters()
    }
}

/// One unit of the residual tower: two convolution blocks and an optional
/// squeeze-excitation gate. Purely structural; the unit adds no behavior
/// of its own beyond composing its parts.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualBlock {
    pub conv1: ConvBlock,
    pub conv2: ConvBlock,
    pub se: Option<SqueezeExcitation>,
}

impl ResidualBlock {
    pub fn num_parameters(&self) -> usize {
        self.conv1.num_parameters()
            + self.conv2.num_parameters()
            + self.se.as_ref().map_or(0, SqueezeExcitation::num_parameters)
    }
}
