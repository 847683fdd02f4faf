// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Convolution blocks with batch-normalization parameters and the folding
//! transform that merges them into the convolution itself.

use std::fmt;

use crate::error::WeightsError;
use crate::ops;

/// Whether a block still carries live normalization parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldState {
    /// Normalization parameters are live; an inference backend must run
    /// the normalization stage after the convolution.
    Raw,
    /// Normalization has been merged into the weights and biases. The
    /// parameter vectors hold identities and must not be folded again.
    Folded,
}

impl fmt::Display for FoldState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FoldState::Raw => write!(f, "raw"),
            FoldState::Folded => write!(f, "folded"),
        }
    }
}

/// One convolution layer's parameters together with the batch-normalization
/// statistics recorded for its outputs.
///
/// The weights buffer is flat, laid out as
/// `outputs x inputs x filter_size^2`, with the spatial positions of one
/// input channel contiguous. All per-channel buffers share the output
/// count. Every length invariant is checked once, when the block is built;
/// after that the accessors and transforms can rely on them.
///
/// A block is built raw and may be folded exactly once, which rewrites the
/// weights and biases in place and leaves identity normalization
/// parameters behind. See [`ConvBlock::fold_batch_norm`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConvBlock {
    weights: Vec<f32>,
    biases: Vec<f32>,
    scales: Vec<f32>,
    shifts: Vec<f32>,
    means: Vec<f32>,
    variances: Vec<f32>,
    inputs: usize,
    outputs: usize,
    filter_size: usize,
    state: FoldState,
}

/// Staged inputs for a [`ConvBlock`].
///
/// The weights, means, and variance terms are always required. Biases and
/// the affine pair are optional and default the way legacy weight files
/// expect: absent biases become zeros, and an absent scale/shift pair
/// becomes all-one scales with all-zero shifts. The two defaults are
/// independent of each other.
#[derive(Debug)]
pub struct ConvBlockBuilder {
    filter_size: usize,
    weights: Vec<f32>,
    means: Vec<f32>,
    variances: Vec<f32>,
    biases: Option<Vec<f32>>,
    affine: Option<(Vec<f32>, Vec<f32>)>,
}

impl ConvBlockBuilder {
    pub fn new(
        filter_size: usize,
        weights: Vec<f32>,
        means: Vec<f32>,
        variances: Vec<f32>,
    ) -> Self {
        Self {
            filter_size,
            weights,
            means,
            variances,
            biases: None,
            affine: None,
        }
    }

    /// Supplies per-channel convolution biases.
    pub fn biases(mut self, biases: Vec<f32>) -> Self {
        self.biases = Some(biases);
        self
    }

    /// Supplies the learned affine pair. Scales and shifts only ever occur
    /// together, so they are set together.
    pub fn affine(mut self, scales: Vec<f32>, shifts: Vec<f32>) -> Self {
        self.affine = Some((scales, shifts));
        self
    }

    /// Validates every length invariant and produces a raw block.
    ///
    /// # Errors
    ///
    /// Fails when the filter size is zero, the means are empty, any
    /// per-channel buffer disagrees with the output count, or the weights
    /// length is not a positive multiple of `outputs x filter_size^2`.
    pub fn build(self) -> Result<ConvBlock, WeightsError> {
        if self.filter_size == 0 {
            return Err(WeightsError::ZeroFilterSize);
        }
        let outputs = self.means.len();
        if outputs == 0 {
            return Err(WeightsError::EmptyChannels { field: "means" });
        }
        check_len("variances", outputs, self.variances.len())?;

        let biases = match self.biases {
            Some(b) => {
                check_len("biases", outputs, b.len())?;
                b
            }
            None => vec![0.0; outputs],
        };
        let (scales, shifts) = match self.affine {
            Some((s, sh)) => {
                check_len("scales", outputs, s.len())?;
                check_len("shifts", outputs, sh.len())?;
                (s, sh)
            }
            None => (vec![1.0; outputs], vec![0.0; outputs]),
        };

        let inputs = derive_inputs(self.weights.len(), outputs, self.filter_size)?;

        Ok(ConvBlock {
            weights: self.weights,
            biases,
            scales,
            shifts,
            means: self.means,
            variances: self.variances,
            inputs,
            outputs,
            filter_size: self.filter_size,
            state: FoldState::Raw,
        })
    }
}

fn check_len(field: &'static str, expected: usize, actual: usize) -> Result<(), WeightsError> {
    if expected != actual {
        return Err(WeightsError::LengthMismatch {
            field,
            expected,
            actual,
        });
    }
    Ok(())
}

fn derive_inputs(len: usize, outputs: usize, filter_size: usize) -> Result<usize, WeightsError> {
    // Saturate so an oversized filter size lands on the shape error below
    // instead of wrapping the product.
    let spatial = filter_size.saturating_mul(filter_size);
    let per_input = outputs.saturating_mul(spatial);
    if len == 0 || len % per_input != 0 {
        return Err(WeightsError::WeightShape {
            len,
            outputs,
            spatial,
        });
    }
    Ok(len / per_input)
}

impl ConvBlock {
    /// Starts a builder for a raw block. See [`ConvBlockBuilder`].
    pub fn builder(
        filter_size: usize,
        weights: Vec<f32>,
        means: Vec<f32>,
        variances: Vec<f32>,
    ) -> ConvBlockBuilder {
        ConvBlockBuilder::new(filter_size, weights, means, variances)
    }

    /// Builds a block that is already folded, from weights and biases that
    /// carry the merged normalization. The parameter vectors are filled
    /// with identities and the block refuses any further fold.
    ///
    /// This is the entry point for reloading a network that was saved
    /// after folding.
    ///
    /// # Errors
    ///
    /// Same shape rules as [`ConvBlockBuilder::build`], with the output
    /// count taken from `biases`.
    pub fn folded(
        filter_size: usize,
        weights: Vec<f32>,
        biases: Vec<f32>,
    ) -> Result<Self, WeightsError> {
        if filter_size == 0 {
            return Err(WeightsError::ZeroFilterSize);
        }
        let outputs = biases.len();
        if outputs == 0 {
            return Err(WeightsError::EmptyChannels { field: "biases" });
        }
        let inputs = derive_inputs(weights.len(), outputs, filter_size)?;
        Ok(Self {
            weights,
            biases,
            scales: vec![1.0; outputs],
            shifts: vec![0.0; outputs],
            means: vec![0.0; outputs],
            variances: vec![1.0; outputs],
            inputs,
            outputs,
            filter_size,
            state: FoldState::Folded,
        })
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn biases(&self) -> &[f32] {
        &self.biases
    }

    pub fn scales(&self) -> &[f32] {
        &self.scales
    }

    pub fn shifts(&self) -> &[f32] {
        &self.shifts
    }

    pub fn means(&self) -> &[f32] {
        &self.means
    }

    pub fn variances(&self) -> &[f32] {
        &self.variances
    }

    /// Input channel count, derived from the weights length at build time.
    pub fn inputs(&self) -> usize {
        self.inputs
    }

    /// Output channel count; the shared length of all per-channel buffers.
    pub fn outputs(&self) -> usize {
        self.outputs
    }

    pub fn filter_size(&self) -> usize {
        self.filter_size
    }

    /// Filter area, `filter_size^2`.
    pub fn spatial_size(&self) -> usize {
        self.filter_size * self.filter_size
    }

    pub fn fold_state(&self) -> FoldState {
        self.state
    }

    pub fn is_folded(&self) -> bool {
        self.state == FoldState::Folded
    }

    /// Total stored values across all six buffers.
    pub fn num_parameters(&self) -> usize {
        self.weights.len() + 5 * self.outputs
    }

    // ── Queries ─────────────────────────────────────────────────────────

    /// Copy of the variance terms with the epsilon inversion applied,
    /// `1 / sqrt(v + eps)` per channel. Does not modify the block.
    pub fn inverted_variances(&self) -> Vec<f32> {
        let mut inverted = self.variances.clone();
        ops::invert_with_epsilon(&mut inverted);
        inverted
    }

    /// Copy of the means with the convolution biases subtracted. Does not
    /// modify the block.
    pub fn offset_means(&self) -> Vec<f32> {
        let mut offset = self.means.clone();
        ops::subtract_elementwise(&mut offset, &self.biases)
            .expect("means and biases share a length by construction");
        offset
    }

    // ── In-place transforms ─────────────────────────────────────────────

    /// Applies the epsilon inversion to the stored variance terms.
    ///
    /// Meaningful on raw blocks whose backend keeps the normalization
    /// stage at runtime and wants the division precomputed.
    pub fn apply_inverted_variances(&mut self) {
        ops::invert_with_epsilon(&mut self.variances);
    }

    /// Subtracts the convolution biases from the stored means.
    pub fn apply_offset_means(&mut self) {
        ops::subtract_elementwise(&mut self.means, &self.biases)
            .expect("means and biases share a length by construction");
    }

    /// Folds the batch-normalization parameters into the weights and
    /// biases, in place.
    ///
    /// Afterwards the convolution alone computes what convolution plus
    /// normalization computed before, the parameter vectors hold
    /// identities (variance 1, mean 0, shift 0), and the block reports
    /// [`FoldState::Folded`]. The transform is destructive and exact for
    /// inference; it is not idempotent, which is why a second call is
    /// refused rather than silently corrupting the weights.
    ///
    /// # Errors
    ///
    /// Fails with [`WeightsError::AlreadyFolded`] when the block has been
    /// folded before. The block is untouched in that case.
    ///
    /// # Examples
    ///
    /// ```
    /// use net_weights::ConvBlock;
    ///
    /// let mut block = ConvBlock::builder(1, vec![2.0], vec![1.0], vec![3.0])
    ///     .build()?;
    /// block.fold_batch_norm()?;
    /// // 2.0 / sqrt(3.0 + 1e-5) and -1.0 / sqrt(3.0 + 1e-5)
    /// assert!((block.weights()[0] - 1.1547).abs() < 1e-3);
    /// assert!((block.biases()[0] + 0.57735).abs() < 1e-3);
    /// assert!(block.is_folded());
    /// # Ok::<(), net_weights::WeightsError>(())
    /// ```
    pub fn fold_batch_norm(&mut self) -> Result<(), WeightsError> {
        if self.state == FoldState::Folded {
            return Err(WeightsError::AlreadyFolded);
        }

        // First pass: invert the variance terms, absorb each channel's
        // inversion into its scale, and move the convolution bias into the
        // mean. Identity variance and zero bias remain.
        ops::invert_with_epsilon(&mut self.variances);
        ops::subtract_elementwise(&mut self.means, &self.biases)
            .expect("means and biases share a length by construction");
        for o in 0..self.outputs {
            self.scales[o] *= self.variances[o];
            self.variances[o] = 1.0;
            self.biases[o] = 0.0;
        }

        // Second pass: push each channel's combined scale into its weight
        // slab, then rebuild the bias from the offset mean and the shift.
        // The bias must read the scale and mean produced above, not the
        // originals.
        let channel_stride = self.inputs * self.spatial_size();
        for o in 0..self.outputs {
            let scale = self.scales[o];
            for w in &mut self.weights[o * channel_stride..(o + 1) * channel_stride] {
                *w *= scale;
            }
            self.biases[o] = -scale * self.means[o] + self.shifts[o];
            self.means[o] = 0.0;
            self.shifts[o] = 0.0;
        }

        self.state = FoldState::Folded;
        Ok(())
    }
}
