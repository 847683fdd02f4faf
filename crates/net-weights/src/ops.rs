// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Elementwise numeric helpers shared by the normalization algebra.

use crate::error::WeightsError;

/// Epsilon added to every variance term before inversion. The value matches
/// the constant baked into the training pipeline that produced the weights,
/// so folded and unfolded evaluation agree bit-for-bit in intent.
pub const BN_EPSILON: f32 = 1e-5;

/// Replaces every element `v` with `1 / sqrt(v + BN_EPSILON)`.
///
/// The epsilon keeps zero-variance channels finite. Note that the transform
/// is not self-inverse: applying it twice does not restore the input.
pub fn invert_with_epsilon(values: &mut [f32]) {
    for v in values.iter_mut() {
        *v = 1.0 / (*v + BN_EPSILON).sqrt();
    }
}

/// Subtracts `rhs` from `lhs` index by index, in place.
///
/// # Errors
///
/// Fails with [`WeightsError::LengthMismatch`] when the operands differ in
/// length. No elements are modified in that case.
pub fn subtract_elementwise(lhs: &mut [f32], rhs: &[f32]) -> Result<(), WeightsError> {
    if lhs.len() != rhs.len() {
        return Err(WeightsError::LengthMismatch {
            field: "elementwise operands",
            expected: lhs.len(),
            actual: rhs.len(),
        });
    }
    for (a, b) in lhs.iter_mut().zip(rhs) {
        *a -= *b;
    }
    Ok(())
}
