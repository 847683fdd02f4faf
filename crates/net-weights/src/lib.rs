// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # net-weights
//!
//! Weight containers for policy/value convolutional networks and the
//! batch-normalization folding algebra that prepares them for inference.
//!
//! - [`ConvBlock`]: one convolution's weights and biases plus the four
//!   batch-normalization parameter vectors, built through
//!   [`ConvBlockBuilder`] with legacy defaulting for absent biases and
//!   affine pairs.
//! - [`ResidualBlock`] and [`SqueezeExcitation`]: tower units with an
//!   optional gate.
//! - [`NetworkWeights`]: the full container with [`PolicyHead`] and
//!   [`ValueHead`], cross-block validation, and whole-network folding.
//! - [`invert_with_epsilon`] and [`subtract_elementwise`]: the elementwise
//!   helpers the folding algebra is built from.
//!
//! Folding is single-shot: each block tracks a [`FoldState`] and refuses a
//! second fold instead of corrupting the weights. Everything here is
//! synchronous and allocation-light; build and fold on one thread, then
//! share the container read-only.
//!
//! ```
//! use net_weights::ConvBlock;
//!
//! // A 1x1 block over one channel, with only the required buffers; the
//! // bias and affine defaults stand in for the rest.
//! let mut block = ConvBlock::builder(1, vec![2.0], vec![1.0], vec![3.0])
//!     .build()?;
//!
//! block.fold_batch_norm()?;
//! assert!(block.is_folded());
//! # Ok::<(), net_weights::WeightsError>(())
//! ```

mod conv;
mod dense;
mod error;
mod network;
mod ops;
mod residual;

pub use conv::{ConvBlock, ConvBlockBuilder, FoldState};
pub use dense::DenseLayer;
pub use error::WeightsError;
pub use network::{NetworkWeights, PolicyHead, ValueHead};
pub use ops::{invert_with_epsilon, subtract_elementwise, BN_EPSILON};
pub use residual::{ResidualBlock, SqueezeExcitation};
