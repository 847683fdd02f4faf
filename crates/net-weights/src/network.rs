// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The top-level weight container: input block, residual tower, and the
//! policy and value heads.

use crate::conv::ConvBlock;
use crate::dense::DenseLayer;
use crate::error::WeightsError;
use crate::residual::ResidualBlock;

/// Policy head layouts.
///
/// Older nets project the tower through a single 1x1 convolution and a
/// fully connected layer; newer ones read the move map directly off a
/// second convolution and carry no fully connected layer at all. The two
/// layouts have different parts, so they are different variants rather
/// than one struct with vestigial fields.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyHead {
    /// 1x1 convolution followed by a fully connected projection.
    Classical { conv: ConvBlock, fc: DenseLayer },
    /// Two-stage convolutional head; the final convolution's output is the
    /// move map.
    Convolutional { conv1: ConvBlock, conv2: ConvBlock },
}

impl PolicyHead {
    pub fn kind_name(&self) -> &'static str {
        match self {
            PolicyHead::Classical { .. } => "classical",
            PolicyHead::Convolutional { .. } => "convolutional",
        }
    }

    pub fn conv_blocks(&self) -> impl Iterator<Item = &ConvBlock> {
        let blocks: Vec<&ConvBlock> = match self {
            PolicyHead::Classical { conv, .. } => vec![conv],
            PolicyHead::Convolutional { conv1, conv2 } => vec![conv1, conv2],
        };
        blocks.into_iter()
    }

    pub fn conv_blocks_mut(&mut self) -> impl Iterator<Item = &mut ConvBlock> {
        let blocks: Vec<&mut ConvBlock> = match self {
            PolicyHead::Classical { conv, .. } => vec![conv],
            PolicyHead::Convolutional { conv1, conv2 } => vec![conv1, conv2],
        };
        blocks.into_iter()
    }

    pub fn num_parameters(&self) -> usize {
        match self {
            PolicyHead::Classical { conv, fc } => conv.num_parameters() + fc.num_parameters(),
            PolicyHead::Convolutional { conv1, conv2 } => {
                conv1.num_parameters() + conv2.num_parameters()
            }
        }
    }
}

/// The value head: one 1x1 convolution off the tower and two fully
/// connected layers ending in the scalar evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueHead {
    pub conv: ConvBlock,
    pub fc1: DenseLayer,
    pub fc2: DenseLayer,
}

impl ValueHead {
    pub fn num_parameters(&self) -> usize {
        self.conv.num_parameters() + self.fc1.num_parameters() + self.fc2.num_parameters()
    }
}

/// Every parameter of a policy/value network, assembled in evaluation
/// order: the input convolution, the residual tower, and the two heads.
///
/// The container owns its parts exclusively; there is no sharing between
/// blocks and no internal locking. Construct and optionally fold on one
/// thread, then share read-only (`NetworkWeights` is `Send + Sync` by
/// composition). Fields are public so a backend can fold blocks
/// selectively; [`NetworkWeights::fold_batch_norms`] folds everything for
/// backends that never run a normalization stage.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkWeights {
    pub input: ConvBlock,
    /// Tower units in evaluation order. Order is significant.
    pub residual: Vec<ResidualBlock>,
    pub policy: PolicyHead,
    pub value: ValueHead,
}

impl NetworkWeights {
    /// Tower width: the channel count every residual unit consumes and
    /// produces.
    pub fn filters(&self) -> usize {
        self.input.outputs()
    }

    pub fn num_blocks(&self) -> usize {
        self.residual.len()
    }

    /// Every convolution block in evaluation order.
    pub fn conv_blocks(&self) -> impl Iterator<Item = &ConvBlock> {
        let mut blocks: Vec<&ConvBlock> = vec![&self.input];
        for unit in &self.residual {
            blocks.push(&unit.conv1);
            blocks.push(&unit.conv2);
        }
        blocks.extend(self.policy.conv_blocks());
        blocks.push(&self.value.conv);
        blocks.into_iter()
    }

    pub fn conv_blocks_mut(&mut self) -> impl Iterator<Item = &mut ConvBlock> {
        let Self {
            input,
            residual,
            policy,
            value,
        } = self;
        let mut blocks: Vec<&mut ConvBlock> = vec![input];
        for unit in residual.iter_mut() {
            blocks.push(&mut unit.conv1);
            blocks.push(&mut unit.conv2);
        }
        blocks.extend(policy.conv_blocks_mut());
        blocks.push(&mut value.conv);
        blocks.into_iter()
    }

    /// True once every convolution block has been folded.
    pub fn is_folded(&self) -> bool {
        self.conv_blocks().all(ConvBlock::is_folded)
    }

    /// Folds batch normalization into every convolution block, in place.
    /// This is the fold-on-load path for backends that never run a
    /// normalization stage.
    ///
    /// # Errors
    ///
    /// Fails with [`WeightsError::AlreadyFolded`] when any block has been
    /// folded before; blocks ahead of the offender keep their folded form,
    /// so treat the container as corrupt after an error.
    pub fn fold_batch_norms(&mut self) -> Result<(), WeightsError> {
        let mut folded = 0usize;
        for block in self.conv_blocks_mut() {
            block.fold_batch_norm()?;
            folded += 1;
        }
        tracing::debug!(blocks = folded, "folded batch normalization into convolutions");
        Ok(())
    }

    /// Checks cross-block consistency: tower channel continuity, gate
    /// dimensions against the tower width, and the head seams. Length
    /// invariants inside each block were already enforced when the block
    /// was built.
    ///
    /// # Errors
    ///
    /// Fails with [`WeightsError::Structure`] naming the offending part.
    pub fn validate(&self) -> Result<(), WeightsError> {
        let filters = self.filters();

        for (i, unit) in self.residual.iter().enumerate() {
            let context = || format!("residual block {i}");
            for (name, conv) in [("conv1", &unit.conv1), ("conv2", &unit.conv2)] {
                if conv.inputs() != filters || conv.outputs() != filters {
                    return Err(WeightsError::Structure {
                        context: context(),
                        detail: format!(
                            "{name} maps {} -> {} channels in a {filters}-filter tower",
                            conv.inputs(),
                            conv.outputs()
                        ),
                    });
                }
            }
            if let Some(se) = &unit.se {
                if se.channels() != filters {
                    return Err(WeightsError::Structure {
                        context: context(),
                        detail: format!(
                            "squeeze-excitation gates {} channels, tower has {filters}",
                            se.channels()
                        ),
                    });
                }
            }
        }

        match &self.policy {
            PolicyHead::Classical { conv, .. } => {
                if conv.inputs() != filters {
                    return Err(WeightsError::Structure {
                        context: "policy head".to_string(),
                        detail: format!(
                            "conv reads {} channels, tower has {filters}",
                            conv.inputs()
                        ),
                    });
                }
            }
            PolicyHead::Convolutional { conv1, conv2 } => {
                if conv1.inputs() != filters {
                    return Err(WeightsError::Structure {
                        context: "policy head".to_string(),
                        detail: format!(
                            "first stage reads {} channels, tower has {filters}",
                            conv1.inputs()
                        ),
                    });
                }
                if conv2.inputs() != conv1.outputs() {
                    return Err(WeightsError::Structure {
                        context: "policy head".to_string(),
                        detail: format!(
                            "second stage reads {} channels but the first produces {}",
                            conv2.inputs(),
                            conv1.outputs()
                        ),
                    });
                }
            }
        }

        if self.value.conv.inputs() != filters {
            return Err(WeightsError::Structure {
                context: "value head".to_string(),
                detail: format!(
                    "value conv reads {} channels, tower has {filters}",
                    self.value.conv.inputs()
                ),
            });
        }
        if self.value.fc2.inputs() != self.value.fc1.outputs() {
            return Err(WeightsError::Structure {
                context: "value head".to_string(),
                detail: format!(
                    "fc2 reads {} values but fc1 produces {}",
                    self.value.fc2.inputs(),
                    self.value.fc1.outputs()
                ),
            });
        }

        Ok(())
    }

    pub fn total_parameters(&self) -> usize {
        self.input.num_parameters()
            + self
                .residual
                .iter()
                .map(ResidualBlock::num_parameters)
                .sum::<usize>()
            + self.policy.num_parameters()
            + self.value.num_parameters()
    }

    /// One-line description for logs and tooling.
    pub fn summary(&self) -> String {
        let gated = self.residual.iter().filter(|u| u.se.is_some()).count();
        format!(
            "{} blocks x {} filters ({} with SE), {} policy, {} parameters, {}",
            self.num_blocks(),
            self.filters(),
            gated,
            self.policy.kind_name(),
            self.total_parameters(),
            if self.is_folded() { "folded" } else { "raw" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::residual::SqueezeExcitation;

    fn conv(filter_size: usize, inputs: usize, outputs: usize) -> ConvBlock {
        let weights = vec![0.1; outputs * inputs * filter_size * filter_size];
        ConvBlock::builder(filter_size, weights, vec![0.2; outputs], vec![1.5; outputs])
            .biases(vec![0.05; outputs])
            .build()
            .unwrap()
    }

    fn dense(inputs: usize, outputs: usize) -> DenseLayer {
        DenseLayer::new(vec![0.1; inputs * outputs], vec![0.0; outputs]).unwrap()
    }

    fn residual_unit(filters: usize, se: bool) -> ResidualBlock {
        let gate = se.then(|| {
            SqueezeExcitation::new(dense(filters, filters / 2), dense(filters / 2, 2 * filters))
                .unwrap()
        });
        ResidualBlock {
            conv1: conv(3, filters, filters),
            conv2: conv(3, filters, filters),
            se: gate,
        }
    }

    fn tiny_net(blocks: usize, filters: usize, se: bool) -> NetworkWeights {
        NetworkWeights {
            input: conv(3, 4, filters),
            residual: (0..blocks).map(|_| residual_unit(filters, se)).collect(),
            policy: PolicyHead::Classical {
                conv: conv(1, filters, 2),
                // Board area of 9 for these tests.
                fc: dense(2 * 9, 7),
            },
            value: ValueHead {
                conv: conv(1, filters, 1),
                fc1: dense(9, 16),
                fc2: dense(16, 1),
            },
        }
    }

    #[test]
    fn test_conv_block_iteration_order_and_count() {
        let net = tiny_net(2, 8, false);
        // input + 2 per residual unit + policy conv + value conv.
        assert_eq!(net.conv_blocks().count(), 1 + 4 + 1 + 1);
        assert_eq!(net.filters(), 8);
        assert_eq!(net.num_blocks(), 2);
    }

    #[test]
    fn test_validate_accepts_consistent_tower() {
        tiny_net(3, 8, true).validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_channel_discontinuity() {
        let mut net = tiny_net(2, 8, false);
        net.residual[1].conv2 = conv(3, 8, 6);
        let err = net.validate().unwrap_err();
        match err {
            WeightsError::Structure { context, .. } => {
                assert_eq!(context, "residual block 1");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_mismatched_gate() {
        let mut net = tiny_net(1, 8, false);
        net.residual[0].se =
            Some(SqueezeExcitation::new(dense(6, 3), dense(3, 12)).unwrap());
        assert!(matches!(
            net.validate().unwrap_err(),
            WeightsError::Structure { .. }
        ));
    }

    #[test]
    fn test_validate_rejects_broken_value_seam() {
        let mut net = tiny_net(1, 8, false);
        net.value.fc2 = dense(10, 1);
        assert!(matches!(
            net.validate().unwrap_err(),
            WeightsError::Structure { .. }
        ));
    }

    #[test]
    fn test_fold_batch_norms_folds_every_block() {
        let mut net = tiny_net(2, 8, true);
        assert!(!net.is_folded());

        net.fold_batch_norms().unwrap();

        assert!(net.is_folded());
        for block in net.conv_blocks() {
            assert!(block.variances().iter().all(|&v| v == 1.0));
            assert!(block.means().iter().all(|&m| m == 0.0));
            assert!(block.shifts().iter().all(|&s| s == 0.0));
        }
    }

    #[test]
    fn test_fold_batch_norms_twice_fails_fast() {
        let mut net = tiny_net(1, 8, false);
        net.fold_batch_norms().unwrap();
        assert_eq!(net.fold_batch_norms().unwrap_err(), WeightsError::AlreadyFolded);
    }

    #[test]
    fn test_selective_fold_then_container_fold_fails_fast() {
        let mut net = tiny_net(1, 8, false);
        net.input.fold_batch_norm().unwrap();
        // The container refuses to re-fold the input block.
        assert_eq!(net.fold_batch_norms().unwrap_err(), WeightsError::AlreadyFolded);
    }

    #[test]
    fn test_total_parameters_sums_all_parts() {
        let net = tiny_net(1, 8, false);
        let by_hand = net.input.num_parameters()
            + net.residual[0].num_parameters()
            + net.policy.num_parameters()
            + net.value.num_parameters();
        assert_eq!(net.total_parameters(), by_hand);
    }

    #[test]
    fn test_summary_mentions_shape_and_state() {
        let mut net = tiny_net(2, 8, true);
        let summary = net.summary();
        assert!(summary.contains("2 blocks x 8 filters"));
        assert!(summary.contains("2 with SE"));
        assert!(summary.contains("classical"));
        assert!(summary.contains("raw"));

        net.fold_batch_norms().unwrap();
        assert!(net.summary().contains("folded"));
    }

    #[test]
    fn test_convolutional_policy_head_iterates_both_stages() {
        let head = PolicyHead::Convolutional {
            conv1: conv(3, 8, 8),
            conv2: conv(3, 8, 12),
        };
        assert_eq!(head.conv_blocks().count(), 2);
        assert_eq!(head.kind_name(), "convolutional");
    }
}
