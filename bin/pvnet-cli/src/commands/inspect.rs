// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `pvnet inspect`: print the structure of a network directory.

use std::path::PathBuf;

use anyhow::Context;

use net_loader::{NetLoader, NetManifest, MANIFEST_FILE};
use net_weights::{ConvBlock, DenseLayer, PolicyHead};

use super::truncate;

#[derive(clap::Args)]
pub struct InspectArgs {
    /// Network directory containing net.json and net.safetensors.
    #[arg(long)]
    pub net: PathBuf,
}

pub fn run(args: InspectArgs) -> anyhow::Result<()> {
    let manifest = NetManifest::from_file(&args.net.join(MANIFEST_FILE))
        .with_context(|| format!("failed to read manifest from {}", args.net.display()))?;
    let network = NetLoader::load(&args.net)
        .with_context(|| format!("failed to load network from {}", args.net.display()))?;

    println!("┌──────────────────────────────────────┐");
    println!("│ pvnet · network inspection           │");
    println!("└──────────────────────────────────────┘");
    println!();
    println!("Net:    {}", manifest.name);
    println!("Layout: {}", network.summary());
    println!();
    println!(
        "  {:<18} {:>5} {:>5}  {:>6}  {:>10}  {}",
        "block", "in", "out", "filter", "params", "state"
    );

    conv_row("input.conv", &network.input);
    for (i, unit) in network.residual.iter().enumerate() {
        conv_row(&format!("tower.{i}.conv1"), &unit.conv1);
        conv_row(&format!("tower.{i}.conv2"), &unit.conv2);
        if let Some(se) = &unit.se {
            dense_row(&format!("tower.{i}.se.fc1"), se.fc1());
            dense_row(&format!("tower.{i}.se.fc2"), se.fc2());
        }
    }
    match &network.policy {
        PolicyHead::Classical { conv, fc } => {
            conv_row("policy.conv", conv);
            dense_row("policy.fc", fc);
        }
        PolicyHead::Convolutional { conv1, conv2 } => {
            conv_row("policy.conv1", conv1);
            conv_row("policy.conv2", conv2);
        }
    }
    conv_row("value.conv", &network.value.conv);
    dense_row("value.fc1", &network.value.fc1);
    dense_row("value.fc2", &network.value.fc2);

    println!();
    println!("Total parameters: {}", network.total_parameters());
    Ok(())
}

fn conv_row(name: &str, block: &ConvBlock) {
    println!(
        "  {:<18} {:>5} {:>5}  {:>6}  {:>10}  {}",
        truncate(name, 18),
        block.inputs(),
        block.outputs(),
        format!("{0}x{0}", block.filter_size()),
        block.num_parameters(),
        block.fold_state(),
    );
}

fn dense_row(name: &str, layer: &DenseLayer) {
    println!(
        "  {:<18} {:>5} {:>5}  {:>6}  {:>10}  {}",
        truncate(name, 18),
        layer.inputs(),
        layer.outputs(),
        "-",
        layer.num_parameters(),
        "-",
    );
}
