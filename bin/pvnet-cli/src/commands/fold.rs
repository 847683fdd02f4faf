// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `pvnet fold`: fold batch normalization into the convolution weights and
//! write the result as a new network directory.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;

use net_loader::{save, NetLoader, NetManifest, MANIFEST_FILE};

#[derive(clap::Args)]
pub struct FoldArgs {
    /// Network directory containing net.json and net.safetensors.
    #[arg(long)]
    pub net: PathBuf,

    /// Directory to write the folded network into.
    #[arg(long)]
    pub output: PathBuf,
}

pub fn run(args: FoldArgs) -> anyhow::Result<()> {
    let manifest = NetManifest::from_file(&args.net.join(MANIFEST_FILE))
        .with_context(|| format!("failed to read manifest from {}", args.net.display()))?;
    let mut network = NetLoader::load(&args.net)
        .with_context(|| format!("failed to load network from {}", args.net.display()))?;

    if network.is_folded() {
        anyhow::bail!("network '{}' is already folded", manifest.name);
    }

    let block_count = network.conv_blocks().count();
    let started = Instant::now();
    network
        .fold_batch_norms()
        .context("failed to fold batch normalization")?;
    let elapsed = started.elapsed();
    tracing::info!(blocks = block_count, ?elapsed, "folding finished");

    save(&args.output, &manifest, &network)
        .with_context(|| format!("failed to write folded network to {}", args.output.display()))?;

    println!("┌──────────────────────────────────────┐");
    println!("│ pvnet · batch-norm folding           │");
    println!("└──────────────────────────────────────┘");
    println!();
    println!("Net:     {}", manifest.name);
    println!("Folded:  {block_count} convolution blocks in {elapsed:?}");
    println!("Layout:  {}", network.summary());
    println!();
    println!("Folded network written to {}", args.output.display());
    Ok(())
}
