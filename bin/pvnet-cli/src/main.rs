// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `pvnet`: inspect and fold policy/value network weight files.

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "pvnet",
    version,
    about = "Inspect and fold policy/value network weights"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the structure of a network directory.
    Inspect(commands::inspect::InspectArgs),
    /// Fold batch normalization into the convolution weights and save the
    /// result.
    Fold(commands::fold::FoldArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    commands::init_tracing(cli.verbose);

    match cli.command {
        Commands::Inspect(args) => commands::inspect::run(args),
        Commands::Fold(args) => commands::fold::run(args),
    }
}
