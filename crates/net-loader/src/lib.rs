// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # net-loader
//!
//! Reads and writes policy/value network directories: a `net.json`
//! manifest describing the architecture and a `net.safetensors` payload
//! holding the parameters.
//!
//! - [`NetManifest`]: the manifest schema, with validation.
//! - [`NetLoader`]: memory-maps the payload and assembles a
//!   [`net_weights::NetworkWeights`] container, translating legacy
//!   absent-tensor conventions into construction defaults.
//! - [`save`]: writes a container back out; folded networks are written
//!   without normalization tensors and reload directly into the folded
//!   state.

mod error;
mod loader;
mod manifest;
mod writer;

pub use error::LoadError;
pub use loader::{NetLoader, MANIFEST_FILE, TENSORS_FILE};
pub use manifest::{NetManifest, PolicyKind, ResidualEntry};
pub use writer::save;
