// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Process-wide configuration shared by the invariant Gabor convolution crates.
//!
//! Two concerns live here: deterministic seeding of parameter initialisers and
//! the global `tracing` subscriber.

pub mod determinism;
pub mod tracing;

pub use determinism::{rng_from_label, rng_from_optional, DeterminismConfig};
pub use self::tracing::{ensure_tracing, init_tracing, InitError};
