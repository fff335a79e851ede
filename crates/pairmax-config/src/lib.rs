// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of Pairmax — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Process-wide knobs shared by the pairmax crates: the tracing subscriber and
//! the deterministic runtime switches.

pub mod determinism;
pub mod tracing;

pub use determinism::DeterminismConfig;
pub use tracing::{flush_chrome_trace, init_tracing, InitError};
