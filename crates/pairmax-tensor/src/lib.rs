// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of Pairmax — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

// crates/pairmax-tensor/src/lib.rs
pub mod backend;
pub mod pure;
pub mod strided;

pub use pure::{PureResult, Tensor, TensorError};
