// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of Pairmax — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Pairwise softmax layer for Rust training stacks.
//!
//! The crate exposes a `Module` style forward/backward surface, the shape
//! planner that sizes its scratch, and a finite-difference checker used to
//! validate analytic gradients.

pub mod gradcheck;
pub mod layers;
pub mod module;
pub mod plan;
pub mod scratch;

pub use gradcheck::{GradientChecker, GradientReport};
pub use layers::{
    pair_softmax, pair_softmax_backward, AnomalyPolicy, AnomalyReport, PairSoftmax,
    PairSoftmaxConfig,
};
pub use module::Module;
pub use plan::{PairPlan, PairPlanner};
pub use scratch::PairScratch;

pub use pairmax_tensor::{PureResult, Tensor, TensorError};
