// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of Pairmax — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::{PureResult, Tensor};

/// Minimal `nn.Module` style surface consumed by the enclosing framework.
///
/// Layers are evaluated through `&self` so a forward pass can be replayed
/// freely (gradient checks perturb inputs many times); caches that must
/// change during a forward pass live behind interior mutability.
pub trait Module {
    /// Runs a forward pass and returns a freshly owned output.
    fn forward(&self, input: &Tensor) -> PureResult<Tensor>;

    /// Propagates a gradient backwards.
    ///
    /// `output` is the tensor previously returned by [`Module::forward`]; the
    /// layers in this crate express their Jacobian through their outputs, not
    /// their inputs.
    fn backward(&mut self, output: &Tensor, grad_output: &Tensor) -> PureResult<Tensor>;
}

impl<M: Module + ?Sized> Module for Box<M> {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        (**self).forward(input)
    }

    fn backward(&mut self, output: &Tensor, grad_output: &Tensor) -> PureResult<Tensor> {
        (**self).backward(output, grad_output)
    }
}
