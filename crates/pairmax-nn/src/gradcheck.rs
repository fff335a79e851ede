// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of Pairmax — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::Module;
use crate::{PureResult, Tensor, TensorError};

/// Compares a module's analytic gradient with central finite differences of
/// the scalar loss `L = sum(upstream * forward(x))`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GradientChecker {
    /// Perturbation applied to each input coordinate.
    pub step: f32,
    /// Allowed error after scaling by `max(|analytic|, |numeric|, 1)`.
    pub threshold: f32,
}

impl Default for GradientChecker {
    fn default() -> Self {
        Self {
            step: 1.0e-2,
            threshold: 1.0e-3,
        }
    }
}

/// Outcome of [`GradientChecker::check`].
#[derive(Clone, Debug, PartialEq)]
pub struct GradientReport {
    pub analytic: Vec<f32>,
    pub numeric: Vec<f32>,
    pub max_scaled_error: f32,
    /// Flat input offset with the largest scaled error.
    pub worst_offset: usize,
    pub threshold: f32,
}

impl GradientReport {
    pub fn passed(&self) -> bool {
        self.max_scaled_error <= self.threshold
    }

    pub fn checked(&self) -> usize {
        self.analytic.len()
    }
}

impl GradientChecker {
    pub fn new(step: f32, threshold: f32) -> PureResult<Self> {
        if !(step > 0.0) || !step.is_finite() {
            return Err(TensorError::InvalidValue {
                label: "gradient_check_step",
            });
        }
        if !(threshold > 0.0) || !threshold.is_finite() {
            return Err(TensorError::InvalidValue {
                label: "gradient_check_threshold",
            });
        }
        Ok(Self { step, threshold })
    }

    /// Checks every coordinate of `input`.
    pub fn check<M>(
        &self,
        module: &mut M,
        input: &Tensor,
        upstream: &Tensor,
    ) -> PureResult<GradientReport>
    where
        M: Module + ?Sized,
    {
        let output = module.forward(input)?;
        output.expect_same_shape(upstream)?;
        let analytic = module.backward(&output, upstream)?;
        analytic.expect_same_shape(input)?;

        let mut nudged = input.clone();
        let mut numeric = Vec::with_capacity(input.len());
        let mut max_scaled_error = 0.0f32;
        let mut worst_offset = 0;
        for (offset, (&original, &grad)) in input
            .data()
            .iter()
            .zip(analytic.data().iter())
            .enumerate()
        {
            let (hi, lo) = (original + self.step, original - self.step);
            nudged.data_mut()[offset] = hi;
            let plus = module.forward(&nudged)?.weighted_sum(upstream)?;
            nudged.data_mut()[offset] = lo;
            let minus = module.forward(&nudged)?.weighted_sum(upstream)?;
            nudged.data_mut()[offset] = original;

            let estimate = ((plus - minus) / (hi as f64 - lo as f64)) as f32;
            let scale = grad.abs().max(estimate.abs()).max(1.0);
            let error = (grad - estimate).abs() / scale;
            if error > max_scaled_error {
                max_scaled_error = error;
                worst_offset = offset;
            }
            numeric.push(estimate);
        }

        Ok(GradientReport {
            analytic: analytic.into_vec(),
            numeric,
            max_scaled_error,
            worst_offset,
            threshold: self.threshold,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `y = x^2` with a deliberately wrong gradient switch.
    struct Square {
        honest: bool,
    }

    impl Module for Square {
        fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
            Tensor::from_vec(input.shape(), input.data().iter().map(|x| x * x).collect())
        }

        fn backward(&mut self, _output: &Tensor, grad_output: &Tensor) -> PureResult<Tensor> {
            // Only the upstream gradient is needed to exercise the checker.
            let factor = if self.honest { 1.0 } else { 3.0 };
            let data = grad_output.data().iter().map(|g| g * factor).collect();
            Tensor::from_vec(grad_output.shape(), data)
        }
    }

    #[test]
    fn rejects_invalid_settings() {
        assert!(GradientChecker::new(0.0, 1e-3).is_err());
        assert!(GradientChecker::new(1e-2, f32::NAN).is_err());
        assert!(GradientChecker::new(1e-2, 1e-3).is_ok());
    }

    #[test]
    fn flags_wrong_gradients() {
        // At x = 0.5 the true gradient of x^2 is 1.0, which `honest` returns.
        let input = Tensor::from_vec(&[1, 2], vec![0.5, 0.5]).unwrap();
        let upstream = Tensor::from_vec(&[1, 2], vec![1.0, 1.0]).unwrap();
        let checker = GradientChecker::default();

        let report = checker
            .check(&mut Square { honest: true }, &input, &upstream)
            .unwrap();
        assert!(report.passed(), "{report:?}");
        assert_eq!(report.checked(), 2);

        let report = checker
            .check(&mut Square { honest: false }, &input, &upstream)
            .unwrap();
        assert!(!report.passed());
    }
}
