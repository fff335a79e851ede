// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of Pairmax — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Pairwise softmax: an independent, max-shifted two-way softmax over every
//! pair of consecutive feature lanes, plus its exact backward pass.
//!
//! Each pair index is processed column-wise across the whole batch: the two
//! lanes are gathered into a contiguous `[N, 2]` block, normalised with dense
//! primitives (outer-product broadcast, row reductions) and scattered back.

use crate::module::Module;
use crate::plan::{PairPlan, PairPlanner};
use crate::scratch::{PairLanes, PairScratch};
use crate::{PureResult, Tensor, TensorError};
use pairmax_config::determinism;
use pairmax_tensor::backend::cpu_dense;
use pairmax_tensor::strided::{self, PAIR_LANES};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use tracing::{trace_span, warn};

/// What to do when non-finite values reach the exponential step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyPolicy {
    /// Record the report only.
    Ignore,
    /// Record the report and emit one warning per forward call.
    #[default]
    Warn,
    /// Fail the forward call with [`TensorError::NumericAnomaly`].
    Error,
}

/// Layer configuration, loadable from JSON. Missing fields take defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairSoftmaxConfig {
    /// Axis whose extent is split into pairs; negative values count from the end.
    pub axis: isize,
    pub anomaly_policy: AnomalyPolicy,
    /// Allows the pair walk to fan out over rayon workers.
    pub parallel: bool,
    /// Element count below which the walk stays on the calling thread.
    pub parallel_min_elements: usize,
}

impl Default for PairSoftmaxConfig {
    fn default() -> Self {
        Self {
            axis: 1,
            anomaly_policy: AnomalyPolicy::Warn,
            parallel: true,
            parallel_min_elements: 16_384,
        }
    }
}

impl PairSoftmaxConfig {
    /// Parses a JSON object such as `{"axis": -1, "anomaly_policy": "error"}`.
    pub fn from_json(raw: &str) -> PureResult<Self> {
        serde_json::from_str(raw).map_err(|err| TensorError::SerializationError {
            message: err.to_string(),
        })
    }

    pub fn with_axis(mut self, axis: isize) -> Self {
        self.axis = axis;
        self
    }

    pub fn with_anomaly_policy(mut self, policy: AnomalyPolicy) -> Self {
        self.anomaly_policy = policy;
        self
    }

    pub fn with_parallel(mut self, parallel: bool, min_elements: usize) -> Self {
        self.parallel = parallel;
        self.parallel_min_elements = min_elements;
        self
    }
}

/// Non-finite values observed while shifting lanes before exponentiation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AnomalyReport {
    /// Number of offending lanes.
    pub count: usize,
    /// Lowest flat input offset that misbehaved, with the shifted value seen there.
    pub first: Option<(usize, f32)>,
}

impl AnomalyReport {
    fn scan(shifted: &[f32], dim: usize, pair: usize) -> Self {
        let mut report = Self::default();
        for (index, &value) in shifted.iter().enumerate() {
            if value.is_finite() {
                continue;
            }
            let offset = (index / PAIR_LANES) * dim + pair * PAIR_LANES + index % PAIR_LANES;
            report.count += 1;
            if report.first.is_none() {
                report.first = Some((offset, value));
            }
        }
        report
    }

    fn merge(&mut self, other: AnomalyReport) {
        self.count += other.count;
        self.first = match (self.first, other.first) {
            (Some(a), Some(b)) => Some(if b.0 < a.0 { b } else { a }),
            (a, b) => a.or(b),
        };
    }

    pub fn is_clean(&self) -> bool {
        self.count == 0
    }
}

/// Forward for one pair index; leaves the normalised `[N, 2]` block in
/// `scratch.result()`.
fn forward_pair(
    plan: &PairPlan,
    input: &[f32],
    pair: usize,
    scratch: &mut PairScratch,
) -> PureResult<AnomalyReport> {
    scratch.reset();
    let rows = plan.outer();
    let ones = plan.pair_ones();
    let PairLanes {
        scale,
        lanes,
        result,
        ..
    } = scratch.split();

    strided::gather_pair(input, rows, plan.dim(), pair, lanes)?;
    for (max, x) in scale.iter_mut().zip(lanes.chunks_exact(PAIR_LANES)) {
        *max = x[0].max(x[1]);
    }
    cpu_dense::copy(lanes, result).map_err(TensorError::cpu)?;
    // result -= max ⊗ ones
    cpu_dense::gemm(rows, PAIR_LANES, 1, -1.0, scale, ones, 1.0, result)
        .map_err(TensorError::cpu)?;
    let report = AnomalyReport::scan(result, plan.dim(), pair);
    cpu_dense::exp_inplace(result);
    // At least one lane is exp(0) = 1, so every sum is >= 1.
    cpu_dense::gemv(rows, PAIR_LANES, 1.0, result, ones, 0.0, scale)
        .map_err(TensorError::cpu)?;
    for (lanes, &sum) in result.chunks_exact_mut(PAIR_LANES).zip(scale.iter()) {
        cpu_dense::scal(1.0 / sum, lanes);
    }
    Ok(report)
}

/// Backward for one pair index: `dx = y * (dy - <dy, y>)` per row.
fn backward_pair(
    plan: &PairPlan,
    grad_output: &[f32],
    output: &[f32],
    pair: usize,
    scratch: &mut PairScratch,
) -> PureResult<AnomalyReport> {
    scratch.reset();
    let rows = plan.outer();
    let PairLanes {
        scale,
        lanes,
        aux,
        result,
    } = scratch.split();

    strided::gather_pair(grad_output, rows, plan.dim(), pair, lanes)?;
    strided::gather_pair(output, rows, plan.dim(), pair, aux)?;
    cpu_dense::copy(lanes, result).map_err(TensorError::cpu)?;
    for ((dot, grad), probs) in scale
        .iter_mut()
        .zip(lanes.chunks_exact(PAIR_LANES))
        .zip(aux.chunks_exact(PAIR_LANES))
    {
        *dot = cpu_dense::dot(grad, probs).map_err(TensorError::cpu)?;
    }
    cpu_dense::gemm(rows, PAIR_LANES, 1, -1.0, scale, plan.pair_ones(), 1.0, result)
        .map_err(TensorError::cpu)?;
    cpu_dense::mul_inplace(result, aux).map_err(TensorError::cpu)?;
    Ok(AnomalyReport::default())
}

/// Runs `kernel` for every pair index and scatters each block into `dst`.
///
/// The parallel path gives each rayon worker its own scratch and scatters in
/// pair order afterwards, so both paths produce identical bits.
fn walk_pairs<K>(
    plan: &PairPlan,
    scratch: &mut PairScratch,
    parallel: bool,
    dst: &mut [f32],
    kernel: K,
) -> PureResult<AnomalyReport>
where
    K: Fn(usize, &mut PairScratch) -> PureResult<AnomalyReport> + Sync,
{
    let (rows, dim) = (plan.outer(), plan.dim());
    let mut report = AnomalyReport::default();
    if parallel {
        let staged = (0..plan.pairs())
            .into_par_iter()
            .map_init(
                || plan.worker_scratch(),
                |scratch, pair| -> PureResult<(AnomalyReport, Vec<f32>)> {
                    let pair_report = kernel(pair, scratch)?;
                    Ok((pair_report, scratch.result().to_vec()))
                },
            )
            .collect::<PureResult<Vec<_>>>()?;
        for (pair, (pair_report, block)) in staged.into_iter().enumerate() {
            strided::scatter_pair(&block, rows, dim, pair, dst)?;
            report.merge(pair_report);
        }
    } else {
        for pair in 0..plan.pairs() {
            report.merge(kernel(pair, scratch)?);
            strided::scatter_pair(scratch.result(), rows, dim, pair, dst)?;
        }
    }
    Ok(report)
}

/// Pairwise two-way softmax layer.
#[derive(Debug, Default)]
pub struct PairSoftmax {
    config: PairSoftmaxConfig,
    planner: RefCell<PairPlanner>,
    last_anomalies: Cell<AnomalyReport>,
}

impl PairSoftmax {
    /// Creates the layer with the default configuration (axis 1).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: PairSoftmaxConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &PairSoftmaxConfig {
        &self.config
    }

    /// Anomalies recorded by the most recent successful forward pass. A
    /// forward rejected by [`AnomalyPolicy::Error`] leaves it unchanged.
    pub fn last_anomalies(&self) -> AnomalyReport {
        self.last_anomalies.get()
    }

    /// Shape of the last successfully planned forward input.
    pub fn planned_shape(&self) -> Option<Vec<usize>> {
        self.planner
            .borrow()
            .plan()
            .map(|plan| plan.shape().to_vec())
    }

    /// How many times the shape planner had to rebuild its buffers.
    pub fn replans(&self) -> usize {
        self.planner.borrow().replans()
    }

    fn runs_parallel(config: &PairSoftmaxConfig, plan: &PairPlan) -> bool {
        config.parallel
            && plan.pairs() > 1
            && plan.outer() * plan.dim() >= config.parallel_min_elements
            && !determinism::lock_reduction_order()
    }

    /// Forward against `planner`; the caller commits or rolls back the plan.
    fn forward_planned(
        &self,
        planner: &mut PairPlanner,
        input: &Tensor,
        axis: usize,
    ) -> PureResult<(Tensor, AnomalyReport)> {
        let (plan, scratch) = planner.reshape(input.shape(), axis)?;
        let parallel = Self::runs_parallel(&self.config, plan);
        let _span = trace_span!(
            "pair_softmax_forward",
            rows = plan.outer(),
            dim = plan.dim(),
            parallel
        )
        .entered();

        // Pass-through copy; every lane is then overwritten by its pair.
        let mut output = input.clone();
        let source = input.data();
        let report = walk_pairs(plan, scratch, parallel, output.data_mut(), |pair, scratch| {
            forward_pair(plan, source, pair, scratch)
        })?;
        self.apply_anomaly_policy(report)?;
        Ok((output, report))
    }

    fn apply_anomaly_policy(&self, report: AnomalyReport) -> PureResult<()> {
        let Some((offset, value)) = report.first else {
            return Ok(());
        };
        match self.config.anomaly_policy {
            AnomalyPolicy::Ignore => Ok(()),
            AnomalyPolicy::Warn => {
                warn!(
                    count = report.count,
                    offset,
                    value = %value,
                    "non-finite values entered the pair softmax exponential"
                );
                Ok(())
            }
            AnomalyPolicy::Error => Err(TensorError::NumericAnomaly {
                label: "pair_softmax_forward",
                offset,
                value,
            }),
        }
    }
}

impl Module for PairSoftmax {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let axis = input.canonical_axis(self.config.axis)?;
        let mut planner = self.planner.borrow_mut();
        let checkpoint = planner.checkpoint();
        match self.forward_planned(&mut planner, input, axis) {
            Ok((output, report)) => {
                self.last_anomalies.set(report);
                Ok(output)
            }
            Err(err) => {
                planner.rollback(checkpoint);
                Err(err)
            }
        }
    }

    fn backward(&mut self, output: &Tensor, grad_output: &Tensor) -> PureResult<Tensor> {
        output.expect_same_shape(grad_output)?;
        let axis = output.canonical_axis(self.config.axis)?;
        let config = &self.config;
        let (plan, scratch) = self.planner.get_mut().expect(output.shape(), axis)?;
        let parallel = Self::runs_parallel(config, plan);
        let _span = trace_span!(
            "pair_softmax_backward",
            rows = plan.outer(),
            dim = plan.dim(),
            parallel
        )
        .entered();

        let mut grad_input = grad_output.clone();
        let (grads, probs) = (grad_output.data(), output.data());
        walk_pairs(plan, scratch, parallel, grad_input.data_mut(), |pair, scratch| {
            backward_pair(plan, grads, probs, pair, scratch)
        })?;
        Ok(grad_input)
    }
}

/// Stateless forward: pairwise softmax of `input` along `axis`.
pub fn pair_softmax(input: &Tensor, axis: isize) -> PureResult<Tensor> {
    PairSoftmax::with_config(PairSoftmaxConfig::default().with_axis(axis)).forward(input)
}

/// Stateless backward: gradient with respect to the inputs that produced
/// `output`, given the upstream `grad_output`.
pub fn pair_softmax_backward(
    grad_output: &Tensor,
    output: &Tensor,
    axis: isize,
) -> PureResult<Tensor> {
    PairSoftmax::with_config(PairSoftmaxConfig::default().with_axis(axis))
        .backward(output, grad_output)
}
