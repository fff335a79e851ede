// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of Pairmax — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::scratch::PairScratch;
use crate::{PureResult, TensorError};
use pairmax_tensor::pure;
use pairmax_tensor::strided::PAIR_LANES;
use tracing::debug;

/// Layout of a pairwise reduction over an axis-resolved shape.
///
/// The tensor is viewed as `[outer, dim]` where `outer` multiplies the axes
/// before `axis` and `dim` multiplies `axis` and everything after it. Pairs are
/// consecutive lanes of `dim`.
#[derive(Clone, Debug, PartialEq)]
pub struct PairPlan {
    shape: Vec<usize>,
    axis: usize,
    outer: usize,
    dim: usize,
    pair_count: usize,
    multiplier: Vec<f32>,
    scale_shape: Vec<usize>,
}

impl PairPlan {
    /// Plans `shape` around the absolute `axis`.
    pub fn new(shape: &[usize], axis: usize) -> PureResult<Self> {
        if shape.is_empty() || shape.contains(&0) {
            return Err(TensorError::InvalidShape {
                shape: shape.to_vec(),
            });
        }
        if axis >= shape.len() {
            return Err(TensorError::AxisOutOfRange {
                axis: axis as isize,
                ndim: shape.len(),
            });
        }
        let extent = shape[axis];
        if extent % PAIR_LANES != 0 {
            return Err(TensorError::OddPairExtent { axis, extent });
        }
        let outer = pure::count_range(shape, 0, axis)?;
        let dim = pure::count_range(shape, axis, shape.len())?;
        let mut scale_shape = shape.to_vec();
        scale_shape[axis] = 1;
        Ok(Self {
            shape: shape.to_vec(),
            axis,
            outer,
            dim,
            pair_count: extent / PAIR_LANES,
            // One slot per lane along the axis so the first two always exist.
            multiplier: vec![1.0; extent],
            scale_shape,
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    /// Batch size `N` of the `[N, D]` view.
    pub fn outer(&self) -> usize {
        self.outer
    }

    /// Feature dimension `D` of the `[N, D]` view.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Pairs along the planned axis itself.
    pub fn pair_count(&self) -> usize {
        self.pair_count
    }

    /// Pair indices walked by the transforms (`D / 2`).
    pub fn pairs(&self) -> usize {
        self.dim / PAIR_LANES
    }

    /// The ones multiplier.
    pub fn multiplier(&self) -> &[f32] {
        &self.multiplier
    }

    /// Ones used to broadcast a per-row scalar across both lanes of a pair.
    pub fn pair_ones(&self) -> &[f32] {
        &self.multiplier[..PAIR_LANES]
    }

    /// Input shape with the pair axis collapsed to 1.
    pub fn scale_shape(&self) -> &[usize] {
        &self.scale_shape
    }

    pub fn matches(&self, shape: &[usize], axis: usize) -> bool {
        self.axis == axis && self.shape == shape
    }

    /// Scratch sized for the planner-owned serial walk.
    pub fn serial_scratch(&self) -> PairScratch {
        PairScratch::with_scale_len(self.outer, self.scale_shape.iter().product())
    }

    /// Private scratch for one parallel worker.
    pub fn worker_scratch(&self) -> PairScratch {
        PairScratch::new(self.outer)
    }
}

/// Caches the last [`PairPlan`] together with the serial scratch it sized.
#[derive(Debug, Default)]
pub struct PairPlanner {
    plan: Option<PairPlan>,
    scratch: PairScratch,
    replans: usize,
}

impl PairPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// The plan of the last successful reshape, if any.
    pub fn plan(&self) -> Option<&PairPlan> {
        self.plan.as_ref()
    }

    /// Number of times a new plan had to be built.
    pub fn replans(&self) -> usize {
        self.replans
    }

    /// Re-plans when `shape` or `axis` differ from the cached plan. A failed
    /// plan leaves the previous one untouched.
    pub fn reshape(
        &mut self,
        shape: &[usize],
        axis: usize,
    ) -> PureResult<(&PairPlan, &mut PairScratch)> {
        let fresh = matches!(&self.plan, Some(plan) if plan.matches(shape, axis));
        if !fresh {
            let plan = PairPlan::new(shape, axis)?;
            debug!(
                shape = ?plan.shape(),
                axis,
                outer = plan.outer(),
                dim = plan.dim(),
                "planned pair layout"
            );
            self.scratch = plan.serial_scratch();
            self.plan = Some(plan);
            self.replans += 1;
        }
        self.parts()
    }

    /// The committed plan, to hand back to [`PairPlanner::rollback`] if the
    /// call about to re-plan fails.
    pub fn checkpoint(&self) -> Option<PairPlan> {
        self.plan.clone()
    }

    /// Restores `checkpoint` and the serial scratch it sized. Re-plan counts are
    /// kept, since the discarded plan was still built.
    pub fn rollback(&mut self, checkpoint: Option<PairPlan>) {
        if self.plan == checkpoint {
            return;
        }
        self.scratch = checkpoint
            .as_ref()
            .map(PairPlan::serial_scratch)
            .unwrap_or_default();
        self.plan = checkpoint;
    }

    /// Validates a backward-pass shape against the cached plan, planning from
    /// `shape` when no forward pass ran yet.
    pub fn expect(
        &mut self,
        shape: &[usize],
        axis: usize,
    ) -> PureResult<(&PairPlan, &mut PairScratch)> {
        let planned = self
            .plan
            .as_ref()
            .map(|plan| (plan.matches(shape, axis), plan.shape().to_vec()));
        match planned {
            None => self.reshape(shape, axis),
            Some((true, _)) => self.parts(),
            Some((false, left)) => Err(TensorError::ShapeMismatch {
                left,
                right: shape.to_vec(),
            }),
        }
    }

    fn parts(&mut self) -> PureResult<(&PairPlan, &mut PairScratch)> {
        match self.plan.as_ref() {
            Some(plan) => Ok((plan, &mut self.scratch)),
            None => Err(TensorError::InvalidValue {
                label: "pair planner has no plan",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plans_outer_and_feature_views() {
        let plan = PairPlan::new(&[2, 4, 3], 1).unwrap();
        assert_eq!(plan.outer(), 2);
        assert_eq!(plan.dim(), 12);
        assert_eq!(plan.pair_count(), 2);
        assert_eq!(plan.pairs(), 6);
        assert_eq!(plan.scale_shape(), &[2, 1, 3]);
        assert_eq!(plan.multiplier(), &[1.0; 4]);
        assert_eq!(plan.pair_ones(), &[1.0, 1.0]);
        assert_eq!(plan.serial_scratch().scale_capacity(), 6);
        assert_eq!(plan.worker_scratch().scale_capacity(), 2);
    }

    #[test]
    fn single_pair_axis_still_broadcasts_two_lanes() {
        let plan = PairPlan::new(&[5, 2], 1).unwrap();
        assert_eq!(plan.pair_count(), 1);
        assert_eq!(plan.pair_ones().len(), 2);
    }

    #[test]
    fn odd_extent_is_a_shape_error() {
        let err = PairPlan::new(&[2, 3], 1).unwrap_err();
        assert_eq!(err, TensorError::OddPairExtent { axis: 1, extent: 3 });
        assert!(err.is_shape_error());
        assert!(PairPlan::new(&[2, 4], 2).unwrap_err().is_shape_error());
    }

    #[test]
    fn planner_only_replans_on_change() {
        let mut planner = PairPlanner::new();
        planner.reshape(&[2, 4], 1).unwrap();
        planner.reshape(&[2, 4], 1).unwrap();
        assert_eq!(planner.replans(), 1);
        planner.reshape(&[3, 4], 1).unwrap();
        assert_eq!(planner.replans(), 2);
        assert!(planner.reshape(&[3, 5], 1).is_err());
        assert_eq!(planner.plan().map(|plan| plan.shape().to_vec()), Some(vec![3, 4]));
    }

    #[test]
    fn expect_rejects_shapes_from_another_forward() {
        let mut planner = PairPlanner::new();
        planner.reshape(&[2, 4], 1).unwrap();
        let err = planner.expect(&[2, 6], 1).unwrap_err();
        assert_eq!(
            err,
            TensorError::ShapeMismatch {
                left: vec![2, 4],
                right: vec![2, 6]
            }
        );
        assert!(planner.expect(&[2, 4], 1).is_ok());

        let mut cold = PairPlanner::new();
        let (plan, _) = cold.expect(&[1, 2], 1).unwrap();
        assert_eq!(plan.pairs(), 1);
    }

    #[test]
    fn rollback_restores_the_committed_plan() {
        let mut planner = PairPlanner::new();
        planner.reshape(&[1, 2], 1).unwrap();
        let checkpoint = planner.checkpoint();
        planner.reshape(&[3, 4], 1).unwrap();
        planner.rollback(checkpoint);
        assert_eq!(planner.plan().map(|plan| plan.shape().to_vec()), Some(vec![1, 2]));
        assert_eq!(planner.replans(), 2);
        let (plan, scratch) = planner.expect(&[1, 2], 1).unwrap();
        assert_eq!(plan.outer(), 1);
        assert_eq!(scratch.rows(), 1);

        let mut cold = PairPlanner::new();
        cold.reshape(&[2, 2], 1).unwrap();
        cold.rollback(None);
        assert!(cold.plan().is_none());
    }
}
