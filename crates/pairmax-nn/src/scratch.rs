// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of Pairmax — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Private staging owned by exactly one pair-walk worker.
//!
//! A serial walk borrows the planner's scratch; a parallel walk builds one
//! [`PairScratch`] per rayon worker. Contents are only meaningful inside the
//! pair iteration that wrote them and are reset before the next one.

use pairmax_tensor::backend::cpu_dense;
use pairmax_tensor::strided::PAIR_LANES;

/// Mutable views over one worker's buffers for a single pair iteration.
pub(crate) struct PairLanes<'a> {
    /// Per-row scalar: max, sum-after-exp, or dot product (`[rows]`).
    pub scale: &'a mut [f32],
    /// Primary gathered lanes (`[rows, 2]`).
    pub lanes: &'a mut [f32],
    /// Secondary gathered lanes, e.g. forward outputs in backward (`[rows, 2]`).
    pub aux: &'a mut [f32],
    /// Lanes handed to the scatter step (`[rows, 2]`).
    pub result: &'a mut [f32],
}

#[derive(Clone, Debug, Default)]
pub struct PairScratch {
    rows: usize,
    scale: Vec<f32>,
    lanes: Vec<f32>,
    aux: Vec<f32>,
    result: Vec<f32>,
}

impl PairScratch {
    /// Staging for `rows` batch elements.
    pub fn new(rows: usize) -> Self {
        Self::with_scale_len(rows, rows)
    }

    /// Like [`PairScratch::new`] but reserves `scale_len` scale slots, which the
    /// planner sizes from the input shape with the pair axis collapsed.
    pub fn with_scale_len(rows: usize, scale_len: usize) -> Self {
        let block = rows * PAIR_LANES;
        Self {
            rows,
            scale: vec![0.0; scale_len.max(rows)],
            lanes: vec![0.0; block],
            aux: vec![0.0; block],
            result: vec![0.0; block],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of scale slots held, at least [`PairScratch::rows`].
    pub fn scale_capacity(&self) -> usize {
        self.scale.len()
    }

    /// Clears every buffer so nothing leaks from the previous pair iteration.
    pub fn reset(&mut self) {
        for buffer in [
            &mut self.scale,
            &mut self.lanes,
            &mut self.aux,
            &mut self.result,
        ] {
            cpu_dense::set(0.0, buffer);
        }
    }

    /// The `[rows, 2]` block produced by the last pair iteration.
    pub fn result(&self) -> &[f32] {
        &self.result
    }

    pub(crate) fn split(&mut self) -> PairLanes<'_> {
        PairLanes {
            scale: &mut self.scale[..self.rows],
            lanes: &mut self.lanes,
            aux: &mut self.aux,
            result: &mut self.result,
        }
    }
}
