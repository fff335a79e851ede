// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of Pairmax — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Strided copies between a batch-major `[rows, dim]` buffer and a contiguous
//! `[rows, 2]` staging block holding one pair of lanes per row.
//!
//! Pair `p` covers lanes `2p` and `2p + 1` of every row. After
//! [`gather_pair`], `staging[n * 2 + l] == src[n * dim + 2p + l]`;
//! [`scatter_pair`] is the exact inverse and touches no other lane of `dst`.

use crate::pure::{PureResult, TensorError};

/// Number of lanes in a pair.
pub const PAIR_LANES: usize = 2;

fn check_layout(
    buffer: usize,
    staging: usize,
    rows: usize,
    dim: usize,
    pair: usize,
) -> PureResult<()> {
    if buffer != rows * dim {
        return Err(TensorError::DataLength {
            expected: rows * dim,
            got: buffer,
        });
    }
    if staging != rows * PAIR_LANES {
        return Err(TensorError::DataLength {
            expected: rows * PAIR_LANES,
            got: staging,
        });
    }
    if PAIR_LANES * pair + 1 >= dim {
        return Err(TensorError::InvalidValue {
            label: "pair index outside the feature dimension",
        });
    }
    Ok(())
}

/// Copies the two lanes of `pair` from every row of `src` into `staging`.
pub fn gather_pair(
    src: &[f32],
    rows: usize,
    dim: usize,
    pair: usize,
    staging: &mut [f32],
) -> PureResult<()> {
    check_layout(src.len(), staging.len(), rows, dim, pair)?;
    let offset = PAIR_LANES * pair;
    for (row, lanes) in staging.chunks_exact_mut(PAIR_LANES).enumerate() {
        let base = row * dim + offset;
        lanes.copy_from_slice(&src[base..base + PAIR_LANES]);
    }
    Ok(())
}

/// Writes the `[rows, 2]` block in `staging` back into the lanes of `pair`.
pub fn scatter_pair(
    staging: &[f32],
    rows: usize,
    dim: usize,
    pair: usize,
    dst: &mut [f32],
) -> PureResult<()> {
    check_layout(dst.len(), staging.len(), rows, dim, pair)?;
    let offset = PAIR_LANES * pair;
    for (row, lanes) in staging.chunks_exact(PAIR_LANES).enumerate() {
        let base = row * dim + offset;
        dst[base..base + PAIR_LANES].copy_from_slice(lanes);
    }
    Ok(())
}
