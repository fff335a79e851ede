// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of Pairmax — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Row-major dense primitives with BLAS-style `alpha`/`beta` semantics.
//!
//! Every kernel validates buffer lengths up front and reports mismatches as a
//! plain message; nothing is written when validation fails. When `beta` is
//! zero the destination is overwritten without being read, so stale NaNs in a
//! reused scratch buffer never leak into the result.

#[inline]
fn expect_len(label: &str, expected: usize, got: usize) -> Result<(), String> {
    if expected != got {
        return Err(format!(
            "{label} length mismatch: expected {expected} elements, got {got}"
        ));
    }
    Ok(())
}

/// `dst[rows x cols] = alpha * lhs[rows x inner] * rhs[inner x cols] + beta * dst`.
#[allow(clippy::too_many_arguments)]
pub fn gemm(
    rows: usize,
    cols: usize,
    inner: usize,
    alpha: f32,
    lhs: &[f32],
    rhs: &[f32],
    beta: f32,
    dst: &mut [f32],
) -> Result<(), String> {
    expect_len("lhs", rows * inner, lhs.len())?;
    expect_len("rhs", inner * cols, rhs.len())?;
    expect_len("destination", rows * cols, dst.len())?;

    if cols == 0 {
        return Ok(());
    }
    for (row, dst_row) in dst.chunks_exact_mut(cols).enumerate() {
        if beta == 0.0 {
            dst_row.fill(0.0);
        } else if beta != 1.0 {
            for value in dst_row.iter_mut() {
                *value *= beta;
            }
        }
        let lhs_row = &lhs[row * inner..(row + 1) * inner];
        for (k, &a) in lhs_row.iter().enumerate() {
            let scaled = alpha * a;
            let rhs_row = &rhs[k * cols..(k + 1) * cols];
            for (out, &b) in dst_row.iter_mut().zip(rhs_row.iter()) {
                *out += scaled * b;
            }
        }
    }
    Ok(())
}

/// `dst[rows] = alpha * mat[rows x cols] * vec[cols] + beta * dst`.
pub fn gemv(
    rows: usize,
    cols: usize,
    alpha: f32,
    mat: &[f32],
    vec: &[f32],
    beta: f32,
    dst: &mut [f32],
) -> Result<(), String> {
    expect_len("matrix", rows * cols, mat.len())?;
    expect_len("vector", cols, vec.len())?;
    expect_len("destination", rows, dst.len())?;

    for (row, out) in dst.iter_mut().enumerate() {
        let acc = dot_unchecked(&mat[row * cols..(row + 1) * cols], vec);
        *out = if beta == 0.0 {
            alpha * acc
        } else {
            alpha * acc + beta * *out
        };
    }
    Ok(())
}

#[inline]
fn dot_unchecked(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Inner product of two equally sized vectors.
pub fn dot(a: &[f32], b: &[f32]) -> Result<f32, String> {
    expect_len("rhs", a.len(), b.len())?;
    Ok(dot_unchecked(a, b))
}

/// Element-wise `x = exp(x)`.
pub fn exp_inplace(values: &mut [f32]) {
    for value in values.iter_mut() {
        *value = value.exp();
    }
}

/// Element-wise `dst *= rhs`.
pub fn mul_inplace(dst: &mut [f32], rhs: &[f32]) -> Result<(), String> {
    expect_len("rhs", dst.len(), rhs.len())?;
    for (a, b) in dst.iter_mut().zip(rhs.iter()) {
        *a *= b;
    }
    Ok(())
}

/// `x *= alpha`.
pub fn scal(alpha: f32, values: &mut [f32]) {
    for value in values.iter_mut() {
        *value *= alpha;
    }
}

pub fn copy(src: &[f32], dst: &mut [f32]) -> Result<(), String> {
    expect_len("destination", src.len(), dst.len())?;
    dst.copy_from_slice(src);
    Ok(())
}

pub fn set(value: f32, dst: &mut [f32]) {
    dst.fill(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn gemm_outer_product_accumulates_with_beta() {
        // [2 x 1] * [1 x 2] subtracted from an existing [2 x 2] block.
        let column = [1.0, 2.0];
        let ones = [1.0, 1.0];
        let mut dst = [5.0, 6.0, 7.0, 8.0];
        gemm(2, 2, 1, -1.0, &column, &ones, 1.0, &mut dst).unwrap();
        assert_eq!(dst, [4.0, 5.0, 5.0, 6.0]);
    }

    #[test]
    fn gemm_matches_naive_product() {
        let lhs = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let rhs = [0.5, -1.0, 2.0, 0.0, 1.0, 1.5];
        let mut dst = [0.0; 4];
        gemm(2, 2, 3, 1.0, &lhs, &rhs, 0.0, &mut dst).unwrap();
        assert_abs_diff_eq!(dst[0], 1.0 * 0.5 + 2.0 * 2.0 + 3.0 * 1.0);
        assert_abs_diff_eq!(dst[1], -1.0 + 0.0 + 4.5);
        assert_abs_diff_eq!(dst[2], 4.0 * 0.5 + 5.0 * 2.0 + 6.0 * 1.0);
        assert_abs_diff_eq!(dst[3], -4.0 + 0.0 + 9.0);
    }

    #[test]
    fn zero_beta_ignores_stale_destination() {
        let mut dst = [f32::NAN, f32::NAN];
        gemv(2, 2, 1.0, &[1.0, 2.0, 3.0, 4.0], &[1.0, 1.0], 0.0, &mut dst).unwrap();
        assert_eq!(dst, [3.0, 7.0]);

        let mut block = [f32::NAN; 2];
        gemm(1, 2, 1, 2.0, &[1.5], &[1.0, -1.0], 0.0, &mut block).unwrap();
        assert_eq!(block, [3.0, -3.0]);
    }

    #[test]
    fn length_mismatch_leaves_destination_untouched() {
        let mut dst = [9.0; 3];
        let err = gemm(2, 2, 1, 1.0, &[1.0, 1.0], &[1.0, 1.0], 0.0, &mut dst).unwrap_err();
        assert!(err.contains("destination"));
        assert_eq!(dst, [9.0; 3]);
        assert!(dot(&[1.0], &[1.0, 2.0]).is_err());
        assert!(mul_inplace(&mut [1.0], &[]).is_err());
    }

    #[test]
    fn elementwise_helpers() {
        let mut values = [0.0, 1.0];
        exp_inplace(&mut values);
        assert_abs_diff_eq!(values[1], std::f32::consts::E, epsilon = 1e-6);
        scal(2.0, &mut values);
        assert_abs_diff_eq!(values[0], 2.0);
        mul_inplace(&mut values, &[0.5, 0.0]).unwrap();
        assert_eq!(values, [1.0, 0.0]);
        let mut dst = [0.0; 2];
        copy(&[3.0, 4.0], &mut dst).unwrap();
        assert_eq!(dot(&dst, &[1.0, 1.0]).unwrap(), 7.0);
        set(1.0, &mut dst);
        assert_eq!(dst, [1.0, 1.0]);
    }
}
