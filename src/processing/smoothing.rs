use super::ProcessingError;

// ---------------------------------------------------------------------------
// Moving average
// ---------------------------------------------------------------------------

/// Centred moving average. Windows are truncated at the edges, so every
/// output sample averages at least one input sample.
///
/// For an even `window` the extra sample is taken on the left, e.g. a
/// window of 4 at index `i` covers `i-2 ..= i+1`.
pub fn moving_average(values: &[f64], window: usize) -> Result<Vec<f64>, ProcessingError> {
    if window == 0 {
        return Err(ProcessingError::InvalidParameter(
            "moving-average window must be at least 1".into(),
        ));
    }
    let n = values.len();
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    for v in values {
        prefix.push(prefix[prefix.len() - 1] + v);
    }

    let after = (window - 1) / 2;
    Ok((0..n)
        .map(|i| {
            let end = (i + 1 + after).min(n);
            let start = (i + 1 + after).saturating_sub(window);
            (prefix[end] - prefix[start]) / (end - start) as f64
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Savitzky–Golay
// ---------------------------------------------------------------------------

/// Savitzky–Golay smoothing with polynomial fitting at the borders.
///
/// Interior samples are the value at the window centre of a least-squares
/// polynomial of degree `order`; the first and last `window / 2` samples are
/// evaluated from the polynomial fitted to the first or last full window.
/// `window` must be odd, larger than `order`, and no longer than the signal.
pub fn savitzky_golay(
    values: &[f64],
    window: usize,
    order: usize,
) -> Result<Vec<f64>, ProcessingError> {
    if window % 2 == 0 {
        return Err(ProcessingError::InvalidParameter(format!(
            "Savitzky-Golay window must be odd, got {window}"
        )));
    }
    if window <= order {
        return Err(ProcessingError::InvalidParameter(format!(
            "Savitzky-Golay window ({window}) must be larger than the polynomial order ({order})"
        )));
    }
    if window > values.len() {
        return Err(ProcessingError::InvalidParameter(format!(
            "Savitzky-Golay window ({window}) exceeds the number of samples ({})",
            values.len()
        )));
    }

    let basis = orthonormal_basis(window, order);
    let half = window / 2;
    let n = values.len();

    // Hat-matrix row for the centre sample: fitted[half] = Σ_k h_k · y_k.
    let centre: Vec<f64> = (0..window).map(|k| hat(&basis, half, k)).collect();

    let mut out = vec![0.0; n];
    for i in half..n - half {
        let segment = &values[i - half..=i + half];
        out[i] = centre.iter().zip(segment).map(|(c, y)| c * y).sum();
    }

    let head = fit_window(&basis, &values[..window]);
    out[..half].copy_from_slice(&head[..half]);
    let tail = fit_window(&basis, &values[n - window..]);
    out[n - half..].copy_from_slice(&tail[window - half..]);

    Ok(out)
}

/// Columns of the Vandermonde matrix on `window` points (centred and scaled
/// to `[-1, 1]`), orthonormalised with twice-applied modified Gram–Schmidt.
/// Returned as `basis[degree][point]`.
fn orthonormal_basis(window: usize, order: usize) -> Vec<Vec<f64>> {
    let half = (window / 2).max(1) as f64;
    let t: Vec<f64> = (0..window)
        .map(|k| (k as f64 - (window / 2) as f64) / half)
        .collect();

    let mut basis: Vec<Vec<f64>> = Vec::with_capacity(order + 1);
    for degree in 0..=order {
        let mut col: Vec<f64> = t.iter().map(|x| x.powi(degree as i32)).collect();
        for _ in 0..2 {
            for q in &basis {
                let proj: f64 = q.iter().zip(&col).map(|(a, b)| a * b).sum();
                for (c, qv) in col.iter_mut().zip(q) {
                    *c -= proj * qv;
                }
            }
        }
        let norm = col.iter().map(|c| c * c).sum::<f64>().sqrt();
        for c in &mut col {
            *c /= norm;
        }
        basis.push(col);
    }
    basis
}

fn hat(basis: &[Vec<f64>], row: usize, col: usize) -> f64 {
    basis.iter().map(|q| q[row] * q[col]).sum()
}

/// Least-squares polynomial fit evaluated on the window's own points.
fn fit_window(basis: &[Vec<f64>], segment: &[f64]) -> Vec<f64> {
    let coeffs: Vec<f64> = basis
        .iter()
        .map(|q| q.iter().zip(segment).map(|(a, y)| a * y).sum())
        .collect();
    (0..segment.len())
        .map(|k| basis.iter().zip(&coeffs).map(|(q, c)| q[k] * c).sum())
        .collect()
}
