//! Linear gap filling for numeric series

use crate::error::{Result, StockPullError};

/// Fill missing values of `y` by linear interpolation over `x`.
///
/// `x` must be strictly increasing and have the same length as `y`.
/// Values before the first or after the last observation cannot be
/// interpolated and stay `None`.
pub fn interpolate_missing(x: &[f64], y: &[Option<f64>]) -> Result<Vec<Option<f64>>> {
    if x.len() != y.len() {
        return Err(StockPullError::Interpolation(format!(
            "length mismatch: {} x values, {} y values",
            x.len(),
            y.len()
        )));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(StockPullError::Interpolation(
            "independent variable must be numeric and complete".to_string(),
        ));
    }
    if x.windows(2).any(|w| w[1] <= w[0]) {
        return Err(StockPullError::Interpolation(
            "independent variable must be strictly increasing".to_string(),
        ));
    }

    let known: Vec<usize> = y
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.filter(|v| v.is_finite()).map(|_| i))
        .collect();

    let mut filled: Vec<Option<f64>> = y.iter().map(|v| v.filter(|v| v.is_finite())).collect();

    for pair in known.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        if hi - lo < 2 {
            continue;
        }
        let (x0, x1) = (x[lo], x[hi]);
        let (y0, y1) = (y[lo].unwrap_or_default(), y[hi].unwrap_or_default());
        let slope = (y1 - y0) / (x1 - x0);
        for i in lo + 1..hi {
            filled[i] = Some(y0 + slope * (x[i] - x0));
        }
    }

    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fills_interior_gaps() {
        let x = [0.0, 1.0, 2.0, 4.0];
        let y = [Some(1.0), None, None, Some(5.0)];
        let filled = interpolate_missing(&x, &y).unwrap();
        assert_eq!(filled, vec![Some(1.0), Some(2.0), Some(3.0), Some(5.0)]);
    }

    #[test]
    fn test_edges_stay_missing() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [None, Some(2.0), Some(4.0), None];
        let filled = interpolate_missing(&x, &y).unwrap();
        assert_eq!(filled, vec![None, Some(2.0), Some(4.0), None]);
    }

    #[test]
    fn test_rejects_bad_x() {
        assert!(interpolate_missing(&[0.0, f64::NAN], &[Some(1.0), Some(2.0)]).is_err());
        assert!(interpolate_missing(&[1.0, 1.0], &[Some(1.0), Some(2.0)]).is_err());
        assert!(interpolate_missing(&[1.0], &[Some(1.0), Some(2.0)]).is_err());
    }

    proptest! {
        #[test]
        fn prop_observed_values_untouched_and_gaps_bounded(
            values in proptest::collection::vec(proptest::option::of(-100.0f64..100.0), 2..40)
        ) {
            let x: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
            let filled = interpolate_missing(&x, &values).unwrap();

            let known: Vec<f64> = values.iter().flatten().copied().collect();
            for (orig, out) in values.iter().zip(&filled) {
                if let Some(v) = orig {
                    prop_assert_eq!(Some(*v), *out);
                } else if let Some(v) = out {
                    let lo = known.iter().cloned().fold(f64::INFINITY, f64::min);
                    let hi = known.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                    prop_assert!(*v >= lo - 1e-9 && *v <= hi + 1e-9);
                }
            }
        }
    }
}
