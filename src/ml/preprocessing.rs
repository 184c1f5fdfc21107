use crate::error::{AppError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use ndarray_stats::interpolate::{Linear, Midpoint};
use ndarray_stats::QuantileExt;
use noisy_float::types::n64;
use serde::{Deserialize, Serialize};

/// Quantile of the non-NaN values with linear interpolation; NaN when every
/// value is missing
pub fn nan_quantile(values: ArrayView1<f64>, q: f64) -> f64 {
    let mut data = values.to_owned();
    data.quantile_axis_skipnan_mut(Axis(0), n64(q), &Linear)
        .map(|result| result.into_scalar())
        .unwrap_or(f64::NAN)
}

/// Median of the non-NaN values, averaging the two middle values
fn nan_median(values: ArrayView1<f64>) -> f64 {
    let mut data = values.to_owned();
    data.quantile_axis_skipnan_mut(Axis(0), n64(0.5), &Midpoint)
        .map(|result| result.into_scalar())
        .unwrap_or(f64::NAN)
}

fn check_width(expected: usize, x: &Array2<f64>, stage: &str) -> Result<()> {
    if x.ncols() != expected {
        return Err(AppError::SchemaMismatch(format!(
            "{} expects {} features, got {}",
            stage,
            expected,
            x.ncols()
        )));
    }
    Ok(())
}

/// Replaces missing values with per-column training medians
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MedianImputer {
    statistics: Vec<f64>,
    fitted: bool,
}

impl MedianImputer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit(&mut self, x: &Array2<f64>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(AppError::Data("Cannot fit imputer on zero rows".to_string()));
        }

        self.statistics = x
            .axis_iter(Axis(1))
            .map(|column| {
                let median = nan_median(column);
                if median.is_nan() {
                    0.0
                } else {
                    median
                }
            })
            .collect();
        self.fitted = true;

        Ok(())
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.fitted {
            return Err(AppError::NotFitted(
                "MedianImputer must be fitted before transform".to_string(),
            ));
        }
        check_width(self.statistics.len(), x, "Imputer")?;

        let mut out = x.clone();
        for (mut column, &fill) in out.axis_iter_mut(Axis(1)).zip(&self.statistics) {
            column.mapv_inplace(|v| if v.is_nan() { fill } else { v });
        }
        Ok(out)
    }

    pub fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    /// Fill value per column
    pub fn statistics(&self) -> &[f64] {
        &self.statistics
    }
}

/// Centers and scales each column with population mean and standard deviation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
    fitted: bool,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit(&mut self, x: &Array2<f64>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(AppError::Data("Cannot fit scaler on zero rows".to_string()));
        }

        let mean: Array1<f64> = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
        let std = x.std_axis(Axis(0), 0.0);

        self.mean = mean.to_vec();
        self.scale = std
            .iter()
            .map(|&s| if s == 0.0 || !s.is_finite() { 1.0 } else { s })
            .collect();
        self.fitted = true;

        Ok(())
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.fitted {
            return Err(AppError::NotFitted(
                "StandardScaler must be fitted before transform".to_string(),
            ));
        }
        check_width(self.mean.len(), x, "Scaler")?;

        let mut out = x.clone();
        for ((mut column, &mean), &scale) in out
            .axis_iter_mut(Axis(1))
            .zip(&self.mean)
            .zip(&self.scale)
        {
            column.mapv_inplace(|v| (v - mean) / scale);
        }
        Ok(out)
    }

    pub fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    #[test]
    fn test_nan_quantile() {
        let values: Array1<f64> = array![4.0, f64::NAN, 1.0, 3.0, 2.0];
        assert_eq!(nan_quantile(values.view(), 0.25), 1.75);
        assert_eq!(nan_quantile(values.view(), 0.5), 2.5);

        let empty: Array1<f64> = array![f64::NAN, f64::NAN];
        assert!(nan_quantile(empty.view(), 0.5).is_nan());
    }

    #[test]
    fn test_imputer_uses_column_medians() {
        let x = array![[1.0, f64::NAN, f64::NAN], [f64::NAN, 4.0, f64::NAN], [3.0, 6.0, f64::NAN], [4.0, 7.0, f64::NAN]];
        let mut imputer = MedianImputer::new();
        let out = imputer.fit_transform(&x).unwrap();

        assert_eq!(imputer.statistics(), &[3.0, 6.0, 0.0]);
        assert_eq!(out[[1, 0]], 3.0);
        assert_eq!(out[[0, 1]], 6.0);
        assert_eq!(out[[2, 2]], 0.0);
        assert_eq!(out[[3, 0]], 4.0);
    }

    #[test]
    fn test_imputer_rejects_width_mismatch() {
        let mut imputer = MedianImputer::new();
        imputer.fit(&array![[1.0, 2.0]]).unwrap();
        assert!(matches!(
            imputer.transform(&array![[1.0, 2.0, 3.0]]),
            Err(AppError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_transform_before_fit() {
        assert!(MedianImputer::new().transform(&array![[1.0]]).is_err());
        assert!(StandardScaler::new().transform(&array![[1.0]]).is_err());
    }

    #[test]
    fn test_scaler_population_std_and_constant_columns() {
        let x = array![[1.0, 5.0], [3.0, 5.0]];
        let mut scaler = StandardScaler::new();
        let out = scaler.fit_transform(&x).unwrap();

        assert_eq!(out[[0, 0]], -1.0);
        assert_eq!(out[[1, 0]], 1.0);
        assert_eq!(out[[0, 1]], 0.0);
    }
}
