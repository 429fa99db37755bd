//! Feature scaling
//!
//! A fitted scaler travels inside the model bundle and is applied at serving
//! time, so the per-column parameters are name-keyed: the row path scales a
//! single value by feature name, the vectorized path scales whole columns.

use crate::error::{FastbreakError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Type of scaler to use
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ScalerType {
    /// Z-score normalization: (x - mean) / std
    Standard,
    /// (x - min) / (max - min)
    MinMax,
    /// Median / IQR scaling
    Robust,
    /// Pass-through
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScalerParams {
    center: f64, // mean, min, or median
    scale: f64,  // std, range, or IQR
}

/// Per-column fitted scaler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scaler {
    scaler_type: ScalerType,
    params: HashMap<String, ScalerParams>,
    is_fitted: bool,
}

impl Scaler {
    pub fn new(scaler_type: ScalerType) -> Self {
        Self {
            scaler_type,
            params: HashMap::new(),
            is_fitted: false,
        }
    }

    pub fn scaler_type(&self) -> ScalerType {
        self.scaler_type
    }

    /// Fit per-column parameters on training data
    pub fn fit(&mut self, df: &DataFrame, columns: &[&str]) -> Result<&mut Self> {
        for col_name in columns {
            let column = df
                .column(col_name)
                .map_err(|_| FastbreakError::FeatureNotFound(col_name.to_string()))?;
            let series = column.as_materialized_series();
            let params = self.compute_params(series)?;
            self.params.insert(col_name.to_string(), params);
        }
        self.is_fitted = true;
        Ok(self)
    }

    /// Scale one value by feature name. Columns the scaler was not fitted on
    /// pass through unchanged (same behavior as the frame path).
    pub fn transform_value(&self, name: &str, value: f64) -> f64 {
        match self.params.get(name) {
            Some(p) => (value - p.center) / p.scale,
            None => value,
        }
    }

    /// Scale every fitted column present in the frame
    pub fn transform_frame(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(FastbreakError::ModelNotFitted);
        }

        let replacements: Vec<Series> = self
            .params
            .iter()
            .filter_map(|(col_name, params)| {
                df.column(col_name).ok().map(|column| {
                    let series = column.as_materialized_series();
                    self.scale_series(series, params)
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut result = df.clone();
        for scaled in replacements {
            result = result
                .with_column(scaled)
                .map_err(|e| FastbreakError::DataError(e.to_string()))?
                .clone();
        }
        Ok(result)
    }

    pub fn fit_transform(&mut self, df: &DataFrame, columns: &[&str]) -> Result<DataFrame> {
        self.fit(df, columns)?;
        self.transform_frame(df)
    }

    fn compute_params(&self, series: &Series) -> Result<ScalerParams> {
        let ca = series
            .f64()
            .map_err(|e| FastbreakError::DataError(e.to_string()))?;

        match self.scaler_type {
            ScalerType::Standard => {
                let mean = ca.mean().unwrap_or(0.0);
                let std = ca.std(1).unwrap_or(1.0);
                Ok(ScalerParams {
                    center: mean,
                    scale: if std == 0.0 { 1.0 } else { std },
                })
            }
            ScalerType::MinMax => {
                let min = ca.min().unwrap_or(0.0);
                let max = ca.max().unwrap_or(1.0);
                let range = max - min;
                Ok(ScalerParams {
                    center: min,
                    scale: if range == 0.0 { 1.0 } else { range },
                })
            }
            ScalerType::Robust => {
                let median = ca.median().unwrap_or(0.0);
                let q1 = ca
                    .quantile(0.25, QuantileMethod::Linear)
                    .unwrap_or(Some(0.0))
                    .unwrap_or(0.0);
                let q3 = ca
                    .quantile(0.75, QuantileMethod::Linear)
                    .unwrap_or(Some(1.0))
                    .unwrap_or(1.0);
                let iqr = q3 - q1;
                Ok(ScalerParams {
                    center: median,
                    scale: if iqr == 0.0 { 1.0 } else { iqr },
                })
            }
            ScalerType::None => Ok(ScalerParams {
                center: 0.0,
                scale: 1.0,
            }),
        }
    }

    fn scale_series(&self, series: &Series, params: &ScalerParams) -> Result<Series> {
        let ca = series
            .f64()
            .map_err(|e| FastbreakError::DataError(e.to_string()))?;

        let scaled: Float64Chunked = ca
            .into_iter()
            .map(|opt| opt.map(|v| (v - params.center) / params.scale))
            .collect();

        Ok(scaled.with_name(series.name().clone()).into_series())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_column_frame() -> DataFrame {
        DataFrame::new(vec![
            Series::new("minutes".into(), &[10.0, 20.0, 30.0, 40.0, 50.0]).into(),
        ])
        .unwrap()
    }

    #[test]
    fn test_standard_scaler_centers() {
        let df = one_column_frame();
        let mut scaler = Scaler::new(ScalerType::Standard);
        let result = scaler.fit_transform(&df, &["minutes"]).unwrap();

        let col = result.column("minutes").unwrap().f64().unwrap();
        assert!(col.mean().unwrap().abs() < 1e-10);
    }

    #[test]
    fn test_minmax_scaler_range() {
        let df = one_column_frame();
        let mut scaler = Scaler::new(ScalerType::MinMax);
        let result = scaler.fit_transform(&df, &["minutes"]).unwrap();

        let col = result.column("minutes").unwrap().f64().unwrap();
        assert!((col.min().unwrap() - 0.0).abs() < 1e-10);
        assert!((col.max().unwrap() - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_value_and_frame_paths_agree() {
        let df = one_column_frame();
        let mut scaler = Scaler::new(ScalerType::Standard);
        scaler.fit(&df, &["minutes"]).unwrap();

        let frame = scaler.transform_frame(&df).unwrap();
        let col = frame.column("minutes").unwrap().f64().unwrap();

        for (raw, scaled) in [10.0, 20.0, 30.0, 40.0, 50.0].iter().zip(col.into_no_null_iter()) {
            assert!((scaler.transform_value("minutes", *raw) - scaled).abs() < 1e-12);
        }
    }

    #[test]
    fn test_unfitted_column_passes_through() {
        let df = one_column_frame();
        let mut scaler = Scaler::new(ScalerType::Standard);
        scaler.fit(&df, &["minutes"]).unwrap();
        assert_eq!(scaler.transform_value("unknown_column", 7.0), 7.0);
    }
}
