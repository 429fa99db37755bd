//! Linear models: OLS/ridge regression and logistic regression

use crate::error::{FastbreakError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Solve the symmetric positive-definite system Ax = b via Cholesky
/// decomposition. Adds a small ridge term and retries once if the matrix is
/// not positive definite.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    match cholesky_solve_once(a, b) {
        Some(x) => Some(x),
        None => {
            let n = a.nrows();
            let ridge = 1e-8 * a.diag().iter().map(|v| v.abs()).sum::<f64>() / n.max(1) as f64;
            let mut a_reg = a.clone();
            for k in 0..n {
                a_reg[[k, k]] += ridge.max(1e-10);
            }
            cholesky_solve_once(&a_reg, b)
        }
    }
}

fn cholesky_solve_once(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }

    // A = L * L^T
    let mut l = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // Forward: L y = b
    let mut y = Array1::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // Backward: L^T x = y
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    Some(x)
}

/// Ordinary least squares with optional ridge regularization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: f64,
    pub alpha: f64,
    pub fit_intercept: bool,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearRegression {
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: 0.0,
            alpha: 0.0,
            fit_intercept: true,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Fit via the normal equations: (X^T X + αI) w = X^T y
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(FastbreakError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(FastbreakError::ValidationError(
                "cannot fit on zero samples".to_string(),
            ));
        }

        // Center data so the intercept falls out of the solve
        let (x_centered, y_centered, x_means, y_mean) = if self.fit_intercept {
            let x_means: Array1<f64> = (0..n_features)
                .map(|j| x.column(j).sum() / n_samples as f64)
                .collect();
            let y_mean = y.sum() / n_samples as f64;
            let mut xc = x.clone();
            for j in 0..n_features {
                for i in 0..n_samples {
                    xc[[i, j]] -= x_means[j];
                }
            }
            let yc = y.mapv(|v| v - y_mean);
            (xc, yc, x_means, y_mean)
        } else {
            (x.clone(), y.clone(), Array1::zeros(n_features), 0.0)
        };

        let mut gram = x_centered.t().dot(&x_centered);
        if self.alpha > 0.0 {
            for k in 0..n_features {
                gram[[k, k]] += self.alpha;
            }
        }
        let xty = x_centered.t().dot(&y_centered);

        let coefficients = cholesky_solve(&gram, &xty).ok_or_else(|| {
            FastbreakError::TrainingError("normal equations are singular".to_string())
        })?;

        self.intercept = if self.fit_intercept {
            y_mean - coefficients.dot(&x_means)
        } else {
            0.0
        };
        self.coefficients = Some(coefficients);
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self
            .coefficients
            .as_ref()
            .ok_or(FastbreakError::ModelNotFitted)?;

        if x.ncols() != coefficients.len() {
            return Err(FastbreakError::ShapeError {
                expected: format!("{} features", coefficients.len()),
                actual: format!("{} features", x.ncols()),
            });
        }

        Ok(x.dot(coefficients) + self.intercept)
    }
}

/// Binary logistic regression trained with gradient descent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: f64,
    pub alpha: f64,
    pub learning_rate: f64,
    pub max_iter: usize,
    pub tol: f64,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: 0.0,
            alpha: 0.0,
            learning_rate: 0.1,
            max_iter: 1000,
            tol: 1e-6,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Fit on 0/1 labels
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(FastbreakError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(FastbreakError::ValidationError(
                "cannot fit on zero samples".to_string(),
            ));
        }

        let mut weights: Array1<f64> = Array1::zeros(n_features);
        let mut intercept = 0.0;
        let n = n_samples as f64;

        for _ in 0..self.max_iter {
            let logits = x.dot(&weights) + intercept;
            let probs = logits.mapv(sigmoid);
            let errors = &probs - y;

            let mut grad_w = x.t().dot(&errors) / n;
            if self.alpha > 0.0 {
                grad_w = grad_w + &weights * (self.alpha / n);
            }
            let grad_b = errors.sum() / n;

            weights = weights - &grad_w * self.learning_rate;
            intercept -= grad_b * self.learning_rate;

            let grad_norm = grad_w.mapv(|g| g * g).sum().sqrt();
            if grad_norm < self.tol {
                break;
            }
        }

        self.coefficients = Some(weights);
        self.intercept = intercept;
        Ok(self)
    }

    /// Positive-class probability per row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self
            .coefficients
            .as_ref()
            .ok_or(FastbreakError::ModelNotFitted)?;

        if x.ncols() != coefficients.len() {
            return Err(FastbreakError::ShapeError {
                expected: format!("{} features", coefficients.len()),
                actual: format!("{} features", x.ncols()),
            });
        }

        Ok((x.dot(coefficients) + self.intercept).mapv(sigmoid))
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}
