//! Unscented Kalman Filter (UKF)
//!
//! Sigma-point filter generic over a [`SystemModel`]. Scaling follows the
//! scaled unscented transform:
//!
//! λ = α²(n + κ) - n
//! W0m = λ / (n + λ)
//! W0c = W0m + 1 - α² + β
//! Wi  = 1 / (2(n + λ))        i = 1..2n
//!
//! Sigma points are `x`, `x + Sᵢ`, `x - Sᵢ` with `S = chol((n + λ) P)`.
//! A failed factorization means the filter has diverged; by default it is
//! reported to the caller and the estimate is left untouched.

use log::{debug, trace, warn};
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};

use super::models::SystemModel;
use crate::error::EstimationError;
use crate::math::wrap_angles;

/// Sigma-point scaling parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UkfParams {
    /// Spread of the sigma points around the mean (1e-3 to 1)
    pub alpha: f64,
    /// Prior knowledge of the distribution (2 is optimal for Gaussians)
    pub beta: f64,
    /// Secondary scaling (0 or 3 - n)
    pub kappa: f64,
}

impl Default for UkfParams {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 2.0,
            kappa: 0.0,
        }
    }
}

/// Sigma-point weights derived once from [`UkfParams`] and the state dimension
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SigmaWeights {
    pub lambda: f64,
    /// Weight of the central point in the mean
    pub mean0: f64,
    /// Weight of the central point in the covariance
    pub cov0: f64,
    /// Weight of every other point
    pub other: f64,
}

impl SigmaWeights {
    pub fn new(n: usize, params: &UkfParams) -> Result<Self, EstimationError> {
        let n = n as f64;
        let lambda = params.alpha.powi(2) * (n + params.kappa) - n;
        let scale = n + lambda;
        if !(scale.is_finite() && scale > 0.0) {
            return Err(EstimationError::InvalidScaling(scale));
        }

        let mean0 = lambda / scale;
        Ok(Self {
            lambda,
            mean0,
            cov0: mean0 + 1.0 - params.alpha.powi(2) + params.beta,
            other: 0.5 / scale,
        })
    }

    /// `n + λ`
    pub fn scale(&self, n: usize) -> f64 {
        n as f64 + self.lambda
    }
}

/// Covariance correction used in the update step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CovarianceUpdate {
    /// P - K Pz Kᵀ
    #[default]
    Simple,
    /// (I - KH) P (I - KH)ᵀ + K R Kᵀ with the statistically linearized H = Cxzᵀ P⁻¹
    Joseph,
}

/// Behaviour when the covariance cannot be factorized
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum CholeskyRecovery {
    /// Report divergence to the caller
    #[default]
    Fail,
    /// Symmetrize and add a growing diagonal jitter (x10 per attempt)
    Jitter { initial: f64, max_attempts: u32 },
}

/// Filter options
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UkfOptions {
    pub covariance_update: CovarianceUpdate,
    pub cholesky_recovery: CholeskyRecovery,
}

/// Generate the `2n + 1` sigma points of `(mean, covariance)`
///
/// Ordered as the mean, then `mean + Sᵢ` for every column, then `mean - Sᵢ`.
pub fn sigma_points(
    mean: &DVector<f64>,
    covariance: &DMatrix<f64>,
    lambda: f64,
) -> Result<Vec<DVector<f64>>, EstimationError> {
    let scale = mean.len() as f64 + lambda;
    let factor = scaled_cholesky(covariance, scale, CholeskyRecovery::Fail)?;
    Ok(points_from_factor(mean, &factor.l()))
}

fn scaled_cholesky(
    covariance: &DMatrix<f64>,
    scale: f64,
    recovery: CholeskyRecovery,
) -> Result<Cholesky<f64, Dyn>, EstimationError> {
    if let Some(factor) = Cholesky::new(covariance * scale) {
        return Ok(factor);
    }

    if let CholeskyRecovery::Jitter { initial, max_attempts } = recovery {
        let n = covariance.nrows();
        let symmetric = (covariance + covariance.transpose()) * 0.5;
        let mut jitter = initial;
        for attempt in 1..=max_attempts {
            let regularized = &symmetric + DMatrix::identity(n, n) * jitter;
            if let Some(factor) = Cholesky::new(regularized * scale) {
                debug!("factorization recovered with jitter {jitter:e} ({attempt} tries)");
                return Ok(factor);
            }
            jitter *= 10.0;
        }
    }

    warn!("covariance is not positive definite, filter diverged");
    Err(EstimationError::NotPositiveDefinite("sigma point generation"))
}

fn points_from_factor(mean: &DVector<f64>, l: &DMatrix<f64>) -> Vec<DVector<f64>> {
    let n = mean.len();
    let mut points = Vec::with_capacity(2 * n + 1);
    points.push(mean.clone());
    points.extend((0..n).map(|i| mean + l.column(i)));
    points.extend((0..n).map(|i| mean - l.column(i)));
    points
}

fn check_square(what: &'static str, m: &DMatrix<f64>, n: usize) -> Result<(), EstimationError> {
    if m.nrows() != n {
        return Err(EstimationError::DimensionMismatch {
            what,
            expected: n,
            got: m.nrows(),
        });
    }
    if m.ncols() != n {
        return Err(EstimationError::DimensionMismatch {
            what,
            expected: n,
            got: m.ncols(),
        });
    }
    Ok(())
}

fn check_len(what: &'static str, v: &DVector<f64>, n: usize) -> Result<(), EstimationError> {
    if v.len() != n {
        return Err(EstimationError::DimensionMismatch {
            what,
            expected: n,
            got: v.len(),
        });
    }
    Ok(())
}

/// Generic Unscented Kalman Filter
#[derive(Debug, Clone)]
pub struct UnscentedKalmanFilter<M: SystemModel> {
    model: M,
    mean: DVector<f64>,
    covariance: DMatrix<f64>,
    /// Process noise density, scaled by dt in predict
    process_noise: DMatrix<f64>,
    measurement_noise: DMatrix<f64>,
    params: UkfParams,
    weights: SigmaWeights,
    options: UkfOptions,
}

impl<M: SystemModel> UnscentedKalmanFilter<M> {
    /// Create a filter
    ///
    /// # Arguments
    /// * `model` - Process and measurement model
    /// * `mean` - Initial state estimate
    /// * `covariance` - Initial covariance, must be positive definite
    /// * `process_noise` - Q (n x n)
    /// * `measurement_noise` - R (m x m)
    /// * `params` - Sigma-point scaling
    pub fn new(
        model: M,
        mean: DVector<f64>,
        covariance: DMatrix<f64>,
        process_noise: DMatrix<f64>,
        measurement_noise: DMatrix<f64>,
        params: UkfParams,
    ) -> Result<Self, EstimationError> {
        let n = model.state_dim();
        let m = model.measurement_dim();

        check_len("initial mean", &mean, n)?;
        check_square("initial covariance", &covariance, n)?;
        check_square("process noise", &process_noise, n)?;
        check_square("measurement noise", &measurement_noise, m)?;

        if Cholesky::new(covariance.clone()).is_none() {
            return Err(EstimationError::NotPositiveDefinite("initial covariance"));
        }

        let weights = SigmaWeights::new(n, &params)?;
        debug!(
            "UKF initialized: n = {n}, m = {m}, lambda = {:.3e}, W0m = {:.3e}, W0c = {:.3e}, \
             Wi = {:.3e}",
            weights.lambda, weights.mean0, weights.cov0, weights.other
        );

        let mut filter = Self {
            model,
            mean,
            covariance,
            process_noise,
            measurement_noise,
            params,
            weights,
            options: UkfOptions::default(),
        };
        filter.wrap_state_angles();
        Ok(filter)
    }

    /// Replace the filter options
    pub fn with_options(mut self, options: UkfOptions) -> Self {
        self.options = options;
        self
    }

    /// Propagate the estimate through the process model
    ///
    /// On error the estimate is left unchanged.
    pub fn predict(&mut self, dt: f64, control: &DVector<f64>) -> Result<(), EstimationError> {
        check_len("control", control, self.model.control_dim())?;

        let points = self.sigma_points()?;
        let propagated: Vec<DVector<f64>> = points
            .iter()
            .map(|p| self.model.propagate(p, dt, control))
            .collect();

        let mean = self.weighted_mean(&propagated);
        let angles = self.model.angle_indices();

        let mut covariance = &self.process_noise * dt;
        for (i, p) in propagated.iter().enumerate() {
            let mut d = p - &mean;
            wrap_angles(d.as_mut_slice(), angles);
            covariance += (&d * d.transpose()) * self.covariance_weight(i);
        }

        self.commit(mean, covariance)?;
        trace!("UKF predict dt = {dt}, trace(P) = {:.6e}", self.covariance.trace());
        Ok(())
    }

    /// Correct the estimate with a measurement
    ///
    /// Returns the innovation `z - ẑ`. On error the estimate is left unchanged.
    pub fn update(&mut self, measurement: &DVector<f64>) -> Result<DVector<f64>, EstimationError> {
        let n = self.state_dim();
        check_len("measurement", measurement, self.model.measurement_dim())?;

        let factor = self.factorize()?;
        let points = points_from_factor(&self.mean, &factor.l());
        let predicted: Vec<DVector<f64>> = points.iter().map(|p| self.model.measure(p)).collect();

        let z_mean = self.weighted_mean(&predicted);
        let state_angles = self.model.angle_indices();
        let meas_angles = self.model.measurement_angle_indices();

        let m = z_mean.len();
        let mut pz = self.measurement_noise.clone();
        let mut cxz = DMatrix::zeros(n, m);
        for (i, (x, z)) in points.iter().zip(&predicted).enumerate() {
            let w = self.covariance_weight(i);

            let mut dz = z - &z_mean;
            wrap_angles(dz.as_mut_slice(), meas_angles);
            // Cross-covariance relative to the pre-update mean
            let mut dx = x - &self.mean;
            wrap_angles(dx.as_mut_slice(), state_angles);

            pz += (&dz * dz.transpose()) * w;
            cxz += (&dx * dz.transpose()) * w;
        }

        let pz_inv = pz
            .clone()
            .try_inverse()
            .ok_or(EstimationError::SingularInnovation)?;
        let k = &cxz * pz_inv;

        let mut innovation = measurement - &z_mean;
        wrap_angles(innovation.as_mut_slice(), meas_angles);

        let mean = &self.mean + &k * &innovation;
        let covariance = match self.options.covariance_update {
            CovarianceUpdate::Simple => &self.covariance - &k * &pz * k.transpose(),
            CovarianceUpdate::Joseph => {
                // H = Cxzᵀ P⁻¹, using chol((n + λ) P) from sigma generation
                let h = (factor.solve(&cxz) * self.weights.scale(n)).transpose();
                let i_kh = DMatrix::identity(n, n) - &k * h;
                &i_kh * &self.covariance * i_kh.transpose()
                    + &k * &self.measurement_noise * k.transpose()
            }
        };

        self.commit(mean, covariance)?;
        trace!("UKF update |innovation| = {:.6e}", innovation.norm());
        Ok(innovation)
    }

    /// Replace the estimate, e.g. after divergence
    pub fn reset(
        &mut self,
        mean: DVector<f64>,
        covariance: DMatrix<f64>,
    ) -> Result<(), EstimationError> {
        let n = self.state_dim();
        check_len("mean", &mean, n)?;
        check_square("covariance", &covariance, n)?;
        if Cholesky::new(covariance.clone()).is_none() {
            return Err(EstimationError::NotPositiveDefinite("reset covariance"));
        }

        debug!("UKF reset");
        self.mean = mean;
        self.covariance = covariance;
        self.wrap_state_angles();
        Ok(())
    }

    /// Scale the covariance by `factor` (> 1 inflates)
    pub fn inflate_covariance(&mut self, factor: f64) {
        debug!("UKF covariance inflated by {factor}");
        self.covariance *= factor;
    }

    /// Sigma points of the current estimate
    pub fn sigma_points(&self) -> Result<Vec<DVector<f64>>, EstimationError> {
        let factor = self.factorize()?;
        Ok(points_from_factor(&self.mean, &factor.l()))
    }

    pub fn mean(&self) -> &DVector<f64> {
        &self.mean
    }

    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    pub fn process_noise(&self) -> &DMatrix<f64> {
        &self.process_noise
    }

    pub fn measurement_noise(&self) -> &DMatrix<f64> {
        &self.measurement_noise
    }

    pub fn weights(&self) -> &SigmaWeights {
        &self.weights
    }

    pub fn params(&self) -> &UkfParams {
        &self.params
    }

    pub fn options(&self) -> &UkfOptions {
        &self.options
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn state_dim(&self) -> usize {
        self.mean.len()
    }

    fn factorize(&self) -> Result<Cholesky<f64, Dyn>, EstimationError> {
        scaled_cholesky(
            &self.covariance,
            self.weights.scale(self.state_dim()),
            self.options.cholesky_recovery,
        )
    }

    fn weighted_mean(&self, points: &[DVector<f64>]) -> DVector<f64> {
        let mut mean = &points[0] * self.weights.mean0;
        for p in &points[1..] {
            mean += p * self.weights.other;
        }
        mean
    }

    fn covariance_weight(&self, index: usize) -> f64 {
        if index == 0 {
            self.weights.cov0
        } else {
            self.weights.other
        }
    }

    fn commit(
        &mut self,
        mean: DVector<f64>,
        covariance: DMatrix<f64>,
    ) -> Result<(), EstimationError> {
        if mean.iter().any(|x| !x.is_finite()) {
            warn!("UKF mean became non-finite");
            return Err(EstimationError::NonFinite("mean"));
        }
        if covariance.iter().any(|x| !x.is_finite()) {
            warn!("UKF covariance became non-finite");
            return Err(EstimationError::NonFinite("covariance"));
        }

        self.mean = mean;
        self.covariance = (&covariance + covariance.transpose()) * 0.5;
        self.wrap_state_angles();
        Ok(())
    }

    fn wrap_state_angles(&mut self) {
        let indices = self.model.angle_indices();
        wrap_angles(self.mean.as_mut_slice(), indices);
    }
}
