//! Crate error taxonomy
//!
//! Every layer reports its own error enum; [`QuadsimError`] gathers them for
//! callers that drive the whole stack. Nothing in the core retries or
//! recovers on its own: errors are detected, reported and left to the driver.

use thiserror::Error;

/// Rigid-body construction and integration errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DynamicsError {
    #[error("Mass must be finite and positive, got {0}")]
    InvalidMass(f64),
    #[error("Inertia matrix is singular or not positive definite")]
    SingularInertia,
    #[error("Inertia matrix is not symmetric (max asymmetry {0:e})")]
    AsymmetricInertia(f64),
    #[error("Non-finite value in rigid-body {0}")]
    NonFinite(&'static str),
    #[error(
        "Attitude drifted off the rotation group: error {error:e} exceeds tolerance {tolerance:e}"
    )]
    AttitudeDrift { error: f64, tolerance: f64 },
}

/// Filter construction and runtime errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EstimationError {
    #[error("Invalid {what} dimension: expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("Covariance is not positive definite ({0})")]
    NotPositiveDefinite(&'static str),
    #[error("Innovation covariance is singular")]
    SingularInnovation,
    #[error("Non-finite value in filter {0}")]
    NonFinite(&'static str),
    #[error("Invalid sigma-point parameters: n + lambda = {0} must be positive")]
    InvalidScaling(f64),
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Crate-wide error
#[derive(Debug, Error)]
pub enum QuadsimError {
    #[error(transparent)]
    Dynamics(#[from] DynamicsError),
    #[error(transparent)]
    Estimation(#[from] EstimationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DynamicsError {
    /// True for errors raised while validating construction parameters
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DynamicsError::InvalidMass(_)
                | DynamicsError::SingularInertia
                | DynamicsError::AsymmetricInertia(_)
        )
    }
}

impl EstimationError {
    /// True for errors that indicate the filter has diverged at runtime
    pub fn is_divergence(&self) -> bool {
        matches!(
            self,
            EstimationError::NotPositiveDefinite(_)
                | EstimationError::SingularInnovation
                | EstimationError::NonFinite(_)
        )
    }
}
