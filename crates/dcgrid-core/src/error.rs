//! Unified error type for the dcgrid crates
//!
//! [`DcGridError`] covers every hard failure of a planning run. Soft problems
//! (iteration caps, catalogue exhaustion, clamped inputs) are not errors; they
//! go to [`crate::Diagnostics`].
//!
//! # Example
//!
//! ```ignore
//! use dcgrid_core::{DcGridError, DcGridResult};
//!
//! fn run(path: &str) -> DcGridResult<()> {
//!     let network = load_network(path)?;
//!     orchestrate(&network)?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DcGridError {
    /// I/O errors (file access)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Ambiguous or inconsistent run configuration (e.g. no unique root subnetwork)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network structure errors (dangling references, unknown ids)
    #[error("Topology error: {0}")]
    Topology(String),

    /// Catalogue lookup or processing errors
    #[error("Catalogue error: {0}")]
    Catalogue(String),

    /// The subnetwork power-flow solver failed to converge
    #[error("Power flow did not converge ({context}) after {iterations} iterations, max mismatch {mismatch:.3e}")]
    NonConvergence {
        context: String,
        iterations: usize,
        mismatch: f64,
    },

    #[error("{0}")]
    Other(String),
}

impl DcGridError {
    pub fn non_convergence(context: impl Into<String>, iterations: usize, mismatch: f64) -> Self {
        DcGridError::NonConvergence {
            context: context.into(),
            iterations,
            mismatch,
        }
    }

    /// True for solver failures; the sizing engine treats these as infeasible trials.
    pub fn is_non_convergence(&self) -> bool {
        matches!(self, DcGridError::NonConvergence { .. })
    }
}

pub type DcGridResult<T> = Result<T, DcGridError>;

impl From<anyhow::Error> for DcGridError {
    fn from(err: anyhow::Error) -> Self {
        DcGridError::Other(err.to_string())
    }
}

impl From<String> for DcGridError {
    fn from(s: String) -> Self {
        DcGridError::Other(s)
    }
}

impl From<&str> for DcGridError {
    fn from(s: &str) -> Self {
        DcGridError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for DcGridError {
    fn from(err: serde_json::Error) -> Self {
        DcGridError::Parse(err.to_string())
    }
}

impl From<serde_yaml::Error> for DcGridError {
    fn from(err: serde_yaml::Error) -> Self {
        DcGridError::Parse(err.to_string())
    }
}

impl From<csv::Error> for DcGridError {
    fn from(err: csv::Error) -> Self {
        DcGridError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DcGridError::non_convergence("subnetwork 2", 30, 1.5e-3);
        let text = err.to_string();
        assert!(text.contains("did not converge"));
        assert!(text.contains("subnetwork 2"));
        assert!(text.contains("30 iterations"));
    }

    #[test]
    fn test_non_convergence_predicate() {
        assert!(DcGridError::non_convergence("x", 1, 0.0).is_non_convergence());
        assert!(!DcGridError::Config("two roots".into()).is_non_convergence());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: DcGridError = io_err.into();
        assert!(matches!(err, DcGridError::Io(_)));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> DcGridResult<()> {
            Err(DcGridError::Validation("test".into()))
        }

        fn outer() -> DcGridResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
