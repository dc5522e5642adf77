// ─────────────────────────────────────────────────────────────────────
// SCPN GLE Core — Errors
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Pipeline stage that raised an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Preprocess,
    Correlation,
    Kernel,
    Drift,
    FluctuatingForce,
    Noise,
    Integrator,
    Cache,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Preprocess => "preprocess",
            Stage::Correlation => "correlation",
            Stage::Kernel => "kernel",
            Stage::Drift => "drift",
            Stage::FluctuatingForce => "fluctuating-force",
            Stage::Noise => "noise",
            Stage::Integrator => "integrator",
            Stage::Cache => "cache",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum GleError {
    #[error("[{stage}] shape mismatch: {message}")]
    ShapeMismatch { stage: Stage, message: String },

    #[error("[{stage}] numerical instability: {message}")]
    NumericalInstability { stage: Stage, message: String },

    #[error("missing artifact '{artifact}' at {}", .path.display())]
    MissingArtifact { artifact: String, path: PathBuf },

    #[error("[{stage}] insufficient data: {message}")]
    InsufficientData { stage: Stage, message: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Linear algebra error: {0}")]
    LinAlg(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("npy read error: {0}")]
    NpyRead(#[from] ndarray_npy::ReadNpyError),

    #[error("npy write error: {0}")]
    NpyWrite(#[from] ndarray_npy::WriteNpyError),
}

impl GleError {
    pub fn shape(stage: Stage, message: impl Into<String>) -> Self {
        GleError::ShapeMismatch {
            stage,
            message: message.into(),
        }
    }

    pub fn unstable(stage: Stage, message: impl Into<String>) -> Self {
        GleError::NumericalInstability {
            stage,
            message: message.into(),
        }
    }

    pub fn insufficient(stage: Stage, message: impl Into<String>) -> Self {
        GleError::InsufficientData {
            stage,
            message: message.into(),
        }
    }

    /// Stage the error is attributed to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            GleError::ShapeMismatch { stage, .. }
            | GleError::NumericalInstability { stage, .. }
            | GleError::InsufficientData { stage, .. } => Some(*stage),
            GleError::MissingArtifact { .. } => Some(Stage::Cache),
            _ => None,
        }
    }

    /// Re-attribute a low-level linear algebra failure to a pipeline stage.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            GleError::LinAlg(message) => GleError::NumericalInstability { stage, message },
            other => other,
        }
    }
}

pub type GleResult<T> = Result<T, GleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_stage() {
        let err = GleError::shape(Stage::Kernel, "correlation is 3x4");
        assert_eq!(
            err.to_string(),
            "[kernel] shape mismatch: correlation is 3x4"
        );
        assert_eq!(err.stage(), Some(Stage::Kernel));
    }

    #[test]
    fn test_linalg_reattributed() {
        let err = GleError::LinAlg("singular pivot at column 0".into()).in_stage(Stage::Drift);
        assert!(matches!(
            err,
            GleError::NumericalInstability {
                stage: Stage::Drift,
                ..
            }
        ));
    }

    #[test]
    fn test_io_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: GleError = io.into();
        assert!(matches!(err, GleError::Io(_)));
        assert_eq!(err.stage(), None);
    }
}
