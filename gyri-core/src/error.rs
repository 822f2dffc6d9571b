use crate::types::Step;

/// Errors produced by the simulation core.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// Invalid parameters, unreadable configuration, or unusable
    /// reference data. Always fatal.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A non-finite value appeared in a field after a step.
    #[error("numerical divergence at step {step}: non-finite value in {quantity}")]
    NumericalDivergence { step: Step, quantity: &'static str },

    /// Isosurface extraction produced no usable mesh. Recoverable.
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

pub type SimResult<T> = Result<T, SimError>;

impl SimError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        SimError::Configuration(msg.into())
    }
}
