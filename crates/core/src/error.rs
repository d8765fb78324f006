use thiserror::Error;

/// Errors shared across the verdict crates.
///
/// The evaluation hot path never returns these: per-rule problems degrade
/// to non-firing results. They surface only from configuration handling
/// (parsing enum labels, building a matrix index, loading config).
#[derive(Error, Debug)]
pub enum VerdictError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unknown event type: '{0}'")]
    UnknownEventType(String),

    #[error("Unknown action: '{0}'")]
    UnknownAction(String),

    #[error("Unknown risk band: '{0}'")]
    UnknownRiskBand(String),

    #[error("Duplicate decision matrix entry for key '{0}'")]
    DuplicateMatrixKey(String),

    #[error("{0}")]
    Other(String),
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, VerdictError>;
