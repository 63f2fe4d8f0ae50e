use std::fmt;

/// Request-level failures. Per-engine problems are recorded as failed
/// `EngineResult`s and never surface through this type.
#[derive(Debug)]
pub enum OrchestratorError {
    /// An unknown engine identifier was requested. No adapter is invoked
    /// and no partial report is produced.
    InvalidEngine(String),
    /// No adapters survived the startup capability probe.
    EmptyRegistry,
    /// The document failed structural validation.
    InvalidDocument(String),
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorError::InvalidEngine(id) => write!(f, "Unknown engine: {}", id),
            OrchestratorError::EmptyRegistry => write!(f, "No OCR engines available"),
            OrchestratorError::InvalidDocument(msg) => write!(f, "Invalid document: {}", msg),
        }
    }
}

impl std::error::Error for OrchestratorError {}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
