//! Error kinds per §7 of the design: per-component failures that the
//! route processor and CLI surface translate into transfer-record
//! messages and process exit codes.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Anonymizer verifier check that failed; carried verbatim into the
/// transfer record message so operators can see exactly what leaked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckFailure {
    pub check: String,
    pub detail: String,
}

impl std::fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.check, self.detail)
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("association refused: {0}")]
    AssociationRefused(String),

    #[error("receive aborted: {0}")]
    ReceiveAborted(String),

    #[error("anonymization failed: {0}")]
    AnonymizationFailed(String),

    #[error("verification failed: {0:?}")]
    VerificationFailed(Vec<CheckFailure>),

    #[error("honest broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("honest broker mapping missing for {id_type} {id_in}")]
    BrokerMappingMissing { id_type: String, id_in: String },

    #[error("destination unavailable: {0}")]
    DestinationUnavailable(String),

    #[error("destination rejected transfer: {0}")]
    DestinationRejected(String),

    #[error("id generation exhausted after {attempts} attempts for {id_type}/{id_in}")]
    IdGenerationExhausted {
        id_type: String,
        id_in: String,
        attempts: u32,
    },

    #[error("archive I/O failed: {0}")]
    ArchiveIOFailed(String),

    #[error("crosswalk store error: {0}")]
    Crosswalk(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        CoreError::Crosswalk(e.to_string())
    }
}
