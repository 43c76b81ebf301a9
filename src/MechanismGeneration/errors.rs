use crate::MechanismGeneration::snapshot::ModelSnapshot;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MechanismError {
    /// malformed structure or a reaction that is not a reaction (e.g. identical sides)
    #[error("Structural error: {0}")]
    Structural(String),
    #[error("Integration failed for condition {condition}: {message}")]
    Integration { condition: usize, message: String },
    #[error(
        "Model enlargement did not converge after {iterations} iterations ({core_species} core species): {message}"
    )]
    NonConvergence {
        iterations: usize,
        core_species: usize,
        message: String,
    },
    /// references an entity the registry does not know, or would break a core/edge invariant
    #[error("Registry consistency error: {0}")]
    RegistryConsistency(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Thermochemistry error: {0}")]
    Thermo(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl MechanismError {
    /// Errors after which the model state can not be trusted any more
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MechanismError::RegistryConsistency(_) | MechanismError::Structural(_)
        )
    }
}

/// Failure of a whole enlargement run; the model accumulated so far is returned with it
#[derive(Debug, Error)]
#[error("{error} (partial model: {} core species, {} core reactions)", .model.core_species_count(), .model.core_reactions_count())]
pub struct EnlargementFailure {
    pub error: MechanismError,
    pub model: ModelSnapshot,
    pub iterations: usize,
}
