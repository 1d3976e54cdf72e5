use crate::candidate::Stage;
use crate::gateway::GatewayError;

/// Failure of one pipeline stage.
///
/// Gateway failures arrive here only after retries were exhausted; the other
/// variants come from validating model output at the parse boundary.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("{stage} response violates its schema: {reason}")]
    SchemaViolation { stage: Stage, reason: String },
    #[error("{stage} identifier {id:?} does not resolve in its candidate set")]
    UnresolvableIdentifier { stage: Stage, id: String },
    #[error("no usable {stage} candidates")]
    EmptyCandidateSet { stage: Stage },
}

impl StageError {
    pub fn schema(stage: Stage, reason: impl Into<String>) -> Self {
        Self::SchemaViolation {
            stage,
            reason: reason.into(),
        }
    }

    /// Stable name of the error kind, for reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Gateway(GatewayError::ExhaustedRetries { .. }) => "exhausted_retries",
            Self::SchemaViolation { .. } => "schema_violation",
            Self::UnresolvableIdentifier { .. } => "unresolvable_identifier",
            Self::EmptyCandidateSet { .. } => "empty_candidate_set",
        }
    }
}
