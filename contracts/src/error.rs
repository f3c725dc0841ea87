use crate::state::Domain;

/// Provider failures that must surface unchanged.
///
/// These come from the confidence assessor or tool layer talking to an LLM
/// provider. They are never recovered with synthesized results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    ContextLengthExceeded,
    ModelNotFound,
    Api,
    RateLimited,
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ProviderErrorKind::ContextLengthExceeded => "context_length_exceeded",
            ProviderErrorKind::ModelNotFound => "model_not_found",
            ProviderErrorKind::Api => "api_error",
            ProviderErrorKind::RateLimited => "rate_limited",
        };
        write!(f, "{}", label)
    }
}

/// Typed cause attached to a domain agent failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentErrorCause {
    Timeout,
    ProviderError,
    BadInput,
}

/// Scope at which a deadline fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutScope {
    Tool,
    Agent,
    Investigation,
    Session,
}

/// Error surface of the orchestrator core.
///
/// Tool, agent, and timeout errors are recorded on the state and recovered;
/// provider errors propagate out of the executor with their subkind intact.
#[derive(Debug, thiserror::Error)]
pub enum InquestError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("provider error ({kind}): {message}")]
    Provider {
        kind: ProviderErrorKind,
        message: String,
    },

    #[error("tool '{tool}' failed: {message}")]
    Tool { tool: String, message: String },

    #[error("{domain} agent failed ({cause:?}): {message}")]
    Agent {
        domain: Domain,
        cause: AgentErrorCause,
        message: String,
    },

    #[error("safety violation: {0}")]
    SafetyViolation(String),

    #[error("deadline exceeded at {scope:?} scope: {message}")]
    Timeout { scope: TimeoutScope, message: String },

    #[error("node attempted to overwrite protected field '{field}'")]
    StateMerge { field: String },

    #[error("checkpoint persistence failed: {0}")]
    Checkpoint(String),
}

impl InquestError {
    /// Whether this error must propagate out of the executor unrecovered.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, InquestError::Provider { .. })
    }

    /// Short machine-readable label used in error records and audit entries.
    pub fn kind_label(&self) -> &'static str {
        match self {
            InquestError::Config(_) => "config_error",
            InquestError::Provider { .. } => "provider_error",
            InquestError::Tool { .. } => "tool_error",
            InquestError::Agent { .. } => "agent_error",
            InquestError::SafetyViolation(_) => "safety_violation",
            InquestError::Timeout { .. } => "timeout_error",
            InquestError::StateMerge { .. } => "state_merge_error",
            InquestError::Checkpoint(_) => "checkpoint_error",
        }
    }
}

pub type InquestResult<T> = Result<T, InquestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_are_unrecoverable() {
        let err = InquestError::Provider {
            kind: ProviderErrorKind::ContextLengthExceeded,
            message: "prompt too large".into(),
        };
        assert!(err.is_unrecoverable());
        assert_eq!(err.kind_label(), "provider_error");
    }

    #[test]
    fn tool_errors_are_recoverable() {
        let err = InquestError::Tool {
            tool: "ip_reputation".into(),
            message: "upstream 503".into(),
        };
        assert!(!err.is_unrecoverable());
    }
}
