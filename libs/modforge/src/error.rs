use crate::lifecycle::{BuildState, Phase};
use thiserror::Error;

/// Structured errors for the module build.
///
/// Every variant is fatal to the build as a whole; there is no partial
/// success. `Cancelled` is the one non-fault outcome: it reports where the
/// build stopped, not a defect.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("cyclic module dependency detected: {}", path.join(" -> "))]
    CycleDetected { path: Vec<&'static str> },

    #[error("module '{module}' could not be constructed")]
    ModuleUnavailable {
        module: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("{phase} failed for module '{module}'")]
    HookFault {
        module: &'static str,
        phase: Phase,
        #[source]
        source: anyhow::Error,
    },

    #[error("build cancelled at phase {phase} before module '{module}'")]
    Cancelled {
        phase: Phase,
        module: &'static str,
    },

    #[error("no options of type '{type_name}' have been configured")]
    MissingOptions { type_name: &'static str },

    #[error("no service of type '{type_name}' has been registered")]
    MissingService { type_name: &'static str },

    #[error("pre-configure for '{type_name}' arrived after its actions were consumed")]
    LatePreConfigure { type_name: &'static str },

    #[error("operation requires build state {expected:?}, host is {actual:?}")]
    InvalidState {
        expected: BuildState,
        actual: BuildState,
    },
}

impl BuildError {
    /// The identity of the module the failure is attributed to, if any.
    pub fn module(&self) -> Option<&'static str> {
        match self {
            BuildError::ModuleUnavailable { module, .. }
            | BuildError::HookFault { module, .. }
            | BuildError::Cancelled { module, .. } => Some(module),
            _ => None,
        }
    }

    /// The phase the failure occurred in, if the failure is phase-scoped.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            BuildError::HookFault { phase, .. } | BuildError::Cancelled { phase, .. } => {
                Some(*phase)
            }
            _ => None,
        }
    }
}
