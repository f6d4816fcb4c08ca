use thiserror::Error;

/// Hard failures of the analyzer.
///
/// Ordinary unresolved names, unmatched overloads and deliberately unmodeled
/// signature types never produce one of these; they only leave vertices
/// smaller than a full model would.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("Unsupported signature type: {0}")]
    Unsupported(String),

    #[error("`{path}` expects {expected} type argument(s), found {found}")]
    GenericArity {
        path: String,
        expected: usize,
        found: usize,
    },

    #[error("No fixpoint reached after {0} iterations")]
    NoFixpoint(usize),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
