use thiserror::Error;

/// Every failure the engine can surface to a caller.
///
/// Configuration errors abort a run before any sampling happens. A
/// [`EngineError::CalendarOverflow`] raised mid-run is caught by the engine and
/// turned into an aborted [`crate::engine::RunStatus`] instead of a hard error.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("parameter file has {found} columns per row, {expected} needed")]
    ParameterWidth { found: usize, expected: usize },

    #[error("parameter file row {line} has {found} columns, earlier rows have {expected}")]
    RaggedParameterRow {
        line: usize,
        found: usize,
        expected: usize,
    },

    #[error("parameter file line {line}: invalid number {token:?}")]
    ParameterParse { line: usize, token: String },

    #[error("parameter file contains no parameter rows")]
    EmptyEnsemble,

    #[error("unrecognised parameter set {0:?}")]
    UnknownParameterSet(String),

    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    #[error("simulation extends too far into the future: timestep {timestep} is outside the representable calendar")]
    CalendarOverflow { timestep: u32 },

    #[error("decomposition system for size class {size_class} is singular")]
    SingularSystem { size_class: f64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type EngineResult<T> = Result<T, EngineError>;
