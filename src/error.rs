use std::{
    error::Error as StdError,
    fmt::{Display, Formatter},
};

/// Crate wide result type.
pub type StormFishResult<T> = Result<T, Error>;

/// The error taxonomy for an analysis run.
///
/// Only [Error::Geometry] raised while merging candidate fishing-ground
/// polygons is recovered locally (the offending pair is left unmerged).
/// Every other variant aborts the run and is surfaced through the status
/// record of the orchestrator.
#[derive(Debug, Clone)]
pub enum Error {
    /// Unknown country, missing season definition, or a bad run setting.
    Configuration(String),
    /// Missing required columns or fields, empty required geometry, or an
    /// unusable coordinate reference.
    DataValidation(String),
    /// Invalid or unrepairable polygon topology.
    Geometry(String),
    /// No records survived a required filter.
    EmptyResult(String),
    /// Cooperative cancellation, raised from within the progress callback.
    Cancelled,
    /// An unhandled failure in a pipeline phase, wrapping the cause.
    Pipeline { phase: u8, source: Box<Error> },
}

impl Error {
    /// Tag an error with the phase it occurred in. Cancellation is not
    /// wrapped so it keeps its meaning on the way out of the worker.
    pub fn in_phase(self, phase: u8) -> Self {
        match self {
            Error::Cancelled => Error::Cancelled,
            other => Error::Pipeline {
                phase,
                source: Box::new(other),
            },
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> Result<(), std::fmt::Error> {
        match self {
            Error::Configuration(msg) => write!(f, "configuration error: {}", msg),
            Error::DataValidation(msg) => write!(f, "data validation error: {}", msg),
            Error::Geometry(msg) => write!(f, "geometry error: {}", msg),
            Error::EmptyResult(msg) => write!(f, "empty result: {}", msg),
            Error::Cancelled => write!(f, "analysis cancelled"),
            Error::Pipeline { phase, source } => {
                write!(f, "pipeline failure in phase {}: {}", phase, source)
            }
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Pipeline { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::DataValidation(format!("io: {}", err))
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::DataValidation(format!("csv: {}", err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::DataValidation(format!("json: {}", err))
    }
}

impl From<chrono::ParseError> for Error {
    fn from(err: chrono::ParseError) -> Self {
        Error::DataValidation(format!("timestamp: {}", err))
    }
}
