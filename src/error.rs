//! The crate-wide error type.
//!
//! Every fallible operation in the engine returns `Result<_, ContagionError>`. Failures are either
//! configuration problems (a missing efficacy row, a probability out of range, a malformed input
//! file) or broken invariants (an individual found in a cohort that does not match its health
//! state). None of them are retryable; a run that hits one stops and reports it.
use std::fmt::{self, Debug, Display};
use std::io;

use crate::population::{HealthStatus, PersonId};

#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum ContagionError {
    IoError(io::Error),
    JsonError(serde_json::Error),
    CsvError(csv::Error),
    /// A lookup or configuration entry is missing or malformed. `key` names what was looked up.
    ConfigurationError {
        key: String,
        message: String,
    },
    /// A probability, efficacy or multiplier fell outside its permitted range.
    ConfigurationRangeError {
        name: String,
        value: f64,
    },
    /// A cohort member reached a branch its health state cannot take.
    InvalidStateError {
        person_id: PersonId,
        status: HealthStatus,
        days_remaining: Option<u32>,
    },
    InvalidPersonId(PersonId),
    CannotMakeEdgeToSelf(PersonId),
    InvalidDistance {
        person_id: PersonId,
        neighbor: PersonId,
        distance: f64,
    },
    DuplicateNeighbor {
        person_id: PersonId,
        neighbor: PersonId,
    },
    NetworkFrozen,
    DuplicateGlobalProperty(String),
    ReportError(String),
    /// A fatal error raised while processing a simulated day.
    RunAborted {
        day: u32,
        person_id: Option<PersonId>,
        source: Box<ContagionError>,
    },
}

impl ContagionError {
    pub(crate) fn configuration(key: impl Into<String>, message: impl Into<String>) -> Self {
        ContagionError::ConfigurationError {
            key: key.into(),
            message: message.into(),
        }
    }

    pub(crate) fn out_of_range(name: impl Into<String>, value: f64) -> Self {
        ContagionError::ConfigurationRangeError {
            name: name.into(),
            value,
        }
    }

    /// Attaches the day, and the individual when known, to an error raised while processing a
    /// day. Errors that already carry them are returned unchanged.
    #[must_use]
    pub(crate) fn aborted(self, day: u32, person_id: Option<PersonId>) -> Self {
        match self {
            ContagionError::RunAborted { .. } => self,
            source => ContagionError::RunAborted {
                day,
                person_id,
                source: Box::new(source),
            },
        }
    }

    /// Returns the innermost error, unwrapping any `RunAborted` layers.
    #[must_use]
    pub fn root_cause(&self) -> &ContagionError {
        match self {
            ContagionError::RunAborted { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<io::Error> for ContagionError {
    fn from(error: io::Error) -> Self {
        ContagionError::IoError(error)
    }
}

impl From<serde_json::Error> for ContagionError {
    fn from(error: serde_json::Error) -> Self {
        ContagionError::JsonError(error)
    }
}

impl From<csv::Error> for ContagionError {
    fn from(error: csv::Error) -> Self {
        ContagionError::CsvError(error)
    }
}

impl std::error::Error for ContagionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ContagionError::IoError(error) => Some(error),
            ContagionError::JsonError(error) => Some(error),
            ContagionError::CsvError(error) => Some(error),
            ContagionError::RunAborted { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl Display for ContagionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ContagionError::IoError(error) => write!(f, "I/O error: {error}"),
            ContagionError::JsonError(error) => write!(f, "JSON error: {error}"),
            ContagionError::CsvError(error) => write!(f, "CSV error: {error}"),
            ContagionError::ConfigurationError { key, message } => {
                write!(f, "configuration error for {key}: {message}")
            }
            ContagionError::ConfigurationRangeError { name, value } => {
                write!(f, "{name} = {value} is outside the permitted range [0, 1]")
            }
            ContagionError::InvalidStateError {
                person_id,
                status,
                days_remaining,
            } => write!(
                f,
                "person {person_id} is in an invalid state: {status:?} with timer {days_remaining:?}"
            ),
            ContagionError::InvalidPersonId(person_id) => {
                write!(f, "person {person_id} does not exist")
            }
            ContagionError::CannotMakeEdgeToSelf(person_id) => {
                write!(f, "person {person_id} cannot be its own neighbor")
            }
            ContagionError::InvalidDistance {
                person_id,
                neighbor,
                distance,
            } => write!(
                f,
                "invalid distance {distance} between person {person_id} and {neighbor}"
            ),
            ContagionError::DuplicateNeighbor {
                person_id,
                neighbor,
            } => write!(f, "person {neighbor} is already a neighbor of {person_id}"),
            ContagionError::NetworkFrozen => {
                write!(f, "the neighbor graph is frozen and cannot be modified")
            }
            ContagionError::DuplicateGlobalProperty(name) => {
                write!(f, "global property {name} has already been set")
            }
            ContagionError::ReportError(message) => write!(f, "report error: {message}"),
            ContagionError::RunAborted {
                day,
                person_id: Some(person_id),
                source,
            } => write!(f, "run aborted on day {day} (person {person_id}): {source}"),
            ContagionError::RunAborted {
                day,
                person_id: None,
                source,
            } => write!(f, "run aborted on day {day}: {source}"),
        }
    }
}
