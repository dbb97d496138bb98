use thiserror::Error;

use crate::common::Capacity;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchingError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0} is not part of this matching")]
    UnknownEntity(String),

    #[error("{0} has already been matched")]
    AlreadyMatched(String),

    #[error("there is no path between {u} and {v}")]
    NoCompatiblePath { u: String, v: String },

    #[error("cannot push {amount} from {origin} to {destination}, residual capacity is {residual}")]
    CapacityViolation {
        origin: String,
        destination: String,
        amount: Capacity,
        residual: Capacity,
    },
}

pub type Result<T> = std::result::Result<T, MatchingError>;
