//! Error types for the recommendation core.

use crate::recommend::record::UserId;
use std::num::ParseIntError;
use thiserror::Error;

/// A rejected input line. The whole line is rejected; no partial records are emitted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid user id in line {line:?}: {source}")]
    InvalidUser {
        line: String,
        #[source]
        source: ParseIntError,
    },

    #[error("invalid friend id {token:?} in line {line:?}: {source}")]
    InvalidFriend {
        line: String,
        token: String,
        #[source]
        source: ParseIntError,
    },
}

#[derive(Error, Debug)]
pub enum RecommendError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A record reached a reduce group it does not belong to. The grouping
    /// stage broke its contract, so the run cannot continue.
    #[error("record for user {found} delivered to the reduce group of user {group}")]
    StructuralViolation { group: UserId, found: UserId },
}
