use thiserror::Error;

use crate::cache::local_cache::CacheError;
use crate::maven::coordinates::{Coordinate, MalformedCoordinateError};
use crate::maven::remote_repo::RepoError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error(transparent)]
    MalformedCoordinate(#[from] MalformedCoordinateError),

    #[error("network error fetching {coordinate}: {message}")]
    Network {
        coordinate: String,
        message: String,
    },

    #[error("{coordinate} not found in remote repository")]
    NotFound {
        coordinate: String,
    },

    #[error("remote repository rejected request for {coordinate}: {message}")]
    Rejected {
        coordinate: String,
        message: String,
    },

    #[error("cache entry for {coordinate} is corrupted ({reason}) and re-fetching failed: {refetch}")]
    CacheCorruption {
        coordinate: String,
        reason: String,
        refetch: Box<ResolveError>,
    },

    #[error("local cache failure for {coordinate}: {reason}")]
    Cache {
        coordinate: String,
        reason: String,
    },

    #[error("invalid metadata for {coordinate}: {message}")]
    InvalidMetadata {
        coordinate: String,
        message: String,
    },

    #[error("unable to resolve {}: {cause}", format_chain(.chain))]
    UnresolvableDependency {
        /// root first, failing node last
        chain: Vec<Coordinate>,
        cause: Box<ResolveError>,
    },

    #[error("resolution cancelled")]
    Cancelled,
}

impl ResolveError {
    pub fn from_repo(coordinate: &Coordinate, e: RepoError) -> ResolveError {
        match e {
            RepoError::Network(message) => ResolveError::Network { coordinate: coordinate.to_string(), message },
            RepoError::NotFound(_) => ResolveError::NotFound { coordinate: coordinate.to_string() },
            RepoError::Rejected(message) => ResolveError::Rejected { coordinate: coordinate.to_string(), message },
        }
    }

    pub fn from_cache(e: CacheError) -> ResolveError {
        match e {
            CacheError::Corrupted { coordinate, reason } | CacheError::Io { coordinate, reason } => ResolveError::Cache { coordinate, reason },
        }
    }

    pub fn invalid_metadata(coordinate: &Coordinate, e: impl std::fmt::Display) -> ResolveError {
        ResolveError::InvalidMetadata {
            coordinate: coordinate.to_string(),
            message: e.to_string(),
        }
    }
}

fn format_chain(chain: &[Coordinate]) -> String {
    chain.iter()
        .map(Coordinate::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}
