use std::fmt;

use celestial_wcs::WcsError;
use thiserror::Error;

/// Why no index qualified for a solve attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsuitableCause {
    /// No index covers the requested quad-scale range.
    NoMatchingScale,
    /// Indices of a suitable scale exist but none covers the requested sky region.
    NoSkyCoverage,
}

impl fmt::Display for UnsuitableCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMatchingScale => write!(f, "no indices of a suitable scale were found"),
            Self::NoSkyCoverage => write!(f, "the requested ra/dec region is not covered"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Precondition,
    Resource,
    Refinement,
}

#[derive(Debug, Error)]
pub enum SolveError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("source list has {found} valid objects, needs {required}")]
    InsufficientSources { found: usize, required: usize },

    #[error("starlist hasn't been set yet")]
    FieldNotSet,

    #[error("no index files loaded yet")]
    NoIndicesLoaded,

    #[error("a match has already been found; reset before solving again")]
    AlreadySolved,

    #[error("no solution found yet")]
    NotSolved,

    #[error("full starlist is not available")]
    FieldUnavailable,

    #[error("no suitable indices found: {cause}")]
    NoSuitableIndices { cause: UnsuitableCause },

    #[error("tweaking failed: {0}")]
    RefinementFailed(String),

    #[error("no metadata called '{column}' found in index {index}")]
    MetadataUnavailable { index: String, column: String },

    #[error("failed to load index {name}")]
    IndexLoad {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Wcs(#[from] WcsError),
}

impl SolveError {
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    pub fn refinement_failed(message: impl Into<String>) -> Self {
        Self::RefinementFailed(message.into())
    }

    pub fn metadata_unavailable(index: impl Into<String>, column: impl Into<String>) -> Self {
        Self::MetadataUnavailable {
            index: index.into(),
            column: column.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfiguration(_) | Self::InsufficientSources { .. } => {
                ErrorKind::Configuration
            }
            Self::FieldNotSet
            | Self::NoIndicesLoaded
            | Self::AlreadySolved
            | Self::NotSolved
            | Self::FieldUnavailable => ErrorKind::Precondition,
            Self::NoSuitableIndices { .. }
            | Self::MetadataUnavailable { .. }
            | Self::IndexLoad { .. } => ErrorKind::Resource,
            Self::RefinementFailed(_) | Self::Wcs(_) => ErrorKind::Refinement,
        }
    }
}

pub type SolveResult<T> = std::result::Result<T, SolveError>;
