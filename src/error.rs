//! Fatal errors raised while building or opening an index.
//!
//! Lookups of unknown terms or out-of-range review ids are not errors: they
//! resolve to empty results at the call site.

use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::wildcard::WildcardKind;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("I/O error while building the index: {0}")]
    Io(#[from] io::Error),

    #[error("invalid builder options: {0}")]
    InvalidOptions(String),

    #[error("term of {length} bytes is too long to be stored ({term:.32}...)")]
    TermTooLong { term: String, length: usize },

    #[error("review {0} cannot be given a 32-bit identifier")]
    TooManyReviews(usize),

    #[error("malformed review at line {line}: {message}")]
    Corpus { line: usize, message: String },

    #[error("could not save the index information: {0}")]
    Information(String),
}

#[derive(Error, Debug)]
pub enum OpenError {
    #[error("index file {path} does not exist")]
    Missing { path: PathBuf },

    #[error("I/O error while reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("index file {path} is corrupted: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("index was built with the {built} wildcard structure, not {requested}")]
    WildcardMismatch {
        built: WildcardKind,
        requested: WildcardKind,
    },

    #[error("could not read the index information: {0}")]
    Information(String),
}

impl OpenError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            OpenError::Missing {
                path: path.to_path_buf(),
            }
        } else {
            OpenError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    pub(crate) fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        OpenError::Corrupt {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Opens an index file for reading
    pub(crate) fn open(path: &Path) -> Result<File, Self> {
        File::options()
            .read(true)
            .open(path)
            .map_err(|e| Self::io(path, e))
    }

    /// Reads a whole index file
    pub(crate) fn read(path: &Path) -> Result<Vec<u8>, Self> {
        std::fs::read(path).map_err(|e| Self::io(path, e))
    }
}
