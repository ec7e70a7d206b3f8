//
// error.rs
// dicom-forge
//
// Library error type shared by configuration, rendering and directory-index construction.
//
// Thales Matheus Mendonça Santos - November 2025

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Unified error type for the generator library.
#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("total size too small: {total} bytes leaves nothing after {overhead} bytes of metadata")]
    SizeTooSmall { total: u64, overhead: u64 },

    #[error("invalid size '{0}': use a format like '100MB' or '4.5GB'")]
    InvalidSize(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unknown modality '{0}', valid options: MR, CT, CR, DX, US, MG")]
    UnknownModality(String),

    #[error("unknown corruption type '{0}', valid types: siemens-csa, ge-private, philips-private, malformed-lengths (or 'all')")]
    UnknownDefect(String),

    #[error("unknown edge case type '{0}', valid types: special-chars, long-names, missing-tags, old-dates, varied-ids")]
    UnknownEdgeCase(String),

    #[error("unknown tag '{name}'{hint}")]
    UnknownTag { name: String, hint: String },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to generate image {index}: {source}")]
    Render {
        index: usize,
        #[source]
        source: Box<ForgeError>,
    },

    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no readable images found under {0:?}")]
    EmptyIndex(PathBuf),
}

impl ForgeError {
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        ForgeError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, ForgeError>;

/// Attaches the offending path to raw `std::io` failures.
pub trait IoResultExt<T> {
    fn at_path(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn at_path(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|e| ForgeError::io(path, e))
    }
}
