use std::path::PathBuf;

/// All errors that can occur while indexing, augmenting, and batching data.
///
/// A single error type across the workspace keeps propagation simple.  Every
/// failure here is fatal to the run: there is no retry classification, and a
/// single bad sample aborts the batch that contains it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The dataset root is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The class-index JSON file could not be parsed.
    #[error("malformed class index {path}: {reason}")]
    MalformedIndex { path: PathBuf, reason: String },

    /// A class folder name has no entry in the class index.
    #[error("unknown class folder: {0:?}")]
    UnknownClass(String),

    /// Image decode or re-encode failed; carries the offending file path.
    #[error("image decode failed for {path}: {reason}")]
    ImageDecode { path: PathBuf, reason: String },

    /// Image dimensions incompatible with the 4:2:0 block geometry.
    #[error("unsupported geometry: {width}x{height} (dimensions must be multiples of {multiple})")]
    UnsupportedGeometry {
        width: u32,
        height: u32,
        multiple: u32,
    },

    /// A required environment variable is not set.
    #[error("missing environment variable: {0}")]
    MissingEnv(&'static str),

    /// Generator has fewer samples than one batch.
    #[error("dataset of {samples} samples cannot fill a batch of {batch_size}")]
    EmptyEpoch { samples: usize, batch_size: usize },

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }
}

/// Convenience Result type used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;
