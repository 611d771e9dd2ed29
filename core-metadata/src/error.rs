use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Empty path")]
    EmptyPath,

    #[error("File not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Cannot access {path}: {source}")]
    PathIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to extract tags: {0}")]
    Extraction(#[from] bridge_traits::error::BridgeError),
}

pub type Result<T> = std::result::Result<T, MetadataError>;
