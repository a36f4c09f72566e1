//! Monitor errors

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Cannot read artifact {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid drift threshold: {0}")]
    InvalidThreshold(f64),
}
