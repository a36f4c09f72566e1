//! Integrity Validator - tamper detection over a fixed artifact manifest
//!
//! Hashes are captured once at construction. A file that changes, appears or
//! disappears afterwards is reported by path and never re-baselined.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use warden_core::sha256_hex;

use crate::error::MonitorError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub valid: bool,
    pub tampered: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct IntegrityValidator {
    /// `None` records that the file was absent at construction
    expected: BTreeMap<PathBuf, Option<String>>,
}

impl IntegrityValidator {
    pub fn new<I, P>(manifest: I) -> Result<Self, MonitorError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut expected = BTreeMap::new();
        for path in manifest {
            let path = path.as_ref().to_path_buf();
            let hash = hash_file(&path)?;
            expected.insert(path, hash);
        }

        tracing::debug!(artifacts = expected.len(), "Integrity manifest captured");
        Ok(Self { expected })
    }

    pub fn manifest(&self) -> impl Iterator<Item = &Path> {
        self.expected.keys().map(PathBuf::as_path)
    }

    pub fn validate(&self) -> IntegrityReport {
        let tampered: Vec<PathBuf> = self
            .expected
            .iter()
            .filter(|(path, expected)| match hash_file(path) {
                Ok(actual) => actual != **expected,
                Err(_) => true,
            })
            .map(|(path, _)| path.clone())
            .collect();

        for path in &tampered {
            tracing::error!(path = %path.display(), "Artifact integrity violation");
        }

        IntegrityReport {
            valid: tampered.is_empty(),
            tampered,
        }
    }
}

fn hash_file(path: &Path) -> Result<Option<String>, MonitorError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(sha256_hex(bytes))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(MonitorError::Artifact {
            path: path.to_path_buf(),
            source,
        }),
    }
}
