//! Filesystem-backed datums.

use std::fs;
use std::path::PathBuf;

use weft_dag::{Datum, DatumBackend, DatumError, DatumRef, Pointer, short_hash};

/// Backend for values materialized as files.
///
/// Verification is an existence check; clearing removes the file.
pub struct FileDatum;

impl FileDatum {
    /// An empty datum that will point at a file.
    pub fn empty() -> DatumRef {
        Datum::new(FileDatum)
    }

    /// A datum populated with `path`; verification checks the file exists.
    pub fn at(path: impl Into<PathBuf>) -> Result<DatumRef, DatumError> {
        let datum = Self::empty();
        datum.populate(Pointer::Path(path.into()))?;
        Ok(datum)
    }
}

impl DatumBackend for FileDatum {
    fn validate_format(&self, pointer: &Pointer) -> bool {
        matches!(pointer, Pointer::Path(path) if !path.as_os_str().is_empty())
    }

    fn verify_available(&self, pointer: &Pointer) -> bool {
        matches!(pointer, Pointer::Path(path) if path.exists())
    }

    fn clear(&self, pointer: &Pointer) -> anyhow::Result<()> {
        if let Pointer::Path(path) = pointer {
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    fn quickhash(&self, pointer: &Pointer) -> String {
        match pointer {
            Pointer::Path(path) => match fs::read(path) {
                Ok(bytes) => short_hash(&bytes),
                Err(_) => short_hash(path.to_string_lossy().as_bytes()),
            },
            other => short_hash(other.describe().as_bytes()),
        }
    }
}
