//! Data handles with a three-state lifecycle.
//!
//! A [`Datum`] is a typed handle to a value that will exist at some point
//! during a run: created empty, populated with a pointer, and verified
//! available once the referenced value has been observed. Storage-specific
//! behavior (format checks, existence checks, deletion, hashing) lives
//! behind the [`DatumBackend`] trait; the handle enforces the lifecycle
//! around it.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::DatumError;

/// Opaque location descriptor for a datum's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Pointer {
    /// An in-memory value.
    Value(serde_json::Value),
    /// A filesystem path.
    Path(PathBuf),
    /// A remote or otherwise scheme-qualified location.
    Uri(String),
}

impl Pointer {
    /// Short human-readable description, used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Pointer::Value(value) => format!("value:{value}"),
            Pointer::Path(path) => format!("path:{}", path.display()),
            Pointer::Uri(uri) => format!("uri:{uri}"),
        }
    }
}

/// Lifecycle state of a datum.
///
/// Ordered least-advanced first so a group's state is the minimum over
/// its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatumState {
    /// No pointer assigned yet.
    Empty,
    /// Pointer assigned, existence unverified.
    Populated,
    /// Pointer assigned and the value observed to exist at least once.
    Available,
}

/// Storage-specific behavior behind a datum handle.
pub trait DatumBackend: Send + Sync {
    /// Whether the pointer is well-formed for this storage.
    fn validate_format(&self, pointer: &Pointer) -> bool;

    /// Whether the referenced value can be observed to exist.
    fn verify_available(&self, pointer: &Pointer) -> bool;

    /// Drop the underlying value if this handle owns it.
    fn clear(&self, pointer: &Pointer) -> anyhow::Result<()>;

    /// Short content-derived identity for change detection.
    fn quickhash(&self, pointer: &Pointer) -> String;
}

struct Slot {
    pointer: Option<Pointer>,
    state: DatumState,
}

/// A handle to a value flowing between tasks.
pub struct Datum {
    backend: Box<dyn DatumBackend>,
    slot: Mutex<Slot>,
}

/// Shared handle to a datum.
pub type DatumRef = Arc<Datum>;

impl Datum {
    /// Create an empty datum over the given backend.
    pub fn new(backend: impl DatumBackend + 'static) -> DatumRef {
        Arc::new(Self {
            backend: Box::new(backend),
            slot: Mutex::new(Slot {
                pointer: None,
                state: DatumState::Empty,
            }),
        })
    }

    /// Create a datum already populated with `pointer`.
    pub fn populated(
        backend: impl DatumBackend + 'static,
        pointer: Pointer,
    ) -> Result<DatumRef, DatumError> {
        let datum = Self::new(backend);
        datum.populate(pointer)?;
        Ok(datum)
    }

    /// Assign a pointer, moving `Empty` to `Populated`.
    ///
    /// Idempotent when the pointer equals the current one; assigning a
    /// different pointer to a non-empty datum is rejected. Clear first to
    /// repoint.
    pub fn populate(&self, pointer: Pointer) -> Result<(), DatumError> {
        if !self.backend.validate_format(&pointer) {
            return Err(DatumError::InvalidFormat(pointer.describe()));
        }
        let mut slot = self.slot.lock();
        match &slot.pointer {
            Some(current) if *current == pointer => Ok(()),
            Some(current) => Err(DatumError::InvalidFormat(format!(
                "already populated with {}",
                current.describe()
            ))),
            None => {
                slot.pointer = Some(pointer);
                slot.state = DatumState::Populated;
                Ok(())
            }
        }
    }

    /// Confirm the referenced value exists, moving `Populated` to
    /// `Available`. No-op when already available.
    pub fn verify(&self) -> Result<(), DatumError> {
        let mut slot = self.slot.lock();
        match slot.state {
            DatumState::Available => Ok(()),
            DatumState::Empty => Err(DatumError::NotAvailable("datum is empty".into())),
            DatumState::Populated => {
                let pointer = slot.pointer.as_ref().expect("populated datum has a pointer");
                if self.backend.verify_available(pointer) {
                    slot.state = DatumState::Available;
                    Ok(())
                } else {
                    Err(DatumError::NotAvailable(pointer.describe()))
                }
            }
        }
    }

    /// Non-erroring readiness probe: attempts verification when populated
    /// and reports whether the datum is available.
    pub fn try_verify(&self) -> bool {
        match self.state() {
            DatumState::Available => true,
            DatumState::Empty => false,
            DatumState::Populated => self.verify().is_ok(),
        }
    }

    /// Drop the underlying value and reset to `Empty`.
    pub fn clear(&self) -> anyhow::Result<()> {
        let mut slot = self.slot.lock();
        if let Some(pointer) = slot.pointer.as_ref() {
            self.backend.clear(pointer)?;
        }
        slot.pointer = None;
        slot.state = DatumState::Empty;
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DatumState {
        self.slot.lock().state
    }

    /// Snapshot of the assigned pointer, if any.
    pub fn pointer(&self) -> Option<Pointer> {
        self.slot.lock().pointer.clone()
    }

    /// Content-derived identity; `None` until the datum is available.
    pub fn quickhash(&self) -> Option<String> {
        let slot = self.slot.lock();
        match slot.state {
            DatumState::Available => slot.pointer.as_ref().map(|p| self.backend.quickhash(p)),
            _ => None,
        }
    }

    /// Content equality, defined only when both datums are available.
    pub fn content_eq(&self, other: &Datum) -> Option<bool> {
        Some(self.quickhash()? == other.quickhash()?)
    }
}

impl fmt::Debug for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.lock();
        f.debug_struct("Datum")
            .field("state", &slot.state)
            .field("pointer", &slot.pointer)
            .finish()
    }
}
