//! In-memory value datums.

use anyhow::bail;
use serde_json::Value;

use weft_dag::{Datum, DatumBackend, DatumRef, Pointer, TaskArgs, short_hash};

/// Backend for values held directly in memory.
///
/// Any non-null JSON value counts as observable.
pub struct ValueDatum;

impl ValueDatum {
    /// An empty in-memory datum.
    pub fn empty() -> DatumRef {
        Datum::new(ValueDatum)
    }

    /// A datum populated with `value`, ready for verification.
    pub fn with_value(value: impl Into<Value>) -> DatumRef {
        let datum = Self::empty();
        datum
            .populate(Pointer::Value(value.into()))
            .expect("in-memory pointers are always well-formed");
        datum
    }
}

impl DatumBackend for ValueDatum {
    fn validate_format(&self, pointer: &Pointer) -> bool {
        matches!(pointer, Pointer::Value(_))
    }

    fn verify_available(&self, pointer: &Pointer) -> bool {
        matches!(pointer, Pointer::Value(value) if !value.is_null())
    }

    fn clear(&self, _pointer: &Pointer) -> anyhow::Result<()> {
        Ok(())
    }

    fn quickhash(&self, pointer: &Pointer) -> String {
        match pointer {
            Pointer::Value(value) => short_hash(value.to_string().as_bytes()),
            other => short_hash(other.describe().as_bytes()),
        }
    }
}

/// Fetch an in-memory argument by name from a body's collected inputs.
pub fn arg_value<'a>(args: &'a TaskArgs, name: &str) -> anyhow::Result<&'a Value> {
    match args.get(name) {
        Some(Pointer::Value(value)) => Ok(value),
        Some(other) => bail!(
            "argument `{name}` is not an in-memory value: {}",
            other.describe()
        ),
        None => bail!("missing argument `{name}`"),
    }
}
