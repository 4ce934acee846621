//! Ordered datum groupings addressable by name.

use crate::datum::{DatumRef, DatumState};
use crate::error::DatumError;
use crate::hash::short_hash;

/// An ordered name-to-datum mapping that behaves as a composite handle.
///
/// The group's state is the least-advanced state of its members, so it
/// reads as available only once every member is. Used to treat a task's
/// whole output set as one handle.
#[derive(Default, Clone)]
pub struct DatumGroup {
    entries: Vec<(String, DatumRef)>,
}

impl DatumGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a group from (name, datum) pairs, keeping their order.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, DatumRef)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Append a member; a repeated name replaces the earlier entry in place.
    pub fn insert(&mut self, name: impl Into<String>, datum: DatumRef) {
        let name = name.into();
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = datum;
        } else {
            self.entries.push((name, datum));
        }
    }

    /// Member lookup by name.
    pub fn get(&self, name: &str) -> Option<&DatumRef> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, d)| d)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Members in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DatumRef)> + '_ {
        self.entries.iter().map(|(n, d)| (n.as_str(), d))
    }

    /// Least-advanced member state; an empty group is vacuously available.
    pub fn state(&self) -> DatumState {
        self.entries
            .iter()
            .map(|(_, d)| d.state())
            .min()
            .unwrap_or(DatumState::Available)
    }

    /// Verify every member, stopping at the first failure.
    pub fn verify_all(&self) -> Result<(), DatumError> {
        for (_, datum) in &self.entries {
            datum.verify()?;
        }
        Ok(())
    }

    /// Clear every member.
    pub fn clear_all(&self) -> anyhow::Result<()> {
        for (_, datum) in &self.entries {
            datum.clear()?;
        }
        Ok(())
    }

    /// Aggregate identity over member hashes, sensitive to member order.
    ///
    /// `None` until every member is available.
    pub fn quickhash(&self) -> Option<String> {
        let mut buf = String::new();
        for (name, datum) in &self.entries {
            buf.push_str(name);
            buf.push(':');
            buf.push_str(&datum.quickhash()?);
            buf.push('\n');
        }
        Some(short_hash(buf.as_bytes()))
    }
}
