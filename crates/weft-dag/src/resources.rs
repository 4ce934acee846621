//! Resource demand and budget accounting.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Declared resource demand of a task; absent keys mean zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDemand(BTreeMap<String, u64>);

impl ResourceDemand {
    /// No demand at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// Add a demand entry (builder pattern); zero amounts are dropped.
    pub fn with(mut self, resource: impl Into<String>, amount: u64) -> Self {
        if amount > 0 {
            self.0.insert(resource.into(), amount);
        }
        self
    }

    pub fn get(&self, resource: &str) -> u64 {
        self.0.get(resource).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, u64)> for ResourceDemand {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::none(), |demand, (resource, amount)| {
                demand.with(resource, amount)
            })
    }
}

/// Global capacity per resource; absent keys are unbounded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceBudget(BTreeMap<String, u64>);

impl ResourceBudget {
    /// No caps at all.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Cap a resource (builder pattern).
    pub fn with(mut self, resource: impl Into<String>, capacity: u64) -> Self {
        self.0.insert(resource.into(), capacity);
        self
    }

    /// Capacity for a resource, if capped.
    pub fn capacity(&self, resource: &str) -> Option<u64> {
        self.0.get(resource).copied()
    }

    /// First resource whose capacity the demand exceeds outright, as
    /// `(resource, demanded, capacity)`. Such a task could never run.
    pub fn violation(&self, demand: &ResourceDemand) -> Option<(String, u64, u64)> {
        for (resource, amount) in demand.iter() {
            if let Some(cap) = self.capacity(resource) {
                if amount > cap {
                    return Some((resource.to_string(), amount, cap));
                }
            }
        }
        None
    }
}

/// Live admission ledger: capacity minus what running tasks hold.
///
/// Touched only by the control loop, so no locking.
#[derive(Debug)]
pub(crate) struct ResourcePool {
    budget: ResourceBudget,
    held: BTreeMap<String, u64>,
}

impl ResourcePool {
    pub fn new(budget: ResourceBudget) -> Self {
        Self {
            budget,
            held: BTreeMap::new(),
        }
    }

    /// Whether the demand fits in what is currently free.
    pub fn fits(&self, demand: &ResourceDemand) -> bool {
        demand
            .iter()
            .all(|(resource, amount)| match self.budget.capacity(resource) {
                Some(cap) => self.held.get(resource).copied().unwrap_or(0) + amount <= cap,
                None => true,
            })
    }

    pub fn acquire(&mut self, demand: &ResourceDemand) {
        for (resource, amount) in demand.iter() {
            *self.held.entry(resource.to_string()).or_insert(0) += amount;
        }
    }

    pub fn release(&mut self, demand: &ResourceDemand) {
        for (resource, amount) in demand.iter() {
            if let Some(held) = self.held.get_mut(resource) {
                *held = held.saturating_sub(amount);
            }
        }
    }
}
