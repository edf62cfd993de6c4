//! Experiment flags seen by in-process fetches.
//!
//! The flag source itself lives elsewhere. The queue only needs a way to read
//! the current list once and a frozen set to hand to every fetch.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An experiment as reported by the flag source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Percentage of traffic the experiment is rolled out to.
    pub rollout: u32,
}

impl Experiment {
    pub fn new(name: impl Into<String>, rollout: u32) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            rollout,
        }
    }
}

#[derive(Debug, Error)]
#[error("experiment source: {0}")]
pub struct ExperimentError(pub String);

/// Source of the current experiment list.
#[async_trait]
pub trait ExperimentGetter: Send + Sync {
    async fn experiments(&self) -> Result<Vec<Experiment>, ExperimentError>;
}

/// Getter over a fixed list.
#[derive(Debug, Clone, Default)]
pub struct StaticExperiments(pub Vec<Experiment>);

#[async_trait]
impl ExperimentGetter for StaticExperiments {
    async fn experiments(&self) -> Result<Vec<Experiment>, ExperimentError> {
        Ok(self.0.clone())
    }
}

/// Immutable set of active experiment names.
///
/// Built once per queue. A flag change needs a new queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExperimentSet {
    active: BTreeSet<String>,
}

impl ExperimentSet {
    /// Keep the experiments with a non-zero rollout.
    pub fn from_experiments<'a>(experiments: impl IntoIterator<Item = &'a Experiment>) -> Self {
        let active = experiments
            .into_iter()
            .filter(|e| e.rollout > 0)
            .map(|e| e.name.clone())
            .collect();
        Self { active }
    }

    /// Fetch the current list from `getter` and freeze it.
    pub async fn snapshot(getter: &dyn ExperimentGetter) -> Result<Arc<Self>, ExperimentError> {
        let experiments = getter.experiments().await?;
        Ok(Arc::new(Self::from_experiments(&experiments)))
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.active.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.active.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}
