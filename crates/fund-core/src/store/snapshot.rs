//! JSON universe snapshot for offline scoring and backtests.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use super::memory::InMemoryStore;
use crate::types::{FundAttributes, NavPoint};
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySnapshot {
    #[serde(flatten)]
    pub attributes: FundAttributes,
    pub nav: Vec<NavPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkSnapshot {
    pub benchmark_id: String,
    pub nav: Vec<NavPoint>,
}

/// Entities with their attributes and NAV history, plus benchmark indices.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UniverseSnapshot {
    pub entities: Vec<EntitySnapshot>,
    #[serde(default)]
    pub benchmarks: Vec<BenchmarkSnapshot>,
}

impl UniverseSnapshot {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let snapshot: UniverseSnapshot = serde_json::from_str(&raw)?;
        info!(
            path = %path.display(),
            entities = snapshot.entities.len(),
            benchmarks = snapshot.benchmarks.len(),
            "Loaded universe snapshot"
        );
        Ok(snapshot)
    }

    pub fn into_store(self) -> InMemoryStore {
        let store = InMemoryStore::new();
        for entity in self.entities {
            store.insert_entity(entity.attributes, entity.nav);
        }
        for benchmark in self.benchmarks {
            store.insert_benchmark(benchmark.benchmark_id, benchmark.nav);
        }
        store
    }
}
