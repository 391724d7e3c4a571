//! Engine registry — live adapters for the configured engines, plus model sync.
//!
//! Adapters are resolved once, at construction, through the fixed table in
//! [`crate::registry::build_provider`]. `sync_models` refreshes every
//! engine's model list concurrently; one unreachable engine never blocks or
//! fails the others.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use confab_core::config::{Config, EngineConfig, ModelFilter};
use confab_core::types::{Engine, Model};

use crate::registry::build_provider;
use crate::traits::Provider;

/// Result of syncing one engine.
#[derive(Clone, Debug, PartialEq)]
pub enum SyncOutcome {
    /// Models were listed; `filtered` were dropped by the allow-list.
    Synced { models: usize, filtered: usize },
    /// `connected()` returned false, so no listing was attempted.
    Offline,
    /// Listing failed after a successful probe.
    Failed(String),
    /// The engine's kind has no adapter.
    NoAdapter,
}

/// Per-engine outcomes of one `sync_models` run, in engine order.
#[derive(Clone, Debug, Default)]
pub struct SyncReport {
    pub outcomes: Vec<(String, SyncOutcome)>,
}

impl SyncReport {
    /// Outcome for one engine.
    pub fn outcome(&self, engine_id: &str) -> Option<&SyncOutcome> {
        self.outcomes
            .iter()
            .find(|(id, _)| id == engine_id)
            .map(|(_, o)| o)
    }

    /// Number of engines whose models were refreshed.
    pub fn synced(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, SyncOutcome::Synced { .. }))
            .count()
    }
}

struct EngineEntry {
    engine: Engine,
    adapter: Option<Arc<dyn Provider>>,
}

/// Configured engines with their resolved adapters.
pub struct EngineRegistry {
    entries: Vec<EngineEntry>,
    filters: BTreeMap<String, ModelFilter>,
}

impl EngineRegistry {
    /// Resolve adapters for every engine record. Unknown kinds are kept as
    /// engines without an adapter.
    pub fn new(configs: &[EngineConfig], filters: BTreeMap<String, ModelFilter>) -> Self {
        let entries = configs
            .iter()
            .map(|cfg| EngineEntry {
                engine: Engine {
                    id: cfg.id.clone(),
                    name: cfg.name.clone(),
                    kind: cfg.kind.clone(),
                    options: cfg.options.clone(),
                    models: Vec::new(),
                },
                adapter: build_provider(cfg),
            })
            .collect::<Vec<_>>();

        info!(
            engines = entries.len(),
            adapters = entries.iter().filter(|e| e.adapter.is_some()).count(),
            "Engine registry initialized"
        );

        Self { entries, filters }
    }

    /// Build from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.engines, config.model_filters.clone())
    }

    /// Register an engine with an already-built adapter, replacing any
    /// engine with the same id.
    pub fn register(&mut self, engine: Engine, adapter: Arc<dyn Provider>) {
        self.entries.retain(|e| e.engine.id != engine.id);
        self.entries.push(EngineEntry {
            engine,
            adapter: Some(adapter),
        });
    }

    /// Find an engine by id.
    pub fn engine(&self, id: &str) -> Option<&Engine> {
        self.entries.iter().map(|e| &e.engine).find(|e| e.id == id)
    }

    /// All engines, in configuration order.
    pub fn engines(&self) -> impl Iterator<Item = &Engine> {
        self.entries.iter().map(|e| &e.engine)
    }

    /// The adapter for an engine, if its kind is supported.
    pub fn adapter(&self, engine_id: &str) -> Option<Arc<dyn Provider>> {
        self.entries
            .iter()
            .find(|e| e.engine.id == engine_id)
            .and_then(|e| e.adapter.clone())
    }

    /// Find a synced model by canonical id, across all engines.
    pub fn find_model(&self, model_id: &str) -> Option<&Model> {
        self.engines()
            .flat_map(|e| e.models.iter())
            .find(|m| m.id == model_id)
    }

    /// Find a synced model by canonical id within one engine.
    pub fn engine_model(&self, engine_id: &str, model_id: &str) -> Option<&Model> {
        self.engine(engine_id)?
            .models
            .iter()
            .find(|m| m.id == model_id)
    }

    /// Refresh every engine's model list.
    ///
    /// Engines run concurrently; each one probes `connected()` before
    /// calling `models()`. A failing engine ends up with an empty list.
    pub async fn sync_models(&mut self) -> SyncReport {
        let mut tasks = JoinSet::new();

        for (idx, entry) in self.entries.iter().enumerate() {
            let Some(adapter) = entry.adapter.clone() else {
                continue;
            };
            let filter = self
                .filters
                .get(&entry.engine.kind)
                .cloned()
                .unwrap_or(ModelFilter::All);
            let engine_id = entry.engine.id.clone();

            tasks.spawn(async move {
                if !adapter.connected().await {
                    warn!(engine = %engine_id, "Engine unreachable, skipping model sync");
                    return (idx, SyncOutcome::Offline, Vec::new());
                }
                match adapter.models().await {
                    Ok(models) => {
                        let total = models.len();
                        let kept: Vec<Model> =
                            models.into_iter().filter(|m| filter.allows(&m.name)).collect();
                        debug!(engine = %engine_id, total, kept = kept.len(), "Models listed");
                        let outcome = SyncOutcome::Synced {
                            models: kept.len(),
                            filtered: total - kept.len(),
                        };
                        (idx, outcome, kept)
                    }
                    Err(e) => {
                        warn!(engine = %engine_id, error = %e, "Model sync failed");
                        (idx, SyncOutcome::Failed(e.to_string()), Vec::new())
                    }
                }
            });
        }

        let mut outcomes: Vec<SyncOutcome> = self
            .entries
            .iter()
            .map(|e| {
                if e.adapter.is_some() {
                    SyncOutcome::Failed("sync task aborted".to_string())
                } else {
                    SyncOutcome::NoAdapter
                }
            })
            .collect();

        for entry in &mut self.entries {
            entry.engine.models.clear();
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, outcome, models)) => {
                    self.entries[idx].engine.models = models;
                    outcomes[idx] = outcome;
                }
                Err(e) => warn!(error = %e, "Model sync task panicked"),
            }
        }

        let report = SyncReport {
            outcomes: self
                .entries
                .iter()
                .map(|e| e.engine.id.clone())
                .zip(outcomes)
                .collect(),
        };
        info!(
            engines = report.outcomes.len(),
            synced = report.synced(),
            "Model sync complete"
        );
        report
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
