//! Per-stage capability sets with atomic replace-by-kind updates.
//!
//! The registry is the one piece of state mutated while stages are reading.
//! Both setters take the write lock, so they serialize against each other
//! and commit atomically: a reader observes either the previous set or the
//! fully-updated one, never a partial update.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::{debug, info};

use sitescribe_shared::StoreId;

use crate::capability::{Capability, CapabilityKind};
use crate::servers::ConnectedServer;

#[derive(Debug, Default)]
struct RegistryState {
    /// Shared default set, inherited by stages with no override.
    defaults: Vec<Capability>,
    /// Per-stage overrides.
    per_stage: HashMap<String, Vec<Capability>>,
}

/// Registry of capabilities available to each pipeline stage.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    state: RwLock<RegistryState>,
}

impl CapabilityRegistry {
    /// Create a registry with a shared default capability set.
    pub fn new(defaults: Vec<Capability>) -> Self {
        let mut state = RegistryState::default();
        for cap in defaults {
            push_deduped(&mut state.defaults, cap);
        }
        Self {
            state: RwLock::new(state),
        }
    }

    /// Give `stage` its own capability set instead of the shared defaults.
    pub async fn register_stage(&self, stage: impl Into<String>, capabilities: Vec<Capability>) {
        let mut state = self.state.write().await;
        let mut set = Vec::new();
        for cap in capabilities {
            push_deduped(&mut set, cap);
        }
        state.per_stage.insert(stage.into(), set);
    }

    /// Bind every stage to a new content store.
    ///
    /// Removes all existing index-query capabilities from the defaults and
    /// from every stage's set, then inserts exactly one bound to `store`.
    /// Capabilities of other kinds are untouched.
    pub async fn set_index(&self, store: &StoreId, max_results: usize) {
        let replacement = Capability::index_query(store, max_results);

        let mut state = self.state.write().await;
        replace_kind(
            &mut state.defaults,
            CapabilityKind::IndexQuery,
            std::slice::from_ref(&replacement),
        );
        for set in state.per_stage.values_mut() {
            replace_kind(
                set,
                CapabilityKind::IndexQuery,
                std::slice::from_ref(&replacement),
            );
        }

        info!(store = %store, "index capability replaced across all stages");
    }

    /// Replace every stage's external-server capabilities with one per
    /// currently-connected server. Servers that failed to connect are simply
    /// absent: a degraded capability set, not an error.
    pub async fn set_external_servers(&self, servers: &[ConnectedServer]) {
        let replacements: Vec<Capability> = servers
            .iter()
            .map(|s| Capability::external_server(&s.name, s.tools.clone()))
            .collect();

        let mut state = self.state.write().await;
        replace_kind(
            &mut state.defaults,
            CapabilityKind::ExternalServerTool,
            &replacements,
        );
        for set in state.per_stage.values_mut() {
            replace_kind(set, CapabilityKind::ExternalServerTool, &replacements);
        }

        info!(
            servers = servers.len(),
            "external-server capabilities replaced across all stages"
        );
    }

    /// The capability set a stage sees right now.
    ///
    /// A stage without an override falls back to the shared defaults.
    /// Always reflects the latest completed update.
    pub async fn capabilities_for(&self, stage: &str) -> Vec<Capability> {
        let state = self.state.read().await;
        match state.per_stage.get(stage) {
            Some(set) => set.clone(),
            None => {
                debug!(stage, "no per-stage capabilities, using defaults");
                state.defaults.clone()
            }
        }
    }
}

/// Remove every capability of `kind` from `set`, then append the
/// replacements (deduplicated by kind and name).
fn replace_kind(set: &mut Vec<Capability>, kind: CapabilityKind, replacements: &[Capability]) {
    set.retain(|c| c.kind() != kind);
    for cap in replacements {
        push_deduped(set, cap.clone());
    }
}

/// Append `cap` unless an identical (kind, name) entry is already present.
fn push_deduped(set: &mut Vec<Capability>, cap: Capability) {
    if !set
        .iter()
        .any(|existing| existing.kind() == cap.kind() && existing.name == cap.name)
    {
        set.push(cap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::ToolDescriptor;
    use crate::functions::AnalysisFn;

    fn count_kind(set: &[Capability], kind: CapabilityKind) -> usize {
        set.iter().filter(|c| c.kind() == kind).count()
    }

    #[tokio::test]
    async fn unknown_stage_falls_back_to_defaults() {
        let registry = CapabilityRegistry::new(vec![Capability::network_search()]);
        let set = registry.capabilities_for("drafter").await;
        assert_eq!(set.len(), 1);
        assert_eq!(set[0].kind(), CapabilityKind::NetworkSearch);
    }

    #[tokio::test]
    async fn registered_stage_overrides_defaults() {
        let registry = CapabilityRegistry::new(vec![Capability::network_search()]);
        registry
            .register_stage(
                "editor",
                vec![Capability::local_function(AnalysisFn::ReadingEase)],
            )
            .await;

        let set = registry.capabilities_for("editor").await;
        assert_eq!(set.len(), 1);
        assert_eq!(set[0].kind(), CapabilityKind::LocalFunction);
    }

    #[tokio::test]
    async fn set_index_replaces_never_accumulates() {
        let registry = CapabilityRegistry::new(vec![Capability::network_search()]);
        registry.register_stage("research", vec![Capability::network_search()]).await;

        let a = StoreId::new();
        let b = StoreId::new();
        registry.set_index(&a, 4).await;
        registry.set_index(&b, 4).await;

        for stage in ["research", "unregistered"] {
            let set = registry.capabilities_for(stage).await;
            assert_eq!(count_kind(&set, CapabilityKind::IndexQuery), 1);
            let bound = set
                .iter()
                .find_map(|c| match &c.spec {
                    crate::capability::CapabilitySpec::IndexQuery { store, .. } => Some(store),
                    _ => None,
                })
                .expect("index capability");
            assert_eq!(bound, &b);
            // Other kinds untouched.
            assert_eq!(count_kind(&set, CapabilityKind::NetworkSearch), 1);
        }
    }

    #[tokio::test]
    async fn set_external_servers_replaces_by_kind() {
        let registry = CapabilityRegistry::new(vec![Capability::network_search()]);
        registry.set_index(&StoreId::new(), 4).await;

        let first = vec![ConnectedServer {
            name: "alpha".into(),
            tools: vec![ToolDescriptor {
                name: "lookup".into(),
                description: None,
            }],
        }];
        registry.set_external_servers(&first).await;

        let second = vec![
            ConnectedServer {
                name: "beta".into(),
                tools: vec![],
            },
            ConnectedServer {
                name: "gamma".into(),
                tools: vec![],
            },
        ];
        registry.set_external_servers(&second).await;

        let set = registry.capabilities_for("anything").await;
        assert_eq!(count_kind(&set, CapabilityKind::ExternalServerTool), 2);
        assert!(!set.iter().any(|c| c.name == "alpha"));
        // Index and search capabilities untouched by server updates.
        assert_eq!(count_kind(&set, CapabilityKind::IndexQuery), 1);
        assert_eq!(count_kind(&set, CapabilityKind::NetworkSearch), 1);
    }

    #[tokio::test]
    async fn empty_server_list_clears_the_kind() {
        let registry = CapabilityRegistry::new(vec![]);
        registry
            .set_external_servers(&[ConnectedServer {
                name: "alpha".into(),
                tools: vec![],
            }])
            .await;
        registry.set_external_servers(&[]).await;

        let set = registry.capabilities_for("anything").await;
        assert_eq!(count_kind(&set, CapabilityKind::ExternalServerTool), 0);
    }

    #[tokio::test]
    async fn duplicate_defaults_are_suppressed() {
        let registry = CapabilityRegistry::new(vec![
            Capability::network_search(),
            Capability::network_search(),
        ]);
        let set = registry.capabilities_for("anything").await;
        assert_eq!(set.len(), 1);
    }

    #[tokio::test]
    async fn reads_observe_committed_updates_under_concurrency() {
        use std::sync::Arc;

        let registry = Arc::new(CapabilityRegistry::new(vec![]));
        let a = StoreId::new();
        let b = StoreId::new();

        let writer = {
            let registry = registry.clone();
            let (a, b) = (a.clone(), b.clone());
            tokio::spawn(async move {
                for _ in 0..50 {
                    registry.set_index(&a, 4).await;
                    registry.set_index(&b, 4).await;
                }
            })
        };

        for _ in 0..200 {
            let set = registry.capabilities_for("reader").await;
            // Never empty-and-partial: at most one index capability at any
            // observable point, bound to a or b.
            assert!(count_kind(&set, CapabilityKind::IndexQuery) <= 1);
        }

        writer.await.unwrap();
        let set = registry.capabilities_for("reader").await;
        assert_eq!(count_kind(&set, CapabilityKind::IndexQuery), 1);
    }
}
