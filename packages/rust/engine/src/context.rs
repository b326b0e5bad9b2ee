//! The per-run artifact map.

use std::collections::HashMap;

use serde_json::Value;

/// Named artifacts threaded between stages during a single run.
///
/// Owned exclusively by the engine for the run's duration and discarded at
/// run end. Each artifact name is written by exactly one stage (which may
/// overwrite its own output, never another stage's), so readers need no
/// synchronization: the engine only records values at group barriers.
#[derive(Debug)]
pub struct RunContext {
    artifacts: HashMap<String, Value>,
}

impl RunContext {
    /// A fresh context seeded with the initial artifact.
    pub fn new(initial_name: impl Into<String>, initial_value: Value) -> Self {
        let mut artifacts = HashMap::new();
        artifacts.insert(initial_name.into(), initial_value);
        Self { artifacts }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.artifacts.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.artifacts.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Record a stage's produced artifact.
    pub(crate) fn record(&mut self, name: &str, value: Value) {
        self.artifacts.insert(name.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn seeded_with_initial_artifact() {
        let ctx = RunContext::new("brief", json!({"site": "example.com"}));
        assert!(ctx.contains("brief"));
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.get("brief").unwrap()["site"], "example.com");
    }

    #[test]
    fn records_and_overwrites_by_name() {
        let mut ctx = RunContext::new("topic", json!("rust tooling"));
        ctx.record("draft_1", json!("first pass"));
        ctx.record("draft_1", json!("second pass"));
        assert_eq!(ctx.get("draft_1").unwrap(), "second pass");
        assert_eq!(ctx.len(), 2);
    }
}
