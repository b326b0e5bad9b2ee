//! Statically declared pipeline plans.
//!
//! A plan is an ordered list of stage groups. Stages within a group run
//! concurrently (fan-out); the next group starts only after every stage in
//! the previous one completed (fan-in). No stage ever decides at runtime
//! which stage runs next.

use std::collections::HashSet;

use sitescribe_shared::{Result, SiteScribeError};

/// One step of the generation pipeline.
#[derive(Debug, Clone)]
pub struct Stage {
    /// Stage name, used in errors and logs.
    pub name: String,
    /// Static instructions handed to the backend verbatim.
    pub instructions: String,
    /// Artifact names that must be present before the stage runs.
    pub required: Vec<String>,
    /// Artifact name the stage writes. A stage only ever writes this one.
    pub produces: String,
    /// Registry key for the stage's capability set; defaults to `name`.
    pub capabilities_key: Option<String>,
}

impl Stage {
    pub fn new(
        name: impl Into<String>,
        instructions: impl Into<String>,
        required: &[&str],
        produces: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            required: required.iter().map(|s| s.to_string()).collect(),
            produces: produces.into(),
            capabilities_key: None,
        }
    }

    /// Use a shared capability key instead of the stage name.
    pub fn with_capabilities_key(mut self, key: impl Into<String>) -> Self {
        self.capabilities_key = Some(key.into());
        self
    }

    pub(crate) fn capability_key(&self) -> &str {
        self.capabilities_key.as_deref().unwrap_or(&self.name)
    }
}

/// Stages that run concurrently between two barriers.
#[derive(Debug, Clone)]
pub struct StageGroup {
    pub stages: Vec<Stage>,
}

impl StageGroup {
    /// A group with a single sequential stage.
    pub fn single(stage: Stage) -> Self {
        Self {
            stages: vec![stage],
        }
    }

    /// A fan-out group of concurrent stages.
    pub fn parallel(stages: Vec<Stage>) -> Self {
        Self { stages }
    }
}

/// The fixed stage graph interpreted by the engine.
#[derive(Debug, Clone)]
pub struct PipelinePlan {
    pub groups: Vec<StageGroup>,
}

impl PipelinePlan {
    pub fn new(groups: Vec<StageGroup>) -> Self {
        Self { groups }
    }

    /// Check the plan is runnable given the initial artifact's name.
    ///
    /// Required artifacts must come from the initial artifact or an earlier
    /// group — a stage cannot depend on a sibling in its own fan-out group.
    /// Unsatisfiable requirements surface as
    /// [`SiteScribeError::MissingArtifact`]; they are configuration errors,
    /// caught before any backend call is made.
    pub fn validate(&self, initial_artifact: &str) -> Result<()> {
        if self.groups.is_empty() || self.groups.iter().all(|g| g.stages.is_empty()) {
            return Err(SiteScribeError::validation("pipeline plan has no stages"));
        }

        let mut available: HashSet<&str> = HashSet::from([initial_artifact]);
        let mut produced: HashSet<&str> = HashSet::new();

        for group in &self.groups {
            for stage in &group.stages {
                for req in &stage.required {
                    if !available.contains(req.as_str()) {
                        return Err(SiteScribeError::MissingArtifact {
                            stage: stage.name.clone(),
                            artifact: req.clone(),
                        });
                    }
                }
                if !produced.insert(stage.produces.as_str()) {
                    return Err(SiteScribeError::validation(format!(
                        "artifact '{}' is produced by more than one stage",
                        stage.produces
                    )));
                }
            }
            // Group products become visible only past the fan-in barrier.
            for stage in &group.stages {
                available.insert(stage.produces.as_str());
            }
        }

        Ok(())
    }

    /// Name of the artifact the whole run produces.
    pub fn final_artifact(&self) -> Option<&str> {
        self.groups
            .last()
            .and_then(|g| g.stages.last())
            .map(|s| s.produces.as_str())
    }
}
