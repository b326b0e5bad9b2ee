//! The tagged-variant capability model.
//!
//! Stages never inspect a capability's runtime type; everything that cares
//! about "what kind of tool is this" filters on [`CapabilityKind`].

use serde::{Deserialize, Serialize};

use sitescribe_shared::StoreId;

use crate::functions::AnalysisFn;

/// Discriminant tag for a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapabilityKind {
    /// General web search provided by the generation backend.
    NetworkSearch,
    /// Query against a built content store.
    IndexQuery,
    /// A local analysis function.
    LocalFunction,
    /// Tools advertised by a connected external server.
    ExternalServerTool,
}

/// One tool advertised by an external server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Kind-specific payload of a capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CapabilitySpec {
    NetworkSearch,
    IndexQuery {
        /// Handle of the store this capability is bound to.
        store: StoreId,
        /// Maximum results returned per query.
        max_results: usize,
    },
    LocalFunction {
        function: AnalysisFn,
    },
    ExternalServerTool {
        /// Name of the providing server.
        server: String,
        /// Tools the server advertised at connect time.
        tools: Vec<ToolDescriptor>,
    },
}

/// A named, invokable unit exposed to a generation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    #[serde(flatten)]
    pub spec: CapabilitySpec,
}

impl Capability {
    pub fn network_search() -> Self {
        Self {
            name: "network_search".into(),
            spec: CapabilitySpec::NetworkSearch,
        }
    }

    /// An index-query capability bound to `store`.
    pub fn index_query(store: &StoreId, max_results: usize) -> Self {
        Self {
            name: "index_query".into(),
            spec: CapabilitySpec::IndexQuery {
                store: store.clone(),
                max_results,
            },
        }
    }

    pub fn local_function(function: AnalysisFn) -> Self {
        Self {
            name: function.name().into(),
            spec: CapabilitySpec::LocalFunction { function },
        }
    }

    /// A capability exposing one connected server's tools.
    pub fn external_server(server: impl Into<String>, tools: Vec<ToolDescriptor>) -> Self {
        let server = server.into();
        Self {
            name: server.clone(),
            spec: CapabilitySpec::ExternalServerTool { server, tools },
        }
    }

    /// The kind tag this capability is filtered and replaced by.
    pub fn kind(&self) -> CapabilityKind {
        match &self.spec {
            CapabilitySpec::NetworkSearch => CapabilityKind::NetworkSearch,
            CapabilitySpec::IndexQuery { .. } => CapabilityKind::IndexQuery,
            CapabilitySpec::LocalFunction { .. } => CapabilityKind::LocalFunction,
            CapabilitySpec::ExternalServerTool { .. } => CapabilityKind::ExternalServerTool,
        }
    }
}
