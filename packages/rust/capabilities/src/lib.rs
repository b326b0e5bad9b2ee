//! Capabilities: the named, invokable units a generation stage may use.
//!
//! This crate provides:
//! - [`capability`] — tagged-variant [`Capability`] model
//! - [`registry`] — per-stage capability sets with atomic replace-by-kind
//! - [`servers`] — external capability-server lifecycle management
//! - [`functions`] — local text-analysis functions exposed as capabilities

pub mod capability;
pub mod functions;
pub mod registry;
pub mod servers;

pub use capability::{Capability, CapabilityKind, CapabilitySpec, ToolDescriptor};
pub use functions::AnalysisFn;
pub use registry::CapabilityRegistry;
pub use servers::{ConnectedServer, ConnectedSet, ConnectionState, ServerConnection, connect_all, instantiate};
