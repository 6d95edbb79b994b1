//! Cross-core request forwarding.
//!
//! Every object lives on one core. A request for an object owned by
//! another core is handed to a [`CoreRouter`], which blocks for at most the
//! configured timeout and reports the remote outcome.

use std::time::Duration;

use crate::error::RouteError;

/// Facade request that can be executed on another core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteRequest {
    /// Free a component by host id.
    FreeComponent(u32),
    /// Free a buffer by host id.
    FreeBuffer(u32),
    /// Connect two objects by host id.
    Connect {
        /// Upstream object.
        source_id: u32,
        /// Downstream object.
        sink_id: u32,
    },
    /// Complete a pipeline by host id.
    CompletePipeline(u32),
    /// Free a pipeline by host id.
    FreePipeline(u32),
}

/// Inter-core messaging service.
pub trait CoreRouter: Send + Sync {
    /// Sends `request` to `core` and waits up to `timeout` for its result.
    fn forward(&self, core: u32, request: RemoteRequest, timeout: Duration) -> Result<(), RouteError>;
}

/// Router for single-core builds: every other core is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalOnly;

impl CoreRouter for LocalOnly {
    fn forward(&self, core: u32, request: RemoteRequest, _timeout: Duration) -> Result<(), RouteError> {
        tracing::warn!(core, ?request, "cannot forward: core not enabled");
        Err(RouteError::CoreDisabled(core))
    }
}
