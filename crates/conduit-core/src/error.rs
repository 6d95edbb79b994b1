//! Error types for the pipeline engine.
//!
//! Errors are layered the way the engine is: [`BufferError`] for ring
//! storage, [`ComponentError`] for a single node's operations, and
//! [`PipelineError`] for everything the [`Topology`](crate::Topology)
//! exposes. Scheduler and cross-core routing failures have their own enums
//! so that collaborator implementations can return them without depending on
//! the graph types.

use thiserror::Error;

use crate::component::{ComponentState, ComponentType, TriggerCmd};
use crate::topology::{BufferId, GraphId, NodeId};

/// Errors raised while allocating or resizing a [`CircularBuffer`](crate::CircularBuffer).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// Requested capacity is zero or larger than the configured limit.
    #[error("invalid buffer size {size} (limit {max})")]
    InvalidSize {
        /// Requested capacity in bytes.
        size: usize,
        /// Largest capacity accepted.
        max: usize,
    },

    /// Alignment is not a power of two.
    #[error("invalid buffer alignment {0}")]
    InvalidAlignment(usize),

    /// The allocator could not provide the storage.
    #[error("out of memory allocating {bytes} bytes")]
    Alloc {
        /// Bytes requested from the allocator.
        bytes: usize,
    },
}

/// Errors raised by a single component's operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComponentError {
    /// The trigger command is not allowed from the node's current state.
    #[error("cannot apply {cmd:?} in state {state:?}")]
    InvalidState {
        /// State the node was in.
        state: ComponentState,
        /// Rejected command.
        cmd: TriggerCmd,
    },

    /// Stream parameters or descriptor parameters are unusable.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// The node is missing a buffer it needs.
    #[error("component is not connected: {0}")]
    NotConnected(&'static str),

    /// Driver-specific failure.
    #[error("driver error: {0}")]
    Driver(String),

    /// The component does not understand this attribute.
    #[error("unsupported attribute: {0}")]
    UnsupportedAttribute(&'static str),
}

/// Errors raised by a [`Scheduler`](crate::Scheduler) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// The task handle does not name a live task.
    #[error("unknown task {0}")]
    UnknownTask(u32),

    /// The scheduler has no room for another task.
    #[error("scheduler task table full")]
    NoCapacity,
}

/// Errors raised when forwarding a request to another core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// The remote core did not answer within the forwarding timeout.
    #[error("core {core} did not answer within {timeout_us} us")]
    Timeout {
        /// Destination core.
        core: u32,
        /// Timeout that elapsed.
        timeout_us: u64,
    },

    /// The destination core is powered down or not present.
    #[error("core {0} is not enabled")]
    CoreDisabled(u32),

    /// The remote core processed the request and rejected it.
    #[error("core {core} rejected request: {reason}")]
    Rejected {
        /// Destination core.
        core: u32,
        /// Remote error text.
        reason: String,
    },
}

/// Errors returned by [`Topology`](crate::Topology) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// No component with this host id exists.
    #[error("unknown component id {0}")]
    UnknownComponent(u32),

    /// No buffer with this host id exists.
    #[error("unknown buffer id {0}")]
    UnknownBuffer(u32),

    /// No pipeline with this host id exists.
    #[error("unknown pipeline id {0}")]
    UnknownPipeline(u32),

    /// A node handle does not name a live node.
    #[error("stale node handle {0}")]
    StaleNode(NodeId),

    /// A buffer handle does not name a live buffer.
    #[error("stale buffer handle {0}")]
    StaleBuffer(BufferId),

    /// A pipeline handle does not name a live pipeline.
    #[error("stale pipeline handle {0}")]
    StaleGraph(GraphId),

    /// The host id is already used by a component, buffer or pipeline.
    #[error("id {0} is already in use")]
    DuplicateId(u32),

    /// Another pipeline already carries this pipeline id.
    #[error("pipeline id {0} is already taken")]
    PipelineIdTaken(u32),

    /// The scheduling component is missing or is not a component.
    #[error("scheduling component {0} not found")]
    MissingSchedulingComponent(u32),

    /// Pipeline and scheduling component live on different cores.
    #[error("core mismatch: pipeline on core {pipeline}, component on core {component}")]
    CoreMismatch {
        /// Core of the pipeline descriptor.
        pipeline: u32,
        /// Core of the scheduling component.
        component: u32,
    },

    /// `complete` was called on a pipeline that is not in INIT.
    #[error("pipeline {0} is already completed")]
    AlreadyCompleted(u32),

    /// The pipeline has not been completed yet.
    #[error("pipeline {0} is not completed")]
    NotCompleted(u32),

    /// No component of the pipeline qualifies as its source or sink endpoint.
    #[error("pipeline {0} has no {1} endpoint")]
    NoEndpoint(u32, &'static str),

    /// The object is in use by a running pipeline.
    #[error("object {0} is busy")]
    Busy(u32),

    /// The requested connection is not component to buffer.
    #[error("invalid connection {source_id} -> {sink_id}")]
    InvalidConnection {
        /// Upstream host id.
        source_id: u32,
        /// Downstream host id.
        sink_id: u32,
    },

    /// No driver is registered for the component type.
    #[error("no driver for component type {0}")]
    NoDriver(ComponentType),

    /// A node operation failed.
    #[error("component {id}: {source}")]
    Component {
        /// Host id of the failing component.
        id: u32,
        /// Underlying component error.
        #[source]
        source: ComponentError,
    },

    /// A buffer could not be allocated or resized.
    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// The scheduler rejected a request.
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    /// A cross-core request failed.
    #[error(transparent)]
    Remote(#[from] RouteError),

    /// A copy cycle ended in an overrun or underrun.
    #[error("xrun of {bytes} bytes at component {id}")]
    Xrun {
        /// Host id of the component that detected the xrun.
        id: u32,
        /// Byte delta reported by the component.
        bytes: i32,
    },
}

impl PipelineError {
    /// Wraps a component error with the id of the node that raised it.
    pub fn component(id: u32, source: ComponentError) -> Self {
        PipelineError::Component { id, source }
    }
}
