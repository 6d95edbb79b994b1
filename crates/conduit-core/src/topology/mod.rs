//! The per-core object arena and every pipeline operation.
//!
//! A [`Topology`] owns all components, buffers and pipelines of one core.
//! Cross references are plain handles ([`NodeId`], [`BufferId`],
//! [`GraphId`]) into its arenas, so linked pipelines can be walked without
//! shared mutable aliasing. Host ids from descriptors map to handles through
//! one id table shared by all three object kinds.
//!
//! # Usage
//!
//! 1. Create components with [`new_component()`](Topology::new_component)
//!    and buffers with [`new_buffer()`](Topology::new_buffer)
//! 2. Wire them with [`connect()`](Topology::connect)
//! 3. Create a pipeline with [`new_pipeline()`](Topology::new_pipeline) and
//!    [`complete()`](Topology::complete) it
//! 4. Stream: [`configure_params()`](Topology::configure_params),
//!    [`prepare()`](Topology::prepare), [`trigger()`](Topology::trigger)
//! 5. The scheduler calls [`run_task()`](Topology::run_task) every period
//!
//! Operations addressed by host id, with cross-core forwarding, live in the
//! facade methods (`*_by_id`).

mod copy;
mod facade;
mod lifecycle;
mod negotiate;
mod trigger;
mod walk;
mod xrun;

use std::collections::BTreeMap;
use std::sync::Arc;

use core::fmt;

use crate::buffer::CircularBuffer;
use crate::component::node::NodeEnv;
use crate::component::{Attribute, ComponentDescriptor, ComponentNode, ComponentOps, ComponentState};
use crate::config::DomainConfig;
use crate::driver::{DriverLookup, NoDrivers};
use crate::error::PipelineError;
use crate::format::WalkDirection;
use crate::notify::{NotificationBus, Notifier};
use crate::pipeline::PipelineGraph;
use crate::report::{HostReporter, ReportLog};
use crate::route::{CoreRouter, LocalOnly};
use crate::schedule::{ManualScheduler, Scheduler};
use crate::shared::SharedBuffer;

pub use xrun::MAX_RECOVERY_FAILURES;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            /// Returns the raw arena index.
            #[inline]
            pub fn index(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

handle!(
    /// Handle to a component in a [`Topology`]. Never reused.
    NodeId
);
handle!(
    /// Handle to a buffer in a [`Topology`]. Never reused.
    BufferId
);
handle!(
    /// Handle to a pipeline in a [`Topology`]. Never reused.
    GraphId
);

/// What a host id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectRef {
    /// A component.
    Component(NodeId),
    /// A buffer.
    Buffer(BufferId),
    /// A pipeline.
    Pipeline(GraphId),
}

/// Creation parameters for a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDescriptor {
    /// Host id, unique across components, buffers and pipelines.
    pub id: u32,
    /// Pipeline the buffer belongs to.
    pub pipeline_id: u32,
    /// Core the buffer was created on.
    pub core: u32,
    /// Capacity in bytes.
    pub size: usize,
    /// Accessed from more than one core.
    pub shared: bool,
}

impl BufferDescriptor {
    /// Creates a core-local descriptor on core 0.
    pub fn new(id: u32, pipeline_id: u32, size: usize) -> Self {
        Self {
            id,
            pipeline_id,
            core: 0,
            size,
            shared: false,
        }
    }

    /// Builder: sets the core.
    pub fn with_core(mut self, core: u32) -> Self {
        self.core = core;
        self
    }
}

/// A buffer and its two endpoints.
#[derive(Debug)]
pub struct BufferSlot {
    pub(crate) id: u32,
    pub(crate) pipeline_id: u32,
    pub(crate) core: u32,
    pub(crate) buffer: SharedBuffer,
    /// Node writing into the buffer.
    pub(crate) source: Option<NodeId>,
    /// Node reading from the buffer.
    pub(crate) sink: Option<NodeId>,
}

impl BufferSlot {
    /// Host id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Pipeline id.
    pub fn pipeline_id(&self) -> u32 {
        self.pipeline_id
    }

    /// Core.
    pub fn core(&self) -> u32 {
        self.core
    }

    /// The buffer itself.
    pub fn buffer(&self) -> &SharedBuffer {
        &self.buffer
    }

    /// Node writing into the buffer.
    pub fn source(&self) -> Option<NodeId> {
        self.source
    }

    /// Node reading from the buffer.
    pub fn sink(&self) -> Option<NodeId> {
        self.sink
    }

    /// Endpoint a walk in `dir` reaches through this buffer.
    pub fn peer(&self, dir: WalkDirection) -> Option<NodeId> {
        match dir {
            WalkDirection::Downstream => self.sink,
            WalkDirection::Upstream => self.source,
        }
    }

    fn peer_mut(&mut self, dir: WalkDirection) -> &mut Option<NodeId> {
        match dir {
            WalkDirection::Downstream => &mut self.sink,
            WalkDirection::Upstream => &mut self.source,
        }
    }
}

/// External collaborators injected into a [`Topology`].
pub struct Services {
    /// Component factories.
    pub drivers: Arc<dyn DriverLookup>,
    /// Task scheduler.
    pub scheduler: Box<dyn Scheduler>,
    /// Notification bus.
    pub notifier: Arc<dyn Notifier>,
    /// Host message sink.
    pub reporter: Arc<dyn HostReporter>,
    /// Inter-core messaging.
    pub router: Arc<dyn CoreRouter>,
}

impl Default for Services {
    fn default() -> Self {
        Self {
            drivers: Arc::new(NoDrivers),
            scheduler: Box::new(ManualScheduler::new()),
            notifier: Arc::new(NotificationBus::new()),
            reporter: Arc::new(ReportLog::new()),
            router: Arc::new(LocalOnly),
        }
    }
}

impl Services {
    /// Builder: sets the driver lookup.
    pub fn with_drivers(mut self, drivers: Arc<dyn DriverLookup>) -> Self {
        self.drivers = drivers;
        self
    }

    /// Builder: sets the scheduler.
    pub fn with_scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Box::new(scheduler);
        self
    }

    /// Builder: sets the notification bus.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Builder: sets the host reporter.
    pub fn with_reporter(mut self, reporter: Arc<dyn HostReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Builder: sets the inter-core router.
    pub fn with_router(mut self, router: Arc<dyn CoreRouter>) -> Self {
        self.router = router;
        self
    }
}

/// All components, buffers and pipelines of one core.
pub struct Topology {
    config: DomainConfig,
    nodes: Vec<Option<ComponentNode>>,
    buffers: Vec<Option<BufferSlot>>,
    graphs: Vec<Option<PipelineGraph>>,
    ids: BTreeMap<u32, ObjectRef>,
    drivers: Arc<dyn DriverLookup>,
    scheduler: Box<dyn Scheduler>,
    notifier: Arc<dyn Notifier>,
    reporter: Arc<dyn HostReporter>,
    router: Arc<dyn CoreRouter>,
}

impl Topology {
    /// Creates an empty topology.
    pub fn new(config: DomainConfig, services: Services) -> Self {
        tracing::debug!(core = config.core, "topology init");
        Self {
            config,
            nodes: Vec::new(),
            buffers: Vec::new(),
            graphs: Vec::new(),
            ids: BTreeMap::new(),
            drivers: services.drivers,
            scheduler: services.scheduler,
            notifier: services.notifier,
            reporter: services.reporter,
            router: services.router,
        }
    }

    /// Domain configuration.
    pub fn config(&self) -> &DomainConfig {
        &self.config
    }

    // --- Object creation ---

    /// Creates a component through the driver lookup.
    ///
    /// The new node starts in READY.
    ///
    /// # Errors
    ///
    /// [`PipelineError::DuplicateId`] if the host id is taken,
    /// [`PipelineError::NoDriver`] if no driver handles the type, or the
    /// factory's own error.
    pub fn new_component(&mut self, desc: &ComponentDescriptor) -> Result<NodeId, PipelineError> {
        self.check_free_id(desc.id)?;
        let factory = self.drivers.lookup(desc.kind).ok_or(PipelineError::NoDriver(desc.kind))?;
        let ops = factory(desc).map_err(|e| PipelineError::component(desc.id, e))?;
        self.add_component(desc, ops)
    }

    /// Adds a component with an already constructed driver.
    pub fn add_component(
        &mut self,
        desc: &ComponentDescriptor,
        ops: Box<dyn ComponentOps>,
    ) -> Result<NodeId, PipelineError> {
        self.check_free_id(desc.id)?;
        let mut node = ComponentNode::new(desc, ops);
        node.info.state = ComponentState::Ready;

        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(node));
        self.ids.insert(desc.id, ObjectRef::Component(id));
        tracing::debug!("comp_new: {} {} pipeline {} → {id}", desc.kind, desc.id, desc.pipeline_id);
        Ok(id)
    }

    /// Allocates a buffer.
    pub fn new_buffer(&mut self, desc: &BufferDescriptor) -> Result<BufferId, PipelineError> {
        self.check_free_id(desc.id)?;
        let mut ring =
            CircularBuffer::allocate_with_limit(desc.size, self.config.buffer_align, self.config.max_buffer_bytes)?;
        ring.set_shared(desc.shared);

        let id = BufferId(self.buffers.len() as u32);
        self.buffers.push(Some(BufferSlot {
            id: desc.id,
            pipeline_id: desc.pipeline_id,
            core: desc.core,
            buffer: SharedBuffer::new(desc.id, ring, self.notifier.clone()),
            source: None,
            sink: None,
        }));
        self.ids.insert(desc.id, ObjectRef::Buffer(id));
        tracing::debug!("buffer_new: {} size {} → {id}", desc.id, desc.size);
        Ok(id)
    }

    fn check_free_id(&self, id: u32) -> Result<(), PipelineError> {
        if self.ids.contains_key(&id) {
            return Err(PipelineError::DuplicateId(id));
        }
        Ok(())
    }

    // --- Connections ---

    /// Connects `node` and `buffer`.
    ///
    /// [`WalkDirection::Downstream`] makes the buffer one of the node's sinks
    /// (the node writes into it); [`WalkDirection::Upstream`] makes it one of
    /// the node's sources. A buffer whose core differs from the node's is
    /// flagged shared.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InvalidConnection`] if that side of the buffer is
    /// already connected.
    pub fn connect(&mut self, node: NodeId, buffer: BufferId, dir: WalkDirection) -> Result<(), PipelineError> {
        let (comp_id, comp_core) = {
            let n = self.node_ref(node)?;
            (n.id(), n.core())
        };
        let slot = self.slot_mut(buffer)?;
        // The buffer's endpoint on the node's side is the opposite direction.
        let end = slot.peer_mut(dir.reverse());
        if end.is_some() {
            let (source_id, sink_id) = match dir {
                WalkDirection::Downstream => (comp_id, slot.id),
                WalkDirection::Upstream => (slot.id, comp_id),
            };
            return Err(PipelineError::InvalidConnection { source_id, sink_id });
        }
        *end = Some(node);
        if slot.core != comp_core {
            slot.buffer.lock().set_shared(true);
        }
        let buf_id = slot.id;

        self.node_mut(node)?.buffers_mut(dir).push(buffer);
        match dir {
            WalkDirection::Downstream => tracing::debug!("connect: comp {comp_id} → buffer {buf_id}"),
            WalkDirection::Upstream => tracing::debug!("connect: buffer {buf_id} → comp {comp_id}"),
        }
        Ok(())
    }

    /// Resizes a buffer. Refused while either endpoint is streaming.
    pub fn resize_buffer(&mut self, buffer: BufferId, size: usize) -> Result<(), PipelineError> {
        let slot = self.slot_ref(buffer)?;
        for end in [slot.source, slot.sink].into_iter().flatten() {
            if self.node_ref(end)?.state() >= ComponentState::Paused {
                return Err(PipelineError::Busy(slot.id));
            }
        }
        slot.buffer.resize(size)?;
        Ok(())
    }

    /// Pushes a runtime attribute into a component.
    pub fn set_attribute(&mut self, node: NodeId, attr: Attribute) -> Result<(), PipelineError> {
        let n = self.node_mut(node)?;
        let id = n.id();
        n.set_attribute(attr).map_err(|e| PipelineError::component(id, e))
    }

    // --- Teardown ---

    /// Frees a component, severing its buffer links.
    ///
    /// Pipeline endpoint and scheduling references to the node are cleared.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Busy`] while the node or its pipeline is streaming.
    pub fn free_component(&mut self, node: NodeId) -> Result<(), PipelineError> {
        let n = self.node_ref(node)?;
        let comp_id = n.id();
        let running = n.state() >= ComponentState::Paused
            || n.pipeline().and_then(|g| self.graph(g)).is_some_and(PipelineGraph::is_running);
        if running {
            return Err(PipelineError::Busy(comp_id));
        }

        let mut n = self.nodes[node.0 as usize].take().ok_or(PipelineError::StaleNode(node))?;
        n.free();
        for (list, side) in [(&n.sources, WalkDirection::Downstream), (&n.sinks, WalkDirection::Upstream)] {
            // A source buffer points at this node through its sink side and vice versa.
            for &b in list {
                if let Some(slot) = self.buffers.get_mut(b.0 as usize).and_then(Option::as_mut) {
                    *slot.peer_mut(side) = None;
                }
            }
        }
        for graph in self.graphs.iter_mut().flatten() {
            for r in [&mut graph.source_comp, &mut graph.sink_comp, &mut graph.sched_comp] {
                if *r == Some(node) {
                    *r = None;
                }
            }
        }
        self.ids.remove(&comp_id);
        tracing::debug!("comp_free: {comp_id}");
        Ok(())
    }

    /// Frees a buffer after announcing it and detaching both endpoints.
    pub fn free_buffer(&mut self, buffer: BufferId) -> Result<(), PipelineError> {
        let slot = self.slot_ref(buffer)?;
        for end in [slot.source, slot.sink].into_iter().flatten() {
            if self.node_ref(end)?.state() >= ComponentState::Paused {
                return Err(PipelineError::Busy(slot.id));
            }
        }

        let slot = self.buffers[buffer.0 as usize].take().ok_or(PipelineError::StaleBuffer(buffer))?;
        slot.buffer.announce_free();
        if let Some(n) = slot.source.and_then(|n| self.nodes.get_mut(n.0 as usize)).and_then(Option::as_mut) {
            n.sinks.retain(|&b| b != buffer);
        }
        if let Some(n) = slot.sink.and_then(|n| self.nodes.get_mut(n.0 as usize)).and_then(Option::as_mut) {
            n.sources.retain(|&b| b != buffer);
        }
        self.ids.remove(&slot.id);
        tracing::debug!("buffer_free: {}", slot.id);
        Ok(())
    }

    // --- Lookup ---

    /// Resolves a host id.
    pub fn lookup(&self, id: u32) -> Option<ObjectRef> {
        self.ids.get(&id).copied()
    }

    /// Component with host id `id`.
    pub fn find_component(&self, id: u32) -> Option<NodeId> {
        match self.lookup(id)? {
            ObjectRef::Component(n) => Some(n),
            _ => None,
        }
    }

    /// Buffer with host id `id`.
    pub fn find_buffer(&self, id: u32) -> Option<BufferId> {
        match self.lookup(id)? {
            ObjectRef::Buffer(b) => Some(b),
            _ => None,
        }
    }

    /// Pipeline with host id `id`.
    pub fn find_pipeline(&self, id: u32) -> Option<GraphId> {
        match self.lookup(id)? {
            ObjectRef::Pipeline(g) => Some(g),
            _ => None,
        }
    }

    /// Pipeline carrying pipeline id `pipeline_id`.
    pub fn find_pipeline_by_pipeline_id(&self, pipeline_id: u32) -> Option<GraphId> {
        self.graph_ids().find(|&g| self.graph(g).is_some_and(|p| p.pipeline_id() == pipeline_id))
    }

    /// A live component.
    pub fn node(&self, id: NodeId) -> Option<&ComponentNode> {
        self.nodes.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// A live buffer.
    pub fn buffer(&self, id: BufferId) -> Option<&SharedBuffer> {
        self.buffer_slot(id).map(BufferSlot::buffer)
    }

    /// A live buffer with its endpoints.
    pub fn buffer_slot(&self, id: BufferId) -> Option<&BufferSlot> {
        self.buffers.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// A live pipeline.
    pub fn graph(&self, id: GraphId) -> Option<&PipelineGraph> {
        self.graphs.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// Handles of all live components, in creation order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        live_handles(&self.nodes).map(NodeId)
    }

    /// Handles of all live buffers, in creation order.
    pub fn buffer_ids(&self) -> impl Iterator<Item = BufferId> + '_ {
        live_handles(&self.buffers).map(BufferId)
    }

    /// Handles of all live pipelines, in creation order.
    pub fn graph_ids(&self) -> impl Iterator<Item = GraphId> + '_ {
        live_handles(&self.graphs).map(GraphId)
    }

    pub(crate) fn node_ref(&self, id: NodeId) -> Result<&ComponentNode, PipelineError> {
        self.node(id).ok_or(PipelineError::StaleNode(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut ComponentNode, PipelineError> {
        self.nodes
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(PipelineError::StaleNode(id))
    }

    pub(crate) fn slot_ref(&self, id: BufferId) -> Result<&BufferSlot, PipelineError> {
        self.buffer_slot(id).ok_or(PipelineError::StaleBuffer(id))
    }

    pub(crate) fn slot_mut(&mut self, id: BufferId) -> Result<&mut BufferSlot, PipelineError> {
        self.buffers
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(PipelineError::StaleBuffer(id))
    }

    pub(crate) fn graph_ref(&self, id: GraphId) -> Result<&PipelineGraph, PipelineError> {
        self.graph(id).ok_or(PipelineError::StaleGraph(id))
    }

    pub(crate) fn graph_mut(&mut self, id: GraphId) -> Result<&mut PipelineGraph, PipelineError> {
        self.graphs
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(PipelineError::StaleGraph(id))
    }

    /// Runs `f` on node `id` with the environment its hooks need.
    pub(crate) fn with_node<R>(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut ComponentNode, &NodeEnv<'_>) -> R,
    ) -> Result<R, PipelineError> {
        let env = NodeEnv {
            buffers: &self.buffers,
            reporter: self.reporter.as_ref(),
        };
        let node = self
            .nodes
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(PipelineError::StaleNode(id))?;
        Ok(f(node, &env))
    }
}

fn live_handles<T>(slots: &[Option<T>]) -> impl Iterator<Item = u32> + '_ {
    slots
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_some())
        .map(|(i, _)| i as u32)
}

impl fmt::Debug for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topology")
            .field("core", &self.config.core)
            .field("nodes", &self.node_ids().count())
            .field("buffers", &self.buffer_ids().count())
            .field("graphs", &self.graph_ids().count())
            .finish_non_exhaustive()
    }
}
