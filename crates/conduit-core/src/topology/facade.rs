//! Operations addressed by host id.
//!
//! These mirror the handle-based operations but resolve ids first, and hand
//! the request to the [`CoreRouter`](crate::route::CoreRouter) when the
//! object lives on another core.

use crate::error::PipelineError;
use crate::format::WalkDirection;
use crate::route::RemoteRequest;

use super::{NodeId, ObjectRef, Topology};

impl Topology {
    /// Forwards `request` if `core` is not this domain's core.
    ///
    /// Returns `true` when the request was executed remotely.
    fn forward_if_remote(&self, core: u32, request: RemoteRequest) -> Result<bool, PipelineError> {
        if core == self.config.core {
            return Ok(false);
        }
        tracing::debug!("ipc: forwarding {request:?} to core {core}");
        self.router.forward(core, request, self.config.forward_timeout)?;
        Ok(true)
    }

    /// Frees the component with host id `id`.
    pub fn free_component_by_id(&mut self, id: u32) -> Result<(), PipelineError> {
        let node = self.find_component(id).ok_or(PipelineError::UnknownComponent(id))?;
        if self.forward_if_remote(self.node_ref(node)?.core(), RemoteRequest::FreeComponent(id))? {
            return Ok(());
        }
        self.free_component(node)
    }

    /// Frees the buffer with host id `id`.
    pub fn free_buffer_by_id(&mut self, id: u32) -> Result<(), PipelineError> {
        let buffer = self.find_buffer(id).ok_or(PipelineError::UnknownBuffer(id))?;
        if self.forward_if_remote(self.slot_ref(buffer)?.core(), RemoteRequest::FreeBuffer(id))? {
            return Ok(());
        }
        self.free_buffer(buffer)
    }

    /// Connects two objects by host id.
    ///
    /// Exactly one side must be a buffer: component → buffer makes the
    /// buffer a sink of the component, buffer → component a source. The
    /// request runs on the component's core.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InvalidConnection`] for any other pairing.
    pub fn connect_ids(&mut self, source_id: u32, sink_id: u32) -> Result<(), PipelineError> {
        let (node, buffer, dir) = match (self.lookup(source_id), self.lookup(sink_id)) {
            (Some(ObjectRef::Component(n)), Some(ObjectRef::Buffer(b))) => (n, b, WalkDirection::Downstream),
            (Some(ObjectRef::Buffer(b)), Some(ObjectRef::Component(n))) => (n, b, WalkDirection::Upstream),
            (None, _) => return Err(PipelineError::UnknownComponent(source_id)),
            (_, None) => return Err(PipelineError::UnknownComponent(sink_id)),
            _ => {
                tracing::warn!("ipc_connect: {source_id} -> {sink_id} is not component/buffer");
                return Err(PipelineError::InvalidConnection { source_id, sink_id });
            }
        };
        let core = self.node_ref(node)?.core();
        if self.forward_if_remote(core, RemoteRequest::Connect { source_id, sink_id })? {
            return Ok(());
        }
        self.connect(node, buffer, dir)
    }

    /// Completes the pipeline with host id `id`, resolving its endpoints.
    ///
    /// See [`Topology::resolve_endpoint`].
    pub fn complete_pipeline_by_id(&mut self, id: u32) -> Result<(), PipelineError> {
        let graph = self.find_pipeline(id).ok_or(PipelineError::UnknownPipeline(id))?;
        let g = self.graph_ref(graph)?;
        let (core, pipeline_id) = (g.desc.core, g.pipeline_id());
        if self.forward_if_remote(core, RemoteRequest::CompletePipeline(id))? {
            return Ok(());
        }

        let source = self
            .resolve_endpoint(pipeline_id, WalkDirection::Upstream)
            .ok_or(PipelineError::NoEndpoint(id, "source"))?;
        let sink = self
            .resolve_endpoint(pipeline_id, WalkDirection::Downstream)
            .ok_or(PipelineError::NoEndpoint(id, "sink"))?;
        self.complete(graph, source, sink)
    }

    /// Frees the pipeline with host id `id`.
    pub fn free_pipeline_by_id(&mut self, id: u32) -> Result<(), PipelineError> {
        let graph = self.find_pipeline(id).ok_or(PipelineError::UnknownPipeline(id))?;
        if self.forward_if_remote(self.graph_ref(graph)?.desc.core, RemoteRequest::FreePipeline(id))? {
            return Ok(());
        }
        self.free_pipeline(graph)
    }

    /// Finds the endpoint of pipeline `pipeline_id` at the `dir` end.
    ///
    /// [`WalkDirection::Upstream`] yields the source, downstream the sink.
    /// Prefers a member with no buffers on that side; otherwise takes the
    /// first member whose first buffer on that side leads into another
    /// pipeline.
    pub fn resolve_endpoint(&self, pipeline_id: u32, dir: WalkDirection) -> Option<NodeId> {
        let members: Vec<NodeId> = self
            .node_ids()
            .filter(|&id| self.node(id).is_some_and(|n| n.pipeline_id() == pipeline_id))
            .collect();

        let open_end = members
            .iter()
            .copied()
            .find(|&id| self.node(id).is_some_and(|n| n.buffers(dir).is_empty()));
        open_end.or_else(|| {
            members.iter().copied().find(|&id| {
                self.node(id)
                    .and_then(|n| n.buffers(dir).first())
                    .and_then(|&b| self.buffer_slot(b))
                    .and_then(|slot| slot.peer(dir))
                    .and_then(|peer| self.node(peer))
                    .is_some_and(|peer| peer.pipeline_id() != pipeline_id)
            })
        })
    }
}
