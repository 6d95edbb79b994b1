//! Pipeline creation, completion and teardown.

use crate::component::{ComponentState, PathStatus};
use crate::error::PipelineError;
use crate::format::WalkDirection;
use crate::pipeline::{PipelineDescriptor, PipelineGraph};

use super::walk::{Visitor, WalkResult};
use super::{GraphId, NodeId, ObjectRef, Topology};

/// Claims every same-pipeline node downstream of the source.
struct CompleteWalk {
    graph: GraphId,
    pipeline_id: u32,
    period_us: u32,
}

impl Visitor for CompleteWalk {
    fn direction(&self) -> WalkDirection {
        WalkDirection::Downstream
    }

    fn visit_node(&mut self, topo: &mut Topology, node: NodeId) -> WalkResult {
        let n = topo.node_mut(node)?;
        if n.pipeline_id() != self.pipeline_id {
            return Ok(PathStatus::Continue);
        }
        n.pipeline = Some(self.graph);
        n.info.period_us = self.period_us;
        topo.descend(node, self)
    }
}

/// Releases pipeline membership and severs downstream links.
struct FreeWalk {
    pipeline_id: u32,
}

impl Visitor for FreeWalk {
    fn direction(&self) -> WalkDirection {
        WalkDirection::Downstream
    }

    fn visit_node(&mut self, topo: &mut Topology, node: NodeId) -> WalkResult {
        if topo.node_ref(node)?.pipeline_id() != self.pipeline_id {
            return Ok(PathStatus::Continue);
        }
        let status = topo.descend(node, self);

        let n = topo.node_mut(node)?;
        n.pipeline = None;
        let sinks = std::mem::take(&mut n.sinks);
        for buffer in sinks {
            if let Ok(slot) = topo.slot_mut(buffer) {
                slot.source = None;
            }
        }
        status
    }
}

impl Topology {
    /// Creates a pipeline driven by the component with host id `desc.sched_id`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::DuplicateId`], [`PipelineError::PipelineIdTaken`],
    /// [`PipelineError::MissingSchedulingComponent`] or
    /// [`PipelineError::CoreMismatch`]. Nothing is created on error.
    pub fn new_pipeline(&mut self, desc: &PipelineDescriptor) -> Result<GraphId, PipelineError> {
        if self.lookup(desc.id).is_some() {
            return Err(PipelineError::DuplicateId(desc.id));
        }
        if self.find_pipeline_by_pipeline_id(desc.pipeline_id).is_some() {
            return Err(PipelineError::PipelineIdTaken(desc.pipeline_id));
        }
        let sched = self
            .find_component(desc.sched_id)
            .ok_or(PipelineError::MissingSchedulingComponent(desc.sched_id))?;
        let sched_core = self.node_ref(sched)?.core();
        if sched_core != desc.core {
            return Err(PipelineError::CoreMismatch {
                pipeline: desc.core,
                component: sched_core,
            });
        }

        let id = GraphId(self.graphs.len() as u32);
        self.graphs.push(Some(PipelineGraph::new(*desc, sched)));
        self.ids.insert(desc.id, ObjectRef::Pipeline(id));
        tracing::debug!("pipeline_new: {} (pipeline {}) sched {} → {id}", desc.id, desc.pipeline_id, desc.sched_id);
        Ok(id)
    }

    /// Fixes pipeline membership and records the endpoints.
    ///
    /// Walks downstream from `source`, claiming every node that carries the
    /// source's pipeline id. Nodes of other pipelines are neither claimed nor
    /// walked through.
    ///
    /// # Errors
    ///
    /// [`PipelineError::AlreadyCompleted`] unless the pipeline is in INIT.
    pub fn complete(&mut self, graph: GraphId, source: NodeId, sink: NodeId) -> Result<(), PipelineError> {
        let g = self.graph_ref(graph)?;
        if g.status != ComponentState::Init {
            return Err(PipelineError::AlreadyCompleted(g.id()));
        }
        let (host_id, period_us) = (g.id(), g.period_us());
        self.node_ref(sink)?;

        let mut walk = CompleteWalk {
            graph,
            pipeline_id: self.node_ref(source)?.pipeline_id(),
            period_us,
        };
        walk.visit_node(self, source)?;

        let g = self.graph_mut(graph)?;
        g.source_comp = Some(source);
        g.sink_comp = Some(sink);
        g.status = ComponentState::Ready;
        tracing::debug!("pipeline_complete: {host_id} source {source} sink {sink}");
        Ok(())
    }

    /// Tears a pipeline down.
    ///
    /// Walks downstream from the source endpoint clearing membership and
    /// unlinking each node's sink buffers, then frees the task and the
    /// pipeline record. The components and buffers themselves survive.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Busy`] while the source endpoint is past READY.
    pub fn free_pipeline(&mut self, graph: GraphId) -> Result<(), PipelineError> {
        let g = self.graph_ref(graph)?;
        let (host_id, pipeline_id, source, task) = (g.id(), g.pipeline_id(), g.source_comp, g.task);

        if let Some(source) = source {
            if self.node_ref(source)?.state() > ComponentState::Ready {
                return Err(PipelineError::Busy(host_id));
            }
            FreeWalk { pipeline_id }.visit_node(self, source)?;
        }

        // Members not reachable from the source still point at the record.
        for n in self.nodes.iter_mut().flatten() {
            if n.pipeline == Some(graph) {
                n.pipeline = None;
            }
        }
        if let Some(task) = task {
            self.scheduler.free(task);
        }
        self.graphs[graph.0 as usize] = None;
        self.ids.remove(&host_id);
        tracing::debug!("pipeline_free: {host_id}");
        Ok(())
    }
}
