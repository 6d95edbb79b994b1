//! Parameter negotiation, prepare and reset walks.
//!
//! All three share the foreign-pipeline filter of
//! [`Topology::may_enter`]: a walk leaves its own pipeline only toward a
//! pipeline whose endpoint matches the stream direction.

use crate::component::{ComponentState, PathStatus};
use crate::error::PipelineError;
use crate::format::{StreamParams, WalkDirection, period_frames};
use crate::notify::{BufferEvent, NotifyScope};
use crate::schedule::{TaskId, TaskSpec};
use crate::shared::SharedBuffer;

use super::walk::{Visitor, WalkResult, stream_of};
use super::{BufferId, GraphId, NodeId, Topology};

struct ConfigureWalk {
    origin_pipeline: u32,
    params: StreamParams,
}

impl Visitor for ConfigureWalk {
    fn direction(&self) -> WalkDirection {
        self.params.direction.walk()
    }

    /// Picks up the format the upstream node left in the buffer.
    fn visit_edge(&mut self, topo: &mut Topology, buffer: BufferId) {
        if let Some(buf) = topo.buffer(buffer) {
            self.params.apply_format(&buf.params());
        }
    }

    fn visit_node(&mut self, topo: &mut Topology, node: NodeId) -> WalkResult {
        if !topo.may_enter(node, self.origin_pipeline, self.params.direction) {
            return Ok(PathStatus::Continue);
        }
        let n = topo.node_ref(node)?;
        let id = n.id();
        if n.state() == ComponentState::Active {
            tracing::trace!("configure: comp {id} already active, skipped");
            return Ok(PathStatus::Continue);
        }

        let dir = self.direction();
        let params = self.params;
        {
            let n = topo.node_mut(node)?;
            n.info.direction = params.direction;
            n.info.params = params;
        }
        let mut shared = false;
        topo.for_each_buffer(node, dir, |buf| {
            buf.set_params(params);
            shared |= buf.lock().caps().shared;
        })?;

        let status = topo
            .with_node(node, |n, env| n.configure(env, &params))?
            .map_err(|e| PipelineError::component(id, e))?;

        let n = topo.node_mut(node)?;
        let rate = if n.info.output_rate != 0 { n.info.output_rate } else { params.rate };
        n.info.frames = period_frames(rate, n.info.period_us);
        tracing::trace!("configure: comp {id} rate {rate} frames {}", n.info.frames);

        let scope = if shared { NotifyScope::AllCores } else { NotifyScope::CoreLocal };
        topo.notifier.publish(&BufferEvent::ConfigChanged { component: id }, scope);

        if status == PathStatus::Stop {
            return Ok(PathStatus::Stop);
        }
        // Each branch starts from what this node was configured with.
        let result = topo.descend(node, self);
        self.params = params;
        result
    }
}

struct PrepareWalk {
    origin_pipeline: u32,
    dir: WalkDirection,
}

impl Visitor for PrepareWalk {
    fn direction(&self) -> WalkDirection {
        self.dir
    }

    fn visit_edge(&mut self, topo: &mut Topology, buffer: BufferId) {
        if let Some(buf) = topo.buffer(buffer) {
            buf.reset_pos();
        }
    }

    fn visit_node(&mut self, topo: &mut Topology, node: NodeId) -> WalkResult {
        if !topo.may_enter(node, self.origin_pipeline, stream_of(self.dir)) {
            return Ok(PathStatus::Continue);
        }
        let n = topo.node_ref(node)?;
        let (id, graph) = (n.id(), n.pipeline());
        if let Some(graph) = graph {
            topo.ensure_task(graph)?;
        }

        let status = topo
            .with_node(node, |n, env| n.prepare(env))?
            .map_err(|e| PipelineError::component(id, e))?;
        if status == PathStatus::Stop {
            return Ok(PathStatus::Stop);
        }
        topo.descend(node, self)
    }
}

struct ResetWalk {
    origin_pipeline: u32,
    dir: WalkDirection,
}

impl Visitor for ResetWalk {
    fn direction(&self) -> WalkDirection {
        self.dir
    }

    fn visit_node(&mut self, topo: &mut Topology, node: NodeId) -> WalkResult {
        if !topo.may_enter(node, self.origin_pipeline, stream_of(self.dir)) {
            return Ok(PathStatus::Continue);
        }
        let id = topo.node_ref(node)?.id();
        let status = topo
            .with_node(node, |n, env| n.reset(env))?
            .map_err(|e| PipelineError::component(id, e))?;
        if status == PathStatus::Stop {
            return Ok(PathStatus::Stop);
        }
        topo.descend(node, self)
    }
}

impl Topology {
    /// Negotiates stream parameters from `host` in the stream direction.
    ///
    /// Each visited node receives the parameters, writes them to its buffers
    /// in the walk direction, runs its configure hook and derives its frame
    /// count from the (possibly overridden) rate and its pipeline period.
    /// Nodes already ACTIVE are left alone and not walked through.
    pub fn configure_params(&mut self, graph: GraphId, host: NodeId, params: &StreamParams) -> Result<(), PipelineError> {
        let host_id = self.graph_ref(graph)?.id();
        let origin_pipeline = self.node_ref(host)?.pipeline_id();
        tracing::debug!("pipeline_params: {host_id} from {host} {} {} Hz", params.direction, params.rate);

        let mut walk = ConfigureWalk {
            origin_pipeline,
            params: *params,
        };
        walk.visit_node(self, host).map(|_| ())
    }

    /// Prepares every node reachable from `start` in its stream direction.
    ///
    /// Creates the pipeline task on first use and rewinds every buffer
    /// crossed. The pipeline moves to PREPARE on success.
    pub fn prepare(&mut self, graph: GraphId, start: NodeId) -> Result<(), PipelineError> {
        let host_id = self.graph_ref(graph)?.id();
        let n = self.node_ref(start)?;
        let mut walk = PrepareWalk {
            origin_pipeline: n.pipeline_id(),
            dir: n.direction().walk(),
        };
        tracing::debug!("pipeline_prepare: {host_id} from {start}");

        walk.visit_node(self, start)?;
        self.graph_mut(graph)?.status = ComponentState::Prepare;
        Ok(())
    }

    /// Resets every node reachable from `host`.
    ///
    /// Always succeeds: node failures are logged and the pipeline returns to
    /// READY with its task disarmed and any pending xrun dropped.
    pub fn reset(&mut self, graph: GraphId, host: NodeId) -> Result<(), PipelineError> {
        let task = self.graph_ref(graph)?.task;
        self.reset_nodes(graph, host)?;
        if let Some(task) = task {
            self.scheduler.cancel(task);
        }
        let g = self.graph_mut(graph)?;
        g.status = ComponentState::Ready;
        g.xrun_bytes = 0;
        g.recovery_failures = 0;
        Ok(())
    }

    /// Returns every node reachable from `host` to READY, logging failures.
    pub(crate) fn reset_nodes(&mut self, graph: GraphId, host: NodeId) -> Result<(), PipelineError> {
        let g = self.graph_ref(graph)?;
        let (host_id, source) = (g.id(), g.source_comp);
        let n = self.node_ref(host)?;
        let origin = source.and_then(|s| self.node(s)).unwrap_or(n);
        let mut walk = ResetWalk {
            origin_pipeline: origin.pipeline_id(),
            dir: n.direction().walk(),
        };
        tracing::debug!("pipeline_reset: {host_id} from {host}");

        if let Err(err) = walk.visit_node(self, host) {
            tracing::warn!("pipeline_reset: {host_id}: {err}");
        }
        Ok(())
    }

    /// The pipeline's task, created on first use.
    pub(crate) fn ensure_task(&mut self, graph: GraphId) -> Result<TaskId, PipelineError> {
        let g = self.graph_ref(graph)?;
        if let Some(task) = g.task {
            return Ok(task);
        }
        let spec = TaskSpec {
            kind: g.desc.task_kind(),
            priority: g.desc.priority,
            core: g.desc.core,
            graph,
        };
        let task = self.scheduler.task_init(spec)?;
        self.graph_mut(graph)?.task = Some(task);
        Ok(task)
    }

    /// Calls `f` on each buffer `node` links to in `dir`.
    pub(crate) fn for_each_buffer(
        &self,
        node: NodeId,
        dir: WalkDirection,
        mut f: impl FnMut(&SharedBuffer),
    ) -> Result<(), PipelineError> {
        for &b in self.node_ref(node)?.buffers(dir) {
            if let Some(buf) = self.buffer(b) {
                f(buf);
            }
        }
        Ok(())
    }
}
