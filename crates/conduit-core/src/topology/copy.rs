//! The copy walk and timestamp collection.

use crate::component::{ComponentState, EndpointType, PathStatus};
use crate::error::PipelineError;
use crate::format::{StreamDirection, StreamPosition, WalkDirection};

use super::walk::{Visitor, WalkResult};
use super::{GraphId, NodeId, Topology};

struct CopyWalk {
    dir: WalkDirection,
    origin_pipeline: u32,
    /// First xrun a component reported during this walk.
    xrun: Option<(NodeId, i32)>,
}

impl CopyWalk {
    fn copy_node(&mut self, topo: &mut Topology, node: NodeId, id: u32) -> WalkResult {
        let (result, xrun) = topo.with_node(node, |n, env| {
            let result = n.copy(env);
            (result, n.info.pending_xrun.take())
        })?;
        if let Some(delta) = xrun {
            self.xrun.get_or_insert((node, delta));
        }
        result.map_err(|e| PipelineError::component(id, e))
    }
}

impl Visitor for CopyWalk {
    fn direction(&self) -> WalkDirection {
        self.dir
    }

    fn visit_node(&mut self, topo: &mut Topology, node: NodeId) -> WalkResult {
        let n = topo.node_ref(node)?;
        let id = n.id();
        if n.pipeline_id() != self.origin_pipeline {
            return Ok(PathStatus::Continue);
        }
        if n.state() != ComponentState::Active {
            tracing::trace!("copy: comp {id} not active");
            return Ok(PathStatus::Continue);
        }

        // Downstream: self first, then children. Upstream: children first.
        if self.dir == WalkDirection::Downstream && self.copy_node(topo, node, id)? == PathStatus::Stop {
            return Ok(PathStatus::Stop);
        }
        let status = topo.descend(node, self)?;
        if self.dir == WalkDirection::Upstream {
            return self.copy_node(topo, node, id);
        }
        Ok(status)
    }
}

struct TimestampWalk {
    start: NodeId,
    dir: WalkDirection,
    posn: StreamPosition,
    found: bool,
}

impl Visitor for TimestampWalk {
    fn direction(&self) -> WalkDirection {
        self.dir
    }

    fn visit_node(&mut self, topo: &mut Topology, node: NodeId) -> WalkResult {
        let n = topo.node_ref(node)?;
        if self.found || n.state() != ComponentState::Active {
            return Ok(PathStatus::Continue);
        }
        if node != self.start && n.endpoint() == EndpointType::Dai {
            n.position(&mut self.posn);
            self.found = true;
            return Ok(PathStatus::Stop);
        }
        topo.descend(node, self)
    }
}

impl Topology {
    /// Runs one copy cycle.
    ///
    /// Playback pipelines are walked upstream from the sink endpoint, capture
    /// pipelines downstream from the source endpoint, so data always leaves
    /// the true source before it reaches the true sink. Nodes outside the
    /// pipeline or not ACTIVE are skipped.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Xrun`] if a component reported an overrun or
    /// underrun; the xrun has already been signalled when this returns.
    pub fn copy(&mut self, graph: GraphId) -> Result<(), PipelineError> {
        let g = self.graph_ref(graph)?;
        let host_id = g.id();
        let (Some(source), Some(sink)) = (g.source_comp, g.sink_comp) else {
            return Err(PipelineError::NotCompleted(host_id));
        };
        let (start, dir) = match self.node_ref(source)?.direction() {
            StreamDirection::Playback => (sink, WalkDirection::Upstream),
            StreamDirection::Capture => (source, WalkDirection::Downstream),
        };

        let mut walk = CopyWalk {
            dir,
            origin_pipeline: self.node_ref(start)?.pipeline_id(),
            xrun: None,
        };
        let result = walk.visit_node(self, start);

        if let Some((origin, bytes)) = walk.xrun {
            let origin_graph = self.node(origin).and_then(|n| n.pipeline()).unwrap_or(graph);
            let id = self.node_ref(origin)?.id();
            self.signal_xrun(origin_graph, origin, bytes)?;
            return Err(PipelineError::Xrun { id, bytes });
        }
        result.map(|_| ()).inspect_err(|err| {
            tracing::error!("pipeline_copy: {host_id} from {start} {dir:?}: {err}");
        })
    }

    /// Host position plus the timestamp of the first active DAI reachable from `host`.
    pub fn get_timestamp(&mut self, graph: GraphId, host: NodeId) -> Result<StreamPosition, PipelineError> {
        let period_us = self.graph_ref(graph)?.period_us();
        let n = self.node_ref(host)?;
        let mut walk = TimestampWalk {
            start: host,
            dir: n.direction().walk(),
            posn: StreamPosition::default(),
            found: false,
        };
        n.position(&mut walk.posn);

        walk.visit_node(self, host)?;
        walk.posn.timestamp_ns = u64::from(period_us) * 1000;
        Ok(walk.posn)
    }
}
