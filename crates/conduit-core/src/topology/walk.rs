//! Depth-first walk over buffer links.
//!
//! Every graph operation is a [`Visitor`]: `visit_node` does the per-node
//! work and, when it wants to go deeper, calls [`Topology::descend`], which
//! runs the optional per-edge hook and then visits the node on the far side
//! of each buffer in the walk direction.
//!
//! Result handling:
//! - `Ok(PathStatus::Stop)` from a node ends that branch only.
//! - An error from one child does not prevent its siblings from being
//!   visited; the first error is returned to the parent once all siblings
//!   ran, and the parent does no further work of its own.

use crate::component::{EndpointType, PathStatus};
use crate::error::PipelineError;
use crate::format::{StreamDirection, WalkDirection};

use super::{BufferId, NodeId, Topology};

pub(crate) type WalkResult = Result<PathStatus, PipelineError>;

pub(crate) trait Visitor {
    /// Direction the walk follows.
    fn direction(&self) -> WalkDirection;

    /// Called for every buffer crossed, before its far endpoint is visited.
    fn visit_edge(&mut self, topo: &mut Topology, buffer: BufferId) {
        let _ = (topo, buffer);
    }

    fn visit_node(&mut self, topo: &mut Topology, node: NodeId) -> WalkResult;
}

impl Topology {
    /// Visits every neighbour of `current` in the visitor's direction.
    pub(crate) fn descend<V: Visitor>(&mut self, current: NodeId, visitor: &mut V) -> WalkResult {
        let dir = visitor.direction();
        let mut first_err = None;
        let mut index = 0;

        while let Some(buffer) = self.node_ref(current)?.buffers(dir).get(index).copied() {
            index += 1;
            visitor.visit_edge(self, buffer);

            // Unconnected far end.
            let Some(next) = self.buffer_slot(buffer).and_then(|s| s.peer(dir)) else {
                continue;
            };
            if let Err(err) = visitor.visit_node(self, next) {
                tracing::debug!("walk {dir:?} from {current}: {next} failed: {err}");
                first_err.get_or_insert(err);
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(PathStatus::Continue),
        }
    }

    /// Whether a walk that started in `origin_pipeline`, moving with
    /// `stream`, may enter `node`.
    ///
    /// Nodes of the origin pipeline are always admitted. A foreign pipeline
    /// is entered only if its sink endpoint suits the stream: playback never
    /// leaks into a host- or node-terminated pipeline, capture never into a
    /// DAI- or node-terminated one. A foreign pipeline that is not completed
    /// has no endpoint yet and is not entered.
    pub(crate) fn may_enter(&self, node: NodeId, origin_pipeline: u32, stream: StreamDirection) -> bool {
        let Some(n) = self.node(node) else { return false };
        if n.pipeline_id() == origin_pipeline {
            return true;
        }

        let end_type = n
            .pipeline()
            .and_then(|g| self.graph(g))
            .and_then(|g| g.sink_comp())
            .and_then(|s| self.node(s))
            .map(|s| s.endpoint());
        let admitted = match (stream, end_type) {
            (_, None) => false,
            (StreamDirection::Playback, Some(EndpointType::Host | EndpointType::Node)) => false,
            (StreamDirection::Capture, Some(EndpointType::Dai | EndpointType::Node)) => false,
            _ => true,
        };
        if !admitted {
            tracing::trace!("walk: {node} is in foreign pipeline {}, not entered", n.pipeline_id());
        }
        admitted
    }
}

/// Stream direction a walk in `dir` corresponds to.
pub(crate) fn stream_of(dir: WalkDirection) -> StreamDirection {
    match dir {
        WalkDirection::Downstream => StreamDirection::Playback,
        WalkDirection::Upstream => StreamDirection::Capture,
    }
}
