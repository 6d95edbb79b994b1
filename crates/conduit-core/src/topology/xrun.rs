//! Xrun signalling, recovery and the periodic pipeline task.

use crate::component::{ComponentState, EndpointType, PathStatus, TriggerCmd};
use crate::error::PipelineError;
use crate::format::{StreamDirection, StreamPosition, WalkDirection};
use crate::schedule::TaskState;

use super::walk::{Visitor, WalkResult};
use super::{GraphId, NodeId, Topology};

/// Consecutive failed task periods after which the pipeline task gives up.
pub const MAX_RECOVERY_FAILURES: u32 = 2;

/// Walks from the xrun origin toward the host and notifies every host endpoint.
struct XrunReportWalk {
    dir: WalkDirection,
    posn: StreamPosition,
}

impl Visitor for XrunReportWalk {
    fn direction(&self) -> WalkDirection {
        self.dir
    }

    fn visit_node(&mut self, topo: &mut Topology, node: NodeId) -> WalkResult {
        let n = topo.node_ref(node)?;
        if n.endpoint() == EndpointType::Host {
            let mut posn = self.posn;
            n.position(&mut posn);
            posn.xrun_comp_id = self.posn.xrun_comp_id;
            posn.xrun_size = self.posn.xrun_size;
            topo.reporter.report_xrun(n.id(), &posn);
        }
        topo.descend(node, self).map(|_| PathStatus::Continue)
    }
}

impl Topology {
    /// The endpoint a graph-wide walk starts from: the source endpoint of a
    /// playback pipeline, the sink endpoint of a capture pipeline.
    pub(crate) fn stream_origin(&self, graph: GraphId) -> Result<NodeId, PipelineError> {
        let g = self.graph_ref(graph)?;
        let (Some(source), Some(sink)) = (g.source_comp, g.sink_comp) else {
            return Err(PipelineError::NotCompleted(g.id()));
        };
        Ok(match self.node_ref(source)?.direction() {
            StreamDirection::Playback => source,
            StreamDirection::Capture => sink,
        })
    }

    /// Stops the pipeline after `origin` over- or underran by `bytes`.
    ///
    /// Ignored while an xrun is already pending or when `origin` is not
    /// ACTIVE. Otherwise every node is moved back to READY, the task is
    /// disarmed, and each host endpoint between `origin` and the host is
    /// told which component ran dry and by how much.
    pub fn signal_xrun(&mut self, graph: GraphId, origin: NodeId, bytes: i32) -> Result<(), PipelineError> {
        let g = self.graph_ref(graph)?;
        let (host_id, task) = (g.id(), g.task);
        if g.xrun_bytes != 0 {
            return Ok(());
        }
        let n = self.node_ref(origin)?;
        if n.state() != ComponentState::Active {
            return Ok(());
        }
        let (comp_id, dir) = (n.id(), n.direction().walk().reverse());
        tracing::warn!("pipeline_xrun: {host_id} comp {comp_id} xrun of {bytes} bytes");

        let start = self.stream_origin(graph)?;
        if let Err(err) = self.trigger(graph, start, TriggerCmd::Xrun) {
            tracing::error!("pipeline_xrun: {host_id} xrun trigger failed: {err}");
        }

        let g = self.graph_mut(graph)?;
        g.xrun_bytes = bytes;
        g.status = ComponentState::Paused;
        if let Some(task) = task {
            self.scheduler.cancel(task);
        }

        let mut walk = XrunReportWalk {
            dir,
            posn: StreamPosition {
                xrun_comp_id: comp_id,
                xrun_size: bytes,
                ..StreamPosition::default()
            },
        };
        walk.visit_node(self, origin).map(|_| ())
    }

    /// Re-prepares and restarts a pipeline stopped by an xrun.
    ///
    /// After a failed attempt the nodes are reset first.
    pub fn xrun_recover(&mut self, graph: GraphId) -> Result<(), PipelineError> {
        let g = self.graph_ref(graph)?;
        let (host_id, failures) = (g.id(), g.recovery_failures);
        let origin = self.stream_origin(graph)?;
        tracing::info!("pipeline_xrun_recover: {host_id} restarting from {origin}");

        // A failed attempt can leave nodes half prepared.
        if failures > 0 {
            self.reset_nodes(graph, origin)?;
        }
        self.prepare(graph, origin)?;
        self.graph_mut(graph)?.xrun_bytes = 0;
        self.trigger(graph, origin, TriggerCmd::Start)
    }

    /// One invocation of the pipeline task.
    ///
    /// Recovers a stopped pipeline, then copies one period. A copy failure
    /// stops every node and is followed by an immediate recovery attempt; a
    /// failed recovery re-arms the task for the next period. After
    /// [`MAX_RECOVERY_FAILURES`] failed periods in a row the task completes
    /// and the pipeline stays PAUSED until the host restarts it.
    pub fn run_task(&mut self, graph: GraphId) -> TaskState {
        let Ok(g) = self.graph_ref(graph) else {
            tracing::warn!("pipeline_task: {graph} no longer exists");
            return TaskState::Completed;
        };
        let (host_id, pending) = (g.id(), g.xrun_bytes);

        // The task only runs on a stopped pipeline when a recovery is pending.
        if pending != 0 || g.status != ComponentState::Active {
            if let Err(err) = self.xrun_recover(graph) {
                if self.give_up(graph, pending, &err) {
                    return TaskState::Completed;
                }
                return self.retry_later(graph, pending, &err);
            }
        }

        let Err(err) = self.copy(graph) else {
            if let Ok(g) = self.graph_mut(graph) {
                g.recovery_failures = 0;
            }
            return TaskState::Reschedule;
        };
        tracing::warn!("pipeline_task: {host_id} copy failed: {err}");
        let pending = self.graph(graph).map_or(0, |g| g.xrun_bytes);
        if pending == 0 {
            self.halt(graph);
        }
        if self.give_up(graph, pending, &err) {
            return TaskState::Completed;
        }
        match self.xrun_recover(graph) {
            Ok(()) => TaskState::Reschedule,
            Err(err) => self.retry_later(graph, pending, &err),
        }
    }

    /// Moves every node back to READY after a copy failure that raised no xrun.
    fn halt(&mut self, graph: GraphId) {
        let Ok(start) = self.stream_origin(graph) else { return };
        if let Err(err) = self.trigger(graph, start, TriggerCmd::Xrun) {
            tracing::error!("pipeline_task: {graph} cannot stop after copy failure: {err}");
        }
        let Ok(g) = self.graph_mut(graph) else { return };
        g.status = ComponentState::Paused;
        let task = g.task;
        if let Some(task) = task {
            self.scheduler.cancel(task);
        }
    }

    /// Leaves the pipeline PAUSED with `pending` restored.
    fn mark_stopped(&mut self, graph: GraphId, pending: i32) {
        if let Ok(g) = self.graph_mut(graph) {
            g.status = ComponentState::Paused;
            if pending != 0 {
                g.xrun_bytes = pending;
            }
        }
    }

    /// Counts a failed period; true once the task should stop for good.
    fn give_up(&mut self, graph: GraphId, pending: i32, err: &PipelineError) -> bool {
        self.mark_stopped(graph, pending);
        let Ok(g) = self.graph_mut(graph) else {
            return true;
        };
        g.recovery_failures += 1;
        if g.recovery_failures < MAX_RECOVERY_FAILURES {
            return false;
        }
        tracing::error!(
            "pipeline_task: {} failed {} periods in a row, giving up: {err}",
            g.id(),
            g.recovery_failures
        );
        true
    }

    fn retry_later(&mut self, graph: GraphId, pending: i32, err: &PipelineError) -> TaskState {
        // A partly successful recovery may have moved the pipeline on.
        self.mark_stopped(graph, pending);
        let Ok(g) = self.graph_ref(graph) else {
            return TaskState::Completed;
        };
        let (host_id, task, period_us) = (g.id(), g.task, g.period_us());
        tracing::warn!("pipeline_task: {host_id} recovery failed, retrying: {err}");
        if let Some(task) = task {
            if let Err(err) = self.scheduler.schedule(task, u64::from(period_us), period_us) {
                tracing::error!("pipeline_task: {host_id} cannot re-arm task: {err}");
                return TaskState::Completed;
            }
        }
        TaskState::Reschedule
    }
}
