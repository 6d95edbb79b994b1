//! Trigger propagation and the pipeline's reaction to it.

use crate::component::{ComponentState, PathStatus, TriggerCmd};
use crate::error::PipelineError;
use crate::format::WalkDirection;

use super::walk::{Visitor, WalkResult};
use super::{GraphId, NodeId, Topology};

struct TriggerWalk {
    cmd: TriggerCmd,
    dir: WalkDirection,
    origin_pipeline: u32,
    origin_sched: Option<NodeId>,
}

impl Visitor for TriggerWalk {
    fn direction(&self) -> WalkDirection {
        self.dir
    }

    fn visit_node(&mut self, topo: &mut Topology, node: NodeId) -> WalkResult {
        let n = topo.node_ref(node)?;
        let id = n.id();
        let same_pipeline = n.pipeline_id() == self.origin_pipeline;
        let same_sched = self.origin_sched.is_some() && topo.sched_of(node) == self.origin_sched;
        // Linked pipelines scheduled together follow the trigger; others do not.
        if !same_pipeline && !same_sched {
            tracing::trace!("trigger: comp {id} belongs to another schedule, skipped");
            return Ok(PathStatus::Continue);
        }

        let cmd = self.cmd;
        let status = topo
            .with_node(node, |n, env| n.trigger(env, cmd))?
            .map_err(|e| PipelineError::component(id, e))?;
        if status == PathStatus::Stop {
            return Ok(PathStatus::Stop);
        }

        topo.react_to_trigger(node, cmd)?;
        topo.descend(node, self)
    }
}

impl Topology {
    /// Sends `cmd` to every node reachable from `host` in its direction.
    ///
    /// While the pipeline is recovering from an xrun, START first re-prepares
    /// the pipeline and STOP is treated as already done.
    pub fn trigger(&mut self, graph: GraphId, host: NodeId, cmd: TriggerCmd) -> Result<(), PipelineError> {
        let g = self.graph_ref(graph)?;
        let host_id = g.id();
        tracing::debug!("pipeline_trigger: {host_id} {cmd:?} from {host}");

        if g.xrun_bytes != 0 && g.status == ComponentState::Paused {
            match cmd {
                TriggerCmd::Start => {
                    tracing::info!("pipeline_trigger: {host_id} in xrun, preparing first");
                    let origin = self.stream_origin(graph)?;
                    self.prepare(graph, origin)?;
                    self.graph_mut(graph)?.xrun_bytes = 0;
                }
                TriggerCmd::Stop => {
                    tracing::debug!("pipeline_trigger: {host_id} already stopped in xrun");
                    return Ok(());
                }
                _ => {}
            }
        }

        let n = self.node_ref(host)?;
        let mut walk = TriggerWalk {
            cmd,
            dir: n.direction().walk(),
            origin_pipeline: n.pipeline_id(),
            origin_sched: self.sched_of(host),
        };
        walk.visit_node(self, host).map(|_| ()).inspect_err(|err| {
            tracing::error!("pipeline_trigger: {host_id} {cmd:?} failed: {err}");
        })
    }

    /// Scheduling component of the pipeline `node` belongs to.
    fn sched_of(&self, node: NodeId) -> Option<NodeId> {
        let graph = self.node(node)?.pipeline()?;
        self.graph(graph)?.sched_comp
    }

    /// Updates the pipeline's task and status after `node` accepted `cmd`.
    ///
    /// Only the scheduling component reacts, or the sink endpoint of a
    /// pipeline whose scheduling component lives in another pipeline.
    fn react_to_trigger(&mut self, node: NodeId, cmd: TriggerCmd) -> Result<(), PipelineError> {
        let Some(graph) = self.node_ref(node)?.pipeline() else {
            return Ok(());
        };
        let g = self.graph_ref(graph)?;
        let sched_here = g.sched_comp.and_then(|s| self.node(s)).and_then(|s| s.pipeline()) == Some(graph);
        if g.sched_comp != Some(node) && (sched_here || g.sink_comp != Some(node)) {
            return Ok(());
        }
        let (host_id, period_us, task) = (g.id(), g.period_us(), g.task);

        match cmd {
            TriggerCmd::Pause | TriggerCmd::Stop | TriggerCmd::Xrun => {
                if let Some(task) = task {
                    self.scheduler.cancel(task);
                }
                self.graph_mut(graph)?.status = ComponentState::Paused;
                tracing::debug!("pipeline {host_id}: task cancelled, PAUSED");
            }
            TriggerCmd::Start | TriggerCmd::Release => {
                let task = match task {
                    Some(task) => task,
                    None => self.ensure_task(graph)?,
                };
                self.scheduler.schedule(task, 0, period_us)?;
                let g = self.graph_mut(graph)?;
                g.xrun_bytes = 0;
                g.status = ComponentState::Active;
                tracing::debug!("pipeline {host_id}: task scheduled every {period_us} us, ACTIVE");
            }
            TriggerCmd::Prepare | TriggerCmd::Reset => {}
        }
        Ok(())
    }
}
