//! Pipeline records.
//!
//! A [`PipelineGraph`] is one scheduling domain: the nodes sharing a
//! pipeline id, driven by one recurring task owned by its scheduling
//! component. The graph operations themselves live on
//! [`Topology`](crate::Topology), which owns the node and buffer arenas that
//! linked pipelines share.

use crate::component::ComponentState;
use crate::format::StreamPosition;
use crate::schedule::{TaskId, TaskKind};
use crate::topology::NodeId;

/// Creation parameters for a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineDescriptor {
    /// Host id, unique across components, buffers and pipelines.
    pub id: u32,
    /// Pipeline id shared by the member components.
    pub pipeline_id: u32,
    /// Host id of the scheduling component.
    pub sched_id: u32,
    /// Core the pipeline runs on.
    pub core: u32,
    /// Copy period in microseconds.
    pub period_us: u32,
    /// Task priority; lower runs first.
    pub priority: u32,
    /// Timer-driven rather than DMA-driven.
    pub timer_driven: bool,
}

impl PipelineDescriptor {
    /// Creates a timer-driven descriptor on core 0 with a 1 ms period.
    pub fn new(id: u32, pipeline_id: u32, sched_id: u32) -> Self {
        Self {
            id,
            pipeline_id,
            sched_id,
            core: 0,
            period_us: 1000,
            priority: 0,
            timer_driven: true,
        }
    }

    /// Builder: sets the period.
    pub fn with_period(mut self, period_us: u32) -> Self {
        self.period_us = period_us;
        self
    }

    /// Builder: sets the priority.
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Builder: sets the core.
    pub fn with_core(mut self, core: u32) -> Self {
        self.core = core;
        self
    }

    /// Task kind implied by `timer_driven`.
    pub fn task_kind(&self) -> TaskKind {
        if self.timer_driven { TaskKind::Timer } else { TaskKind::Dma }
    }
}

/// Runtime record of one pipeline.
#[derive(Debug, Clone)]
pub struct PipelineGraph {
    pub(crate) desc: PipelineDescriptor,
    pub(crate) status: ComponentState,
    pub(crate) sched_comp: Option<NodeId>,
    pub(crate) source_comp: Option<NodeId>,
    pub(crate) sink_comp: Option<NodeId>,
    pub(crate) xrun_bytes: i32,
    pub(crate) task: Option<TaskId>,
    pub(crate) posn_offset: usize,
    pub(crate) recovery_failures: u32,
}

impl PipelineGraph {
    pub(crate) fn new(desc: PipelineDescriptor, sched_comp: NodeId) -> Self {
        Self {
            desc,
            status: ComponentState::Init,
            sched_comp: Some(sched_comp),
            source_comp: None,
            sink_comp: None,
            xrun_bytes: 0,
            task: None,
            posn_offset: desc.pipeline_id as usize * size_of::<StreamPosition>(),
            recovery_failures: 0,
        }
    }

    /// Host id.
    pub fn id(&self) -> u32 {
        self.desc.id
    }

    /// Pipeline id.
    pub fn pipeline_id(&self) -> u32 {
        self.desc.pipeline_id
    }

    /// The descriptor the pipeline was created from.
    pub fn descriptor(&self) -> &PipelineDescriptor {
        &self.desc
    }

    /// Period in microseconds.
    pub fn period_us(&self) -> u32 {
        self.desc.period_us
    }

    /// Aggregate status.
    pub fn status(&self) -> ComponentState {
        self.status
    }

    /// The node that owns the recurring task.
    pub fn sched_comp(&self) -> Option<NodeId> {
        self.sched_comp
    }

    /// Upstream endpoint, once completed.
    pub fn source_comp(&self) -> Option<NodeId> {
        self.source_comp
    }

    /// Downstream endpoint, once completed.
    pub fn sink_comp(&self) -> Option<NodeId> {
        self.sink_comp
    }

    /// Pending xrun byte delta; non-zero while recovering.
    pub fn xrun_bytes(&self) -> i32 {
        self.xrun_bytes
    }

    /// The recurring task, once created.
    pub fn task(&self) -> Option<TaskId> {
        self.task
    }

    /// Offset of this pipeline's slot in the host position mailbox.
    pub fn posn_offset(&self) -> usize {
        self.posn_offset
    }

    /// Whether the pipeline is streaming or paused mid-stream.
    pub fn is_running(&self) -> bool {
        matches!(self.status, ComponentState::Active | ComponentState::Paused)
    }
}
