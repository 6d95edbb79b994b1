//! Component nodes and their descriptors.

use std::collections::BTreeMap;
use std::str::FromStr;

use core::fmt;

use crate::component::ops::{Attribute, ComponentOps, NodeContext, PathStatus};
use crate::component::state::{ComponentState, Transition, TriggerCmd, transition};
use crate::error::ComponentError;
use crate::format::{StreamDirection, StreamParams, StreamPosition, WalkDirection};
use crate::report::HostReporter;
use crate::topology::{BufferId, BufferSlot, GraphId};

/// Component kind, used to look up a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentType {
    /// Host-facing DMA endpoint.
    Host,
    /// Hardware audio interface endpoint.
    Dai,
    /// Gain stage.
    Volume,
    /// Sample-rate converter.
    Src,
    /// Sums several sources into one sink.
    Mixer,
    /// Level detector.
    Detect,
    /// Out-of-tree driver.
    Custom(u32),
}

impl ComponentType {
    /// Endpoint classification used to gate cross-pipeline walks.
    pub fn endpoint(self) -> EndpointType {
        match self {
            ComponentType::Host => EndpointType::Host,
            ComponentType::Dai => EndpointType::Dai,
            _ => EndpointType::Node,
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentType::Host => f.write_str("host"),
            ComponentType::Dai => f.write_str("dai"),
            ComponentType::Volume => f.write_str("volume"),
            ComponentType::Src => f.write_str("src"),
            ComponentType::Mixer => f.write_str("mixer"),
            ComponentType::Detect => f.write_str("detect"),
            ComponentType::Custom(n) => write!(f, "custom:{n}"),
        }
    }
}

impl FromStr for ComponentType {
    type Err = ComponentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.to_ascii_lowercase().as_str() {
            "host" => ComponentType::Host,
            "dai" => ComponentType::Dai,
            "volume" => ComponentType::Volume,
            "src" => ComponentType::Src,
            "mixer" => ComponentType::Mixer,
            "detect" => ComponentType::Detect,
            other => {
                let n = other
                    .strip_prefix("custom:")
                    .and_then(|n| n.parse().ok())
                    .ok_or_else(|| ComponentError::InvalidParams(format!("unknown component type '{s}'")))?;
                ComponentType::Custom(n)
            }
        };
        Ok(kind)
    }
}

/// Terminal node classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointType {
    /// Faces the host.
    Host,
    /// Faces the hardware.
    Dai,
    /// Anything else.
    Node,
}

/// Creation parameters for a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentDescriptor {
    /// Host id, unique across components, buffers and pipelines.
    pub id: u32,
    /// Pipeline the component belongs to.
    pub pipeline_id: u32,
    /// Core the component runs on.
    pub core: u32,
    /// Driver to instantiate.
    pub kind: ComponentType,
    /// Driver-specific parameters.
    pub params: BTreeMap<String, String>,
}

impl ComponentDescriptor {
    /// Creates a descriptor on core 0 with no parameters.
    pub fn new(id: u32, pipeline_id: u32, kind: ComponentType) -> Self {
        Self {
            id,
            pipeline_id,
            core: 0,
            kind,
            params: BTreeMap::new(),
        }
    }

    /// Builder: sets the core.
    pub fn with_core(mut self, core: u32) -> Self {
        self.core = core;
        self
    }

    /// Builder: adds a driver parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Raw parameter value.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Parses a parameter, returning `default` when it is absent.
    pub fn parse_param<T: FromStr>(&self, key: &str, default: T) -> Result<T, ComponentError> {
        match self.param(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|_| {
                ComponentError::InvalidParams(format!("{} {}: bad value '{raw}' for '{key}'", self.kind, self.id))
            }),
        }
    }
}

/// Graph-owned per-node bookkeeping, visible to components through [`NodeContext`].
#[derive(Debug, Clone)]
pub(crate) struct NodeRuntime {
    pub(crate) id: u32,
    pub(crate) pipeline_id: u32,
    pub(crate) core: u32,
    pub(crate) kind: ComponentType,
    pub(crate) state: ComponentState,
    pub(crate) direction: StreamDirection,
    pub(crate) params: StreamParams,
    pub(crate) frames: u32,
    pub(crate) output_rate: u32,
    pub(crate) min_source_bytes: usize,
    pub(crate) min_sink_bytes: usize,
    pub(crate) period_us: u32,
    pub(crate) pending_xrun: Option<i32>,
}

/// Shared state a node hook needs besides the node itself.
pub(crate) struct NodeEnv<'a> {
    pub(crate) buffers: &'a [Option<BufferSlot>],
    pub(crate) reporter: &'a dyn HostReporter,
}

/// A processing unit in the graph.
pub struct ComponentNode {
    pub(crate) info: NodeRuntime,
    pub(crate) ops: Box<dyn ComponentOps>,
    /// Buffers this node reads from.
    pub(crate) sources: Vec<BufferId>,
    /// Buffers this node writes to.
    pub(crate) sinks: Vec<BufferId>,
    /// Owning pipeline, set when the pipeline is completed.
    pub(crate) pipeline: Option<GraphId>,
}

impl ComponentNode {
    pub(crate) fn new(desc: &ComponentDescriptor, ops: Box<dyn ComponentOps>) -> Self {
        Self {
            info: NodeRuntime {
                id: desc.id,
                pipeline_id: desc.pipeline_id,
                core: desc.core,
                kind: desc.kind,
                state: ComponentState::Init,
                direction: StreamDirection::Playback,
                params: StreamParams::default(),
                frames: 0,
                output_rate: 0,
                min_source_bytes: 0,
                min_sink_bytes: 0,
                period_us: 0,
                pending_xrun: None,
            },
            ops,
            sources: Vec::new(),
            sinks: Vec::new(),
            pipeline: None,
        }
    }

    /// Host id.
    pub fn id(&self) -> u32 {
        self.info.id
    }

    /// Pipeline id from the descriptor.
    pub fn pipeline_id(&self) -> u32 {
        self.info.pipeline_id
    }

    /// Core affinity.
    pub fn core(&self) -> u32 {
        self.info.core
    }

    /// Driver kind.
    pub fn kind(&self) -> ComponentType {
        self.info.kind
    }

    /// Endpoint classification.
    pub fn endpoint(&self) -> EndpointType {
        self.info.kind.endpoint()
    }

    /// Lifecycle state.
    pub fn state(&self) -> ComponentState {
        self.info.state
    }

    /// Stream direction.
    pub fn direction(&self) -> StreamDirection {
        self.info.direction
    }

    /// Last applied parameters.
    pub fn params(&self) -> &StreamParams {
        &self.info.params
    }

    /// Frames per period.
    pub fn frames(&self) -> u32 {
        self.info.frames
    }

    /// Owning pipeline, once completed.
    pub fn pipeline(&self) -> Option<GraphId> {
        self.pipeline
    }

    /// Buffers this node reads from.
    pub fn sources(&self) -> &[BufferId] {
        &self.sources
    }

    /// Buffers this node writes to.
    pub fn sinks(&self) -> &[BufferId] {
        &self.sinks
    }

    /// The buffer list a walk in `dir` follows.
    pub fn buffers(&self, dir: WalkDirection) -> &[BufferId] {
        match dir {
            WalkDirection::Downstream => &self.sinks,
            WalkDirection::Upstream => &self.sources,
        }
    }

    pub(crate) fn buffers_mut(&mut self, dir: WalkDirection) -> &mut Vec<BufferId> {
        match dir {
            WalkDirection::Downstream => &mut self.sinks,
            WalkDirection::Upstream => &mut self.sources,
        }
    }

    fn split<'a>(&'a mut self, env: &'a NodeEnv<'a>) -> (&'a mut dyn ComponentOps, NodeContext<'a>) {
        let ctx = NodeContext {
            info: &mut self.info,
            sources: &self.sources,
            sinks: &self.sinks,
            buffers: env.buffers,
            reporter: env.reporter,
        };
        (self.ops.as_mut(), ctx)
    }

    /// Validates `cmd`, runs the trigger hook and applies the new state.
    ///
    /// Returns [`PathStatus::Stop`] when the node is already in the target state.
    pub(crate) fn trigger(&mut self, env: &NodeEnv<'_>, cmd: TriggerCmd) -> Result<PathStatus, ComponentError> {
        let next = match transition(self.info.state, cmd)? {
            Transition::AlreadySet => return Ok(PathStatus::Stop),
            Transition::To(next) => next,
        };
        let (ops, mut ctx) = self.split(env);
        ops.trigger(&mut ctx, cmd)?;
        tracing::trace!(comp = self.info.id, from = %self.info.state, to = %next, "trigger {cmd:?}");
        self.info.state = next;
        Ok(PathStatus::Continue)
    }

    pub(crate) fn prepare(&mut self, env: &NodeEnv<'_>) -> Result<PathStatus, ComponentError> {
        let next = match transition(self.info.state, TriggerCmd::Prepare)? {
            Transition::AlreadySet => return Ok(PathStatus::Stop),
            Transition::To(next) => next,
        };
        let (ops, mut ctx) = self.split(env);
        let status = ops.prepare(&mut ctx)?;
        self.info.state = next;
        Ok(status)
    }

    /// Runs the reset hook and returns the node to READY.
    pub(crate) fn reset(&mut self, env: &NodeEnv<'_>) -> Result<PathStatus, ComponentError> {
        let (ops, mut ctx) = self.split(env);
        ops.reset(&mut ctx)?;
        transition(self.info.state, TriggerCmd::Reset)?;
        self.info.state = ComponentState::Ready;
        self.info.pending_xrun = None;
        Ok(PathStatus::Continue)
    }

    pub(crate) fn configure(&mut self, env: &NodeEnv<'_>, params: &StreamParams) -> Result<PathStatus, ComponentError> {
        let (ops, mut ctx) = self.split(env);
        ops.configure(&mut ctx, params)
    }

    pub(crate) fn copy(&mut self, env: &NodeEnv<'_>) -> Result<PathStatus, ComponentError> {
        let (ops, mut ctx) = self.split(env);
        ops.copy(&mut ctx)
    }

    pub(crate) fn position(&self, posn: &mut StreamPosition) {
        self.ops.get_position(posn);
    }

    pub(crate) fn set_attribute(&mut self, attr: Attribute) -> Result<(), ComponentError> {
        self.ops.set_attribute(attr)
    }

    pub(crate) fn free(&mut self) {
        self.ops.free();
    }
}

impl fmt::Debug for ComponentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentNode")
            .field("id", &self.info.id)
            .field("kind", &self.info.kind)
            .field("state", &self.info.state)
            .field("sources", &self.sources)
            .field("sinks", &self.sinks)
            .finish_non_exhaustive()
    }
}
