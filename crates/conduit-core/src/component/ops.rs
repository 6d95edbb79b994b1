//! The component operation table and the context a component sees.

use crate::component::node::NodeRuntime;
use crate::component::state::{ComponentState, TriggerCmd};
use crate::error::ComponentError;
use crate::format::{StreamDirection, StreamParams, StreamPosition};
use crate::report::{ComponentEvent, HostReporter};
use crate::shared::SharedBuffer;
use crate::topology::{BufferId, BufferSlot};

/// Whether a graph walk continues past a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStatus {
    /// Descend into the node's neighbours.
    Continue,
    /// Do not descend past this node. Not an error.
    Stop,
}

/// How a component paces its copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyType {
    /// Copy whatever is available each period.
    #[default]
    Normal,
    /// Wait for a full period of data or space before copying.
    Blocking,
    /// Copy once, then stop.
    OneShot,
}

/// Runtime attribute pushed into a component.
#[derive(Debug, Clone)]
pub enum Attribute {
    /// Change the copy pacing.
    CopyType(CopyType),
    /// Attach the external DMA ring of an endpoint.
    DmaBuffer(SharedBuffer),
}

impl Attribute {
    /// Short name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Attribute::CopyType(_) => "copy_type",
            Attribute::DmaBuffer(_) => "dma_buffer",
        }
    }
}

/// Operations every component kind implements.
///
/// The graph owns the lifecycle state: a hook is called only after the
/// requested transition has been validated, and the new state is applied only
/// if the hook succeeds. Hooks that have nothing to do keep the defaults.
pub trait ComponentOps: Send {
    /// Applies negotiated stream parameters.
    ///
    /// The parameters were already written to the node's buffers in the walk
    /// direction. A component that changes the format downstream (a rate
    /// converter, for example) rewrites its sink buffers here.
    fn configure(&mut self, ctx: &mut NodeContext<'_>, params: &StreamParams) -> Result<PathStatus, ComponentError> {
        let _ = (ctx, params);
        Ok(PathStatus::Continue)
    }

    /// Allocates per-stream state before the first copy.
    fn prepare(&mut self, ctx: &mut NodeContext<'_>) -> Result<PathStatus, ComponentError> {
        let _ = ctx;
        Ok(PathStatus::Continue)
    }

    /// Reacts to a validated trigger command.
    fn trigger(&mut self, ctx: &mut NodeContext<'_>, cmd: TriggerCmd) -> Result<(), ComponentError> {
        let _ = (ctx, cmd);
        Ok(())
    }

    /// Moves one period of data from the source buffers to the sink buffers.
    fn copy(&mut self, ctx: &mut NodeContext<'_>) -> Result<PathStatus, ComponentError>;

    /// Drops per-stream state. Must be safe to call repeatedly.
    fn reset(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), ComponentError> {
        let _ = ctx;
        Ok(())
    }

    /// Releases everything before the node is destroyed.
    fn free(&mut self) {}

    /// Fills the fields of `posn` this component knows about.
    fn get_position(&self, posn: &mut StreamPosition) {
        let _ = posn;
    }

    /// Applies a runtime attribute.
    fn set_attribute(&mut self, attr: Attribute) -> Result<(), ComponentError> {
        Err(ComponentError::UnsupportedAttribute(attr.name()))
    }
}

/// How many frames a copy can move between the first source and first sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyLimits {
    /// Frames that fit on both sides.
    pub frames: u32,
    /// Bytes those frames occupy in the source.
    pub source_bytes: usize,
    /// Bytes those frames occupy in the sink.
    pub sink_bytes: usize,
    /// Bytes per source frame.
    pub source_frame_bytes: usize,
    /// Bytes per sink frame.
    pub sink_frame_bytes: usize,
}

/// Everything a component may touch while one of its hooks runs.
pub struct NodeContext<'a> {
    pub(crate) info: &'a mut NodeRuntime,
    pub(crate) sources: &'a [BufferId],
    pub(crate) sinks: &'a [BufferId],
    pub(crate) buffers: &'a [Option<BufferSlot>],
    pub(crate) reporter: &'a dyn HostReporter,
}

impl NodeContext<'_> {
    /// Host id of the component.
    pub fn id(&self) -> u32 {
        self.info.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ComponentState {
        self.info.state
    }

    /// Stream direction set by the last `configure_params`.
    pub fn direction(&self) -> StreamDirection {
        self.info.direction
    }

    /// Parameters set by the last `configure_params`.
    pub fn params(&self) -> &StreamParams {
        &self.info.params
    }

    /// Frames per period.
    pub fn frames(&self) -> u32 {
        self.info.frames
    }

    /// Pipeline period in microseconds, or 0 before completion.
    pub fn period_us(&self) -> u32 {
        self.info.period_us
    }

    /// Output rate override, or 0 when the stream rate applies.
    pub fn output_rate(&self) -> u32 {
        self.info.output_rate
    }

    /// Sets the output rate used to derive the frame count.
    pub fn set_output_rate(&mut self, rate: u32) {
        self.info.output_rate = rate;
    }

    /// Bytes the first source must hold before a copy is worthwhile.
    pub fn set_min_source_bytes(&mut self, bytes: usize) {
        self.info.min_source_bytes = bytes;
    }

    /// Bytes the first sink must have free before a copy is worthwhile.
    pub fn set_min_sink_bytes(&mut self, bytes: usize) {
        self.info.min_sink_bytes = bytes;
    }

    /// Number of source buffers.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Number of sink buffers.
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// The `index`th buffer this node reads from.
    pub fn source(&self, index: usize) -> Option<&SharedBuffer> {
        self.resolve(self.sources.get(index).copied())
    }

    /// The `index`th buffer this node writes to.
    pub fn sink(&self, index: usize) -> Option<&SharedBuffer> {
        self.resolve(self.sinks.get(index).copied())
    }

    fn resolve(&self, id: Option<BufferId>) -> Option<&SharedBuffer> {
        let id = id?;
        self.buffers
            .get(id.index() as usize)
            .and_then(Option::as_ref)
            .map(|slot| &slot.buffer)
    }

    /// Frames that can move from the first source to the first sink.
    pub fn copy_limits(&self) -> Result<CopyLimits, ComponentError> {
        let source = self.source(0).ok_or(ComponentError::NotConnected("source"))?;
        let sink = self.sink(0).ok_or(ComponentError::NotConnected("sink"))?;

        let (avail, source_frame_bytes) = {
            let buf = source.lock();
            (buf.avail(), buf.params().frame_bytes())
        };
        let (free, sink_frame_bytes) = {
            let buf = sink.lock();
            (buf.free(), buf.params().frame_bytes())
        };
        if source_frame_bytes == 0 || sink_frame_bytes == 0 {
            return Err(ComponentError::InvalidParams("frame size is zero".into()));
        }

        let frames = (avail / source_frame_bytes).min(free / sink_frame_bytes);
        Ok(CopyLimits {
            frames: frames as u32,
            source_bytes: frames * source_frame_bytes,
            sink_bytes: frames * sink_frame_bytes,
            source_frame_bytes,
            sink_frame_bytes,
        })
    }

    /// Whether the first source and first sink meet the minimum thresholds.
    pub fn is_copy_ready(&self) -> bool {
        if let Some(source) = self.source(0) {
            if source.avail() < self.info.min_source_bytes {
                return false;
            }
        }
        if let Some(sink) = self.sink(0) {
            if sink.free() < self.info.min_sink_bytes {
                return false;
            }
        }
        true
    }

    /// Reports that source `index` cannot supply `copy_bytes`.
    ///
    /// Records `avail - copy_bytes`; the graph raises the xrun once the
    /// copy walk returns.
    pub fn underrun(&mut self, index: usize, copy_bytes: usize) {
        let avail = self.source(index).map_or(0, SharedBuffer::avail);
        let delta = clamp_delta(avail as i64 - copy_bytes as i64);
        tracing::warn!(comp = self.info.id, avail, copy_bytes, "underrun");
        self.record_xrun(delta);
    }

    /// Reports that sink `index` cannot accept `copy_bytes`.
    ///
    /// Records `copy_bytes - free`.
    pub fn overrun(&mut self, index: usize, copy_bytes: usize) {
        let free = self.sink(index).map_or(0, SharedBuffer::free);
        let delta = clamp_delta(copy_bytes as i64 - free as i64);
        tracing::warn!(comp = self.info.id, free, copy_bytes, "overrun");
        self.record_xrun(delta);
    }

    fn record_xrun(&mut self, delta: i32) {
        if delta != 0 && self.info.pending_xrun.is_none() {
            self.info.pending_xrun = Some(delta);
        }
    }

    /// Sends a position update to the host.
    pub fn report_position(&self, posn: &StreamPosition) {
        self.reporter.report_position(self.info.id, posn);
    }

    /// Sends a component event to the host.
    pub fn report_event(&self, event: ComponentEvent) {
        self.reporter.report_event(self.info.id, event);
    }
}

fn clamp_delta(delta: i64) -> i32 {
    delta.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}
