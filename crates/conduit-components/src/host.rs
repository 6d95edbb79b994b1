//! Host endpoint: moves audio between host memory and the pipeline.

use conduit_core::{
    Attribute, ComponentDescriptor, ComponentError, ComponentOps, NodeContext, PathStatus, StreamDirection,
    StreamPosition,
};

use crate::dma::{DmaLink, period_bytes, whole_frames};

/// Host-facing endpoint.
///
/// For playback it copies from the host DMA ring into its sink buffer, for
/// capture from its source buffer into the host ring. Whatever fits is moved;
/// running short is the host's problem, never an xrun. Each period the running
/// byte count is reported to the host as the stream position.
#[derive(Debug, Default)]
pub struct HostEndpoint {
    link: DmaLink,
    posn: u64,
}

impl HostEndpoint {
    /// Creates a host endpoint. It takes no parameters.
    pub fn new(_desc: &ComponentDescriptor) -> Result<Self, ComponentError> {
        Ok(Self::default())
    }

    /// Bytes transferred since prepare.
    pub fn position(&self) -> u64 {
        self.posn
    }
}

impl ComponentOps for HostEndpoint {
    fn prepare(&mut self, ctx: &mut NodeContext<'_>) -> Result<PathStatus, ComponentError> {
        self.posn = 0;
        self.link.prepare(period_bytes(ctx))?;
        Ok(PathStatus::Continue)
    }

    fn copy(&mut self, ctx: &mut NodeContext<'_>) -> Result<PathStatus, ComponentError> {
        let ring = self.link.ring()?;
        let period = period_bytes(ctx);
        let frame_bytes = ctx.params().frame_bytes();

        let moved = match ctx.direction() {
            StreamDirection::Playback => {
                let sink = ctx.sink(0).ok_or(ComponentError::NotConnected("sink"))?;
                let bytes = whole_frames(ring.avail().min(sink.free()).min(period), frame_bytes);
                if !self.link.admits(bytes, period) {
                    return Ok(PathStatus::Continue);
                }
                self.link.transfer(&ring, sink, bytes)
            }
            StreamDirection::Capture => {
                let source = ctx.source(0).ok_or(ComponentError::NotConnected("source"))?;
                let bytes = whole_frames(source.avail().min(ring.free()).min(period), frame_bytes);
                if !self.link.admits(bytes, period) {
                    return Ok(PathStatus::Continue);
                }
                self.link.transfer(source, &ring, bytes)
            }
        };

        self.posn += moved as u64;
        let mut posn = StreamPosition::default();
        self.get_position(&mut posn);
        ctx.report_position(&posn);
        Ok(PathStatus::Continue)
    }

    fn reset(&mut self, _ctx: &mut NodeContext<'_>) -> Result<(), ComponentError> {
        self.posn = 0;
        self.link.reset();
        Ok(())
    }

    fn get_position(&self, posn: &mut StreamPosition) {
        posn.host_posn = self.posn;
    }

    fn set_attribute(&mut self, attr: Attribute) -> Result<(), ComponentError> {
        self.link.set_attribute(attr)
    }
}
