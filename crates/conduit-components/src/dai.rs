//! DAI endpoint: the hardware side of a pipeline.

use conduit_core::{
    Attribute, ComponentDescriptor, ComponentError, ComponentOps, NodeContext, PathStatus, StreamDirection,
    StreamPosition,
};

use crate::dma::{DmaLink, period_bytes, whole_frames};

/// Digital audio interface endpoint.
///
/// The interface runs on its own clock, so a full period must be ready on
/// every copy. A playback source holding less than a period is an underrun;
/// a capture sink with less than a period of space is an overrun. Both are
/// reported to the pipeline and nothing is transferred.
#[derive(Debug, Default)]
pub struct DaiEndpoint {
    link: DmaLink,
    posn: u64,
    wallclock: u64,
}

impl DaiEndpoint {
    /// Creates a DAI endpoint. It takes no parameters.
    pub fn new(_desc: &ComponentDescriptor) -> Result<Self, ComponentError> {
        Ok(Self::default())
    }
}

impl ComponentOps for DaiEndpoint {
    fn prepare(&mut self, ctx: &mut NodeContext<'_>) -> Result<PathStatus, ComponentError> {
        self.posn = 0;
        self.wallclock = 0;
        self.link.prepare(period_bytes(ctx))?;
        Ok(PathStatus::Continue)
    }

    fn copy(&mut self, ctx: &mut NodeContext<'_>) -> Result<PathStatus, ComponentError> {
        let ring = self.link.ring()?;
        let period = period_bytes(ctx);
        let frame_bytes = ctx.params().frame_bytes();

        let moved = match ctx.direction() {
            StreamDirection::Playback => {
                let avail = ctx.source(0).ok_or(ComponentError::NotConnected("source"))?.avail();
                if avail < period {
                    ctx.underrun(0, period);
                    return Ok(PathStatus::Continue);
                }
                let bytes = whole_frames(period.min(ring.free()), frame_bytes);
                match ctx.source(0) {
                    Some(source) if self.link.admits(bytes, period) => self.link.transfer(source, &ring, bytes),
                    _ => 0,
                }
            }
            StreamDirection::Capture => {
                let free = ctx.sink(0).ok_or(ComponentError::NotConnected("sink"))?.free();
                if free < period {
                    ctx.overrun(0, period);
                    return Ok(PathStatus::Continue);
                }
                let bytes = whole_frames(period.min(ring.avail()), frame_bytes);
                match ctx.sink(0) {
                    Some(sink) if self.link.admits(bytes, period) => self.link.transfer(&ring, sink, bytes),
                    _ => 0,
                }
            }
        };

        self.posn += moved as u64;
        self.wallclock += u64::from(ctx.period_us());
        Ok(PathStatus::Continue)
    }

    fn reset(&mut self, _ctx: &mut NodeContext<'_>) -> Result<(), ComponentError> {
        self.posn = 0;
        self.wallclock = 0;
        self.link.reset();
        Ok(())
    }

    fn get_position(&self, posn: &mut StreamPosition) {
        posn.dai_posn = self.posn;
        posn.wallclock = self.wallclock;
    }

    fn set_attribute(&mut self, attr: Attribute) -> Result<(), ComponentError> {
        self.link.set_attribute(attr)
    }
}
