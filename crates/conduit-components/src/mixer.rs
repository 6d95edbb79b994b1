//! Mixer: sums every live source into one sink.

use conduit_core::{ComponentDescriptor, ComponentError, ComponentOps, NodeContext, PathStatus};

use crate::dma::reserve_scratch;
use crate::sample::{decode, encode};

/// Sums all sources holding data into the first sink.
///
/// A source with nothing buffered is treated as silent and left alone, so
/// one stalled input does not hold back the rest. The frame count is the
/// smallest of the live sources, the sink space and one period.
#[derive(Debug, Default)]
pub struct Mixer {
    acc: Vec<f32>,
    scratch: Vec<u8>,
}

impl Mixer {
    /// Creates a mixer. It takes no parameters.
    pub fn new(_desc: &ComponentDescriptor) -> Result<Self, ComponentError> {
        Ok(Self::default())
    }
}

impl ComponentOps for Mixer {
    fn prepare(&mut self, ctx: &mut NodeContext<'_>) -> Result<PathStatus, ComponentError> {
        let sink = ctx.sink(0).ok_or(ComponentError::NotConnected("sink"))?.params();
        for i in 0..ctx.source_count() {
            let Some(source) = ctx.source(i) else { continue };
            let params = source.params();
            if params.frame_fmt != sink.frame_fmt || params.channels != sink.channels {
                return Err(ComponentError::InvalidParams(format!(
                    "mixer {}: source {} format differs from sink",
                    ctx.id(),
                    source.id()
                )));
            }
        }

        let samples = ctx.frames() as usize * usize::from(sink.channels);
        self.acc.clear();
        self.acc
            .try_reserve_exact(samples)
            .map_err(|_| ComponentError::Driver(format!("cannot allocate {samples} mix samples")))?;
        self.acc.resize(samples, 0.0);
        reserve_scratch(&mut self.scratch, ctx.frames() as usize * sink.frame_bytes())?;
        Ok(PathStatus::Continue)
    }

    fn copy(&mut self, ctx: &mut NodeContext<'_>) -> Result<PathStatus, ComponentError> {
        let sink = ctx.sink(0).ok_or(ComponentError::NotConnected("sink"))?;
        let params = sink.params();
        let fb = params.frame_bytes();
        if fb == 0 {
            return Ok(PathStatus::Continue);
        }

        let mut frames = (sink.free() / fb).min(ctx.frames() as usize).min(self.scratch.len() / fb);
        let mut live = 0;
        for i in 0..ctx.source_count() {
            let avail = ctx.source(i).map_or(0, |s| s.avail());
            if avail > 0 {
                frames = frames.min(avail / fb);
                live += 1;
            }
        }
        if live == 0 || frames == 0 {
            return Ok(PathStatus::Continue);
        }

        let bytes = frames * fb;
        let width = params.frame_fmt.sample_bytes();
        let acc = &mut self.acc[..bytes / width];
        acc.iter_mut().for_each(|s| *s = 0.0);

        for i in 0..ctx.source_count() {
            let Some(source) = ctx.source(i) else { continue };
            if source.avail() == 0 {
                continue;
            }
            let n = source.read(&mut self.scratch[..bytes]);
            for (s, chunk) in acc.iter_mut().zip(self.scratch[..n].chunks_exact(width)) {
                *s += decode(params.frame_fmt, chunk);
            }
        }

        for (s, out) in acc.iter().zip(self.scratch[..bytes].chunks_exact_mut(width)) {
            encode(params.frame_fmt, *s, out);
        }
        sink.write(&self.scratch[..bytes]);
        tracing::trace!(comp = ctx.id(), live, frames, "mixed");
        Ok(PathStatus::Continue)
    }
}
