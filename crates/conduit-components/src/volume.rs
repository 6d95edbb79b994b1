//! Gain stage.

use conduit_core::{ComponentDescriptor, ComponentError, ComponentOps, NodeContext, PathStatus, StreamParams};

use crate::dma::reserve_scratch;
use crate::sample::{db_to_linear, map_in_place};

/// Applies a fixed gain to every sample passing through.
///
/// Parameter `gain_db` (default 0). Source and sink must carry the same
/// format; the gain is applied in place on a scratch copy of the period.
#[derive(Debug)]
pub struct Volume {
    gain: f32,
    gain_db: f32,
    scratch: Vec<u8>,
}

impl Volume {
    /// Creates a gain stage from the descriptor's `gain_db` parameter.
    pub fn new(desc: &ComponentDescriptor) -> Result<Self, ComponentError> {
        let gain_db: f32 = desc.parse_param("gain_db", 0.0)?;
        if !gain_db.is_finite() {
            return Err(ComponentError::InvalidParams(format!("gain_db must be finite, got {gain_db}")));
        }
        Ok(Self {
            gain: db_to_linear(gain_db),
            gain_db,
            scratch: Vec::new(),
        })
    }

    /// Gain in decibels.
    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    /// Linear gain factor.
    pub fn gain(&self) -> f32 {
        self.gain
    }
}

impl ComponentOps for Volume {
    fn configure(&mut self, ctx: &mut NodeContext<'_>, params: &StreamParams) -> Result<PathStatus, ComponentError> {
        tracing::debug!(comp = ctx.id(), gain_db = self.gain_db, rate = params.rate, "volume configured");
        Ok(PathStatus::Continue)
    }

    fn prepare(&mut self, ctx: &mut NodeContext<'_>) -> Result<PathStatus, ComponentError> {
        let source = ctx.source(0).ok_or(ComponentError::NotConnected("source"))?.params();
        let sink = ctx.sink(0).ok_or(ComponentError::NotConnected("sink"))?.params();
        if source.frame_fmt != sink.frame_fmt || source.channels != sink.channels {
            return Err(ComponentError::InvalidParams(format!(
                "volume {}: source {:?}x{} does not match sink {:?}x{}",
                ctx.id(),
                source.frame_fmt,
                source.channels,
                sink.frame_fmt,
                sink.channels
            )));
        }
        reserve_scratch(&mut self.scratch, ctx.frames() as usize * source.frame_bytes())?;
        Ok(PathStatus::Continue)
    }

    fn copy(&mut self, ctx: &mut NodeContext<'_>) -> Result<PathStatus, ComponentError> {
        let limits = ctx.copy_limits()?;
        let frames = limits.frames.min(ctx.frames()) as usize;
        let bytes = (frames * limits.source_frame_bytes).min(self.scratch.len());
        if bytes == 0 {
            return Ok(PathStatus::Continue);
        }

        let (Some(source), Some(sink)) = (ctx.source(0), ctx.sink(0)) else {
            return Err(ComponentError::NotConnected("buffer"));
        };
        let fmt = source.params().frame_fmt;
        let data = &mut self.scratch[..bytes];
        let n = source.read(data);
        let gain = self.gain;
        map_in_place(fmt, &mut data[..n], |s| s * gain);
        sink.write(&data[..n]);
        Ok(PathStatus::Continue)
    }

    fn free(&mut self) {
        self.scratch = Vec::new();
    }
}
