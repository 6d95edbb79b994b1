//! Level detector.

use conduit_core::{ComponentDescriptor, ComponentError, ComponentEvent, ComponentOps, NodeContext, PathStatus};

use crate::dma::reserve_scratch;
use crate::sample::{db_to_linear, peak};

/// Raises [`ComponentEvent::LevelDetected`] when the signal peak first
/// reaches `threshold_db` (default -20 dBFS).
///
/// The detector fires once per stream and re-arms on reset. With a sink
/// connected the audio passes through unchanged; without one it is drained.
#[derive(Debug)]
pub struct LevelDetector {
    threshold: f32,
    armed: bool,
    scratch: Vec<u8>,
}

impl LevelDetector {
    /// Creates a detector from the descriptor's `threshold_db` parameter.
    pub fn new(desc: &ComponentDescriptor) -> Result<Self, ComponentError> {
        let threshold_db: f32 = desc.parse_param("threshold_db", -20.0)?;
        if !threshold_db.is_finite() || threshold_db > 0.0 {
            return Err(ComponentError::InvalidParams(format!(
                "detect {}: threshold_db must be at most 0, got {threshold_db}",
                desc.id
            )));
        }
        Ok(Self {
            threshold: db_to_linear(threshold_db),
            armed: true,
            scratch: Vec::new(),
        })
    }

    /// Whether the next crossing will raise an event.
    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

impl ComponentOps for LevelDetector {
    fn prepare(&mut self, ctx: &mut NodeContext<'_>) -> Result<PathStatus, ComponentError> {
        let source = ctx.source(0).ok_or(ComponentError::NotConnected("source"))?.params();
        self.armed = true;
        reserve_scratch(&mut self.scratch, ctx.frames() as usize * source.frame_bytes())?;
        Ok(PathStatus::Continue)
    }

    fn copy(&mut self, ctx: &mut NodeContext<'_>) -> Result<PathStatus, ComponentError> {
        let source = ctx.source(0).ok_or(ComponentError::NotConnected("source"))?;
        let params = source.params();
        let fb = params.frame_bytes();
        if fb == 0 {
            return Ok(PathStatus::Continue);
        }

        let mut bytes = source.avail().min(self.scratch.len());
        if let Some(sink) = ctx.sink(0) {
            bytes = bytes.min(sink.free());
        }
        let bytes = bytes - bytes % fb;
        if bytes == 0 {
            return Ok(PathStatus::Continue);
        }

        let data = &mut self.scratch[..bytes];
        let n = source.read(data);
        let level = peak(params.frame_fmt, &data[..n]);
        if let Some(sink) = ctx.sink(0) {
            sink.write(&data[..n]);
        }

        if self.armed && level >= self.threshold {
            self.armed = false;
            tracing::info!(comp = ctx.id(), peak = level, "level detected");
            ctx.report_event(ComponentEvent::LevelDetected { peak: level });
        }
        Ok(PathStatus::Continue)
    }

    fn reset(&mut self, _ctx: &mut NodeContext<'_>) -> Result<(), ComponentError> {
        self.armed = true;
        Ok(())
    }
}
