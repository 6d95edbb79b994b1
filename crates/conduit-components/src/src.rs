//! Sample-rate converter.
//!
//! Linear interpolation between neighbouring input frames. The converter
//! keeps the last input frame and the fractional read position across
//! periods, so the output is continuous however the input is chunked.

use conduit_core::{
    ComponentDescriptor, ComponentError, ComponentOps, FrameFormat, NodeContext, PathStatus, StreamDirection,
    StreamParams, period_frames,
};

use crate::dma::reserve_scratch;
use crate::sample::{decode, encode};

/// Converts the stream to the rate given by the `rate` parameter.
///
/// During `configure_params` the converter rewrites the buffers on its far
/// side with the new rate, so everything past it negotiates at that rate.
/// For playback that is the output rate; for capture the input rate.
#[derive(Debug)]
pub struct RateConverter {
    target_rate: u32,
    /// Input frames advanced per output frame.
    step: f64,
    /// Read position relative to `prev`, in input frames.
    phase: f64,
    prev: Vec<f32>,
    input: Vec<u8>,
    output: Vec<u8>,
}

impl RateConverter {
    /// Creates a converter. `rate` is required.
    pub fn new(desc: &ComponentDescriptor) -> Result<Self, ComponentError> {
        let target_rate: u32 = desc.parse_param("rate", 0)?;
        if target_rate == 0 {
            return Err(ComponentError::InvalidParams(format!("src {}: 'rate' is required", desc.id)));
        }
        Ok(Self {
            target_rate,
            step: 1.0,
            phase: 0.0,
            prev: Vec::new(),
            input: Vec::new(),
            output: Vec::new(),
        })
    }

    /// Rate on the far side of the converter.
    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }
}

fn sample_at(fmt: FrameFormat, data: &[u8], frame: usize, channels: usize, ch: usize) -> f32 {
    let width = fmt.sample_bytes();
    decode(fmt, &data[(frame * channels + ch) * width..])
}

impl ComponentOps for RateConverter {
    fn configure(&mut self, ctx: &mut NodeContext<'_>, params: &StreamParams) -> Result<PathStatus, ComponentError> {
        let mut far = *params;
        far.rate = self.target_rate;
        ctx.set_output_rate(self.target_rate);

        match ctx.direction() {
            StreamDirection::Playback => {
                for i in 0..ctx.sink_count() {
                    if let Some(buf) = ctx.sink(i) {
                        buf.set_params(far);
                    }
                }
            }
            StreamDirection::Capture => {
                for i in 0..ctx.source_count() {
                    if let Some(buf) = ctx.source(i) {
                        buf.set_params(far);
                    }
                }
            }
        }
        tracing::debug!(comp = ctx.id(), from = params.rate, to = self.target_rate, "src configured");
        Ok(PathStatus::Continue)
    }

    fn prepare(&mut self, ctx: &mut NodeContext<'_>) -> Result<PathStatus, ComponentError> {
        let source = ctx.source(0).ok_or(ComponentError::NotConnected("source"))?.params();
        let sink = ctx.sink(0).ok_or(ComponentError::NotConnected("sink"))?.params();
        if source.channels != sink.channels {
            return Err(ComponentError::InvalidParams(format!(
                "src {}: channel count changes from {} to {}",
                ctx.id(),
                source.channels,
                sink.channels
            )));
        }
        if source.rate == 0 || sink.rate == 0 || source.frame_bytes() == 0 || sink.frame_bytes() == 0 {
            return Err(ComponentError::InvalidParams(format!("src {}: unconfigured stream", ctx.id())));
        }

        self.step = f64::from(source.rate) / f64::from(sink.rate);
        self.phase = 0.0;
        self.prev.clear();
        self.prev.resize(usize::from(source.channels), 0.0);

        let period_us = ctx.period_us();
        let in_frames = period_frames(source.rate, period_us) as usize + 1;
        let out_frames = period_frames(sink.rate, period_us) as usize + 1;
        reserve_scratch(&mut self.input, in_frames * source.frame_bytes())?;
        reserve_scratch(&mut self.output, out_frames * sink.frame_bytes())?;
        Ok(PathStatus::Continue)
    }

    fn copy(&mut self, ctx: &mut NodeContext<'_>) -> Result<PathStatus, ComponentError> {
        let (Some(source), Some(sink)) = (ctx.source(0), ctx.sink(0)) else {
            return Err(ComponentError::NotConnected("buffer"));
        };
        let in_params = source.params();
        let out_params = sink.params();
        let in_fb = in_params.frame_bytes();
        let out_fb = out_params.frame_bytes();
        let channels = self.prev.len();
        if in_fb == 0 || out_fb == 0 || channels == 0 {
            return Ok(PathStatus::Continue);
        }

        let n = (source.avail() / in_fb).min(self.input.len() / in_fb);
        let out_cap = (sink.free() / out_fb).min(self.output.len() / out_fb);
        if n == 0 || out_cap == 0 {
            return Ok(PathStatus::Continue);
        }
        source.lock().peek(&mut self.input[..n * in_fb]);

        // Frame 0 is `prev`; input frame k sits at position k + 1.
        let mut t = self.phase;
        let mut produced = 0;
        while t < n as f64 && produced < out_cap {
            let i = t as usize;
            let frac = (t - i as f64) as f32;
            for ch in 0..channels {
                let a = if i == 0 {
                    self.prev[ch]
                } else {
                    sample_at(in_params.frame_fmt, &self.input, i - 1, channels, ch)
                };
                let b = sample_at(in_params.frame_fmt, &self.input, i, channels, ch);
                let at = (produced * channels + ch) * out_params.frame_fmt.sample_bytes();
                encode(out_params.frame_fmt, a + (b - a) * frac, &mut self.output[at..]);
            }
            produced += 1;
            t += self.step;
        }

        let consumed = (t as usize).min(n);
        if consumed > 0 {
            for ch in 0..channels {
                self.prev[ch] = sample_at(in_params.frame_fmt, &self.input, consumed - 1, channels, ch);
            }
        }
        self.phase = t - consumed as f64;

        source.consume(consumed * in_fb);
        sink.write(&self.output[..produced * out_fb]);
        Ok(PathStatus::Continue)
    }

    fn reset(&mut self, _ctx: &mut NodeContext<'_>) -> Result<(), ComponentError> {
        self.phase = 0.0;
        self.prev.iter_mut().for_each(|s| *s = 0.0);
        Ok(())
    }
}
