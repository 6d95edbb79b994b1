//! Stream format, direction and position types.
//!
//! [`StreamParams`] is the negotiated format carried by every buffer and
//! rewritten hop by hop during `configure_params`. [`StreamPosition`] is the
//! position/timestamp record reported to the host.

use core::fmt;

/// Maximum number of channels a stream may carry.
pub const MAX_CHANNELS: usize = 8;

/// Direction of a stream relative to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StreamDirection {
    /// Host to hardware.
    #[default]
    Playback,
    /// Hardware to host.
    Capture,
}

impl StreamDirection {
    /// Walk direction that follows the data flow of this stream.
    pub fn walk(self) -> WalkDirection {
        match self {
            StreamDirection::Playback => WalkDirection::Downstream,
            StreamDirection::Capture => WalkDirection::Upstream,
        }
    }
}

impl fmt::Display for StreamDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamDirection::Playback => f.write_str("playback"),
            StreamDirection::Capture => f.write_str("capture"),
        }
    }
}

/// Direction of a graph walk.
///
/// Downstream follows a node's sink buffers to the nodes reading them;
/// upstream follows its source buffers to the nodes writing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalkDirection {
    /// Source to sink.
    Downstream,
    /// Sink to source.
    Upstream,
}

impl WalkDirection {
    /// The opposite direction.
    pub fn reverse(self) -> Self {
        match self {
            WalkDirection::Downstream => WalkDirection::Upstream,
            WalkDirection::Upstream => WalkDirection::Downstream,
        }
    }
}

/// Sample container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrameFormat {
    /// Signed 16-bit little endian.
    #[default]
    S16Le,
    /// Signed 24-bit little endian in a 32-bit container.
    S24In32Le,
    /// Signed 32-bit little endian.
    S32Le,
    /// IEEE-754 32-bit float.
    Float,
}

impl FrameFormat {
    /// Bytes occupied by one sample.
    pub fn sample_bytes(self) -> usize {
        match self {
            FrameFormat::S16Le => 2,
            FrameFormat::S24In32Le | FrameFormat::S32Le | FrameFormat::Float => 4,
        }
    }

    /// Parses the short names used in topology files (`s16le`, `s24le`, `s32le`, `float`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "s16le" | "s16" => Some(FrameFormat::S16Le),
            "s24le" | "s24" | "s24_4le" => Some(FrameFormat::S24In32Le),
            "s32le" | "s32" => Some(FrameFormat::S32Le),
            "float" | "f32" => Some(FrameFormat::Float),
            _ => None,
        }
    }
}

/// Negotiated stream parameters.
///
/// Carried as metadata by every buffer and passed from node to node during
/// `configure_params`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    /// Stream direction.
    pub direction: StreamDirection,
    /// Sample format.
    pub frame_fmt: FrameFormat,
    /// Frames per second.
    pub rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
    /// Channel map, one position code per channel.
    pub chmap: [u8; MAX_CHANNELS],
}

impl Default for StreamParams {
    fn default() -> Self {
        Self {
            direction: StreamDirection::Playback,
            frame_fmt: FrameFormat::S16Le,
            rate: 48_000,
            channels: 2,
            chmap: [0, 1, 2, 3, 4, 5, 6, 7],
        }
    }
}

impl StreamParams {
    /// Creates parameters with an identity channel map.
    pub fn new(direction: StreamDirection, frame_fmt: FrameFormat, rate: u32, channels: u16) -> Self {
        Self {
            direction,
            frame_fmt,
            rate,
            channels,
            ..Self::default()
        }
    }

    /// Bytes per interleaved frame. Zero when the format is unset.
    pub fn frame_bytes(&self) -> usize {
        self.frame_fmt.sample_bytes() * usize::from(self.channels)
    }

    /// Copies the format fields from `other`, keeping this direction.
    pub fn apply_format(&mut self, other: &StreamParams) {
        self.frame_fmt = other.frame_fmt;
        self.rate = other.rate;
        self.channels = other.channels;
        self.chmap = other.chmap;
    }
}

/// Frames processed per period at `rate` for a period of `period_us`, rounded up.
pub fn period_frames(rate: u32, period_us: u32) -> u32 {
    (u64::from(rate) * u64::from(period_us)).div_ceil(1_000_000) as u32
}

/// Position and timestamp record reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamPosition {
    /// Bytes moved across the host endpoint.
    pub host_posn: u64,
    /// Bytes moved across the DAI endpoint.
    pub dai_posn: u64,
    /// Bytes moved by the reporting component.
    pub comp_posn: u64,
    /// Wall clock of the DAI sample, in scheduler ticks.
    pub wallclock: u64,
    /// Timestamp resolution in nanoseconds (one pipeline period).
    pub timestamp_ns: u64,
    /// Id of the component that detected an xrun.
    pub xrun_comp_id: u32,
    /// Byte delta of the xrun. Negative for underruns.
    pub xrun_size: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_frames_rounds_up() {
        assert_eq!(period_frames(48_000, 1000), 48);
        assert_eq!(period_frames(44_100, 1000), 45);
        assert_eq!(period_frames(16_000, 333), 6);
        assert_eq!(period_frames(0, 1000), 0);
    }

    #[test]
    fn test_frame_bytes() {
        let params = StreamParams::new(StreamDirection::Capture, FrameFormat::S24In32Le, 48_000, 2);
        assert_eq!(params.frame_bytes(), 8);
        let mono = StreamParams::new(StreamDirection::Playback, FrameFormat::S16Le, 8_000, 1);
        assert_eq!(mono.frame_bytes(), 2);
    }

    #[test]
    fn test_apply_format_keeps_direction() {
        let mut params = StreamParams::new(StreamDirection::Capture, FrameFormat::S16Le, 48_000, 2);
        let other = StreamParams::new(StreamDirection::Playback, FrameFormat::Float, 16_000, 1);
        params.apply_format(&other);
        assert_eq!(params.direction, StreamDirection::Capture);
        assert_eq!(params.rate, 16_000);
        assert_eq!(params.frame_fmt, FrameFormat::Float);
    }

    #[test]
    fn test_format_names() {
        assert_eq!(FrameFormat::from_name("S16LE"), Some(FrameFormat::S16Le));
        assert_eq!(FrameFormat::from_name("float"), Some(FrameFormat::Float));
        assert_eq!(FrameFormat::from_name("u8"), None);
    }

    #[test]
    fn test_walk_follows_stream() {
        assert_eq!(StreamDirection::Playback.walk(), WalkDirection::Downstream);
        assert_eq!(StreamDirection::Capture.walk(), WalkDirection::Upstream);
        assert_eq!(WalkDirection::Upstream.reverse(), WalkDirection::Downstream);
    }
}
