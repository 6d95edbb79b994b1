//! Per-sample format conversion.
//!
//! Processing components work on normalized `f32` samples in `[-1.0, 1.0)`.
//! These functions move single samples between that domain and the packed
//! little-endian layouts of [`FrameFormat`].

use conduit_core::FrameFormat;

const S16_SCALE: f32 = 32_768.0;
const S24_SCALE: f32 = 8_388_608.0;
const S32_SCALE: f32 = 2_147_483_648.0;

/// Reads one sample from the start of `bytes`.
///
/// `bytes` must hold at least `fmt.sample_bytes()` bytes.
#[inline]
pub fn decode(fmt: FrameFormat, bytes: &[u8]) -> f32 {
    match fmt {
        FrameFormat::S16Le => f32::from(i16::from_le_bytes([bytes[0], bytes[1]])) / S16_SCALE,
        FrameFormat::S24In32Le => {
            let raw = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            // Sign-extend the low 24 bits.
            ((raw << 8) >> 8) as f32 / S24_SCALE
        }
        FrameFormat::S32Le => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32 / S32_SCALE,
        FrameFormat::Float => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    }
}

/// Writes one sample to the start of `out`, saturating at full scale.
#[inline]
pub fn encode(fmt: FrameFormat, value: f32, out: &mut [u8]) {
    let v = value.clamp(-1.0, 1.0);
    match fmt {
        FrameFormat::S16Le => {
            let s = (v * S16_SCALE).clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16;
            out[..2].copy_from_slice(&s.to_le_bytes());
        }
        FrameFormat::S24In32Le => {
            let s = (v * S24_SCALE).clamp(-S24_SCALE, S24_SCALE - 1.0) as i32;
            out[..4].copy_from_slice(&s.to_le_bytes());
        }
        FrameFormat::S32Le => {
            // f32 cannot hold i32::MAX exactly; the cast saturates.
            let s = (f64::from(v) * f64::from(S32_SCALE)) as i32;
            out[..4].copy_from_slice(&s.to_le_bytes());
        }
        FrameFormat::Float => out[..4].copy_from_slice(&v.to_le_bytes()),
    }
}

/// Applies `f` to every sample of `data` in place.
pub fn map_in_place(fmt: FrameFormat, data: &mut [u8], mut f: impl FnMut(f32) -> f32) {
    for chunk in data.chunks_exact_mut(fmt.sample_bytes()) {
        let s = decode(fmt, chunk);
        encode(fmt, f(s), chunk);
    }
}

/// Largest absolute sample value in `data`.
pub fn peak(fmt: FrameFormat, data: &[u8]) -> f32 {
    data.chunks_exact(fmt.sample_bytes())
        .map(|chunk| libm::fabsf(decode(fmt, chunk)))
        .fold(0.0, f32::max)
}

/// Converts decibels to linear gain.
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    libm::powf(10.0, db / 20.0)
}

/// Converts linear gain to decibels, flooring silence at -120 dB.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 1e-6 {
        return -120.0;
    }
    20.0 * libm::log10f(linear)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s16_extremes() {
        let mut out = [0u8; 2];
        encode(FrameFormat::S16Le, 1.0, &mut out);
        assert_eq!(i16::from_le_bytes(out), i16::MAX);
        encode(FrameFormat::S16Le, -1.0, &mut out);
        assert_eq!(i16::from_le_bytes(out), i16::MIN);
        assert_eq!(decode(FrameFormat::S16Le, &i16::MIN.to_le_bytes()), -1.0);
    }

    #[test]
    fn test_s24_sign_extension() {
        // 0x00FF_FFFF is -1 in 24 bits; the top byte is ignored.
        let raw = 0x7FFF_FFFFu32.to_le_bytes();
        let v = decode(FrameFormat::S24In32Le, &raw);
        assert!((v + 1.0 / S24_SCALE).abs() < 1e-9);
    }

    #[test]
    fn test_float_clamps() {
        let mut out = [0u8; 4];
        encode(FrameFormat::Float, 3.0, &mut out);
        assert_eq!(f32::from_le_bytes(out), 1.0);
    }

    #[test]
    fn test_map_in_place_halves() {
        let mut data = Vec::new();
        for s in [16_384i16, -16_384, 0] {
            data.extend_from_slice(&s.to_le_bytes());
        }
        map_in_place(FrameFormat::S16Le, &mut data, |s| s * 0.5);
        let samples: Vec<i16> = data.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect();
        assert_eq!(samples, [8_192, -8_192, 0]);
    }

    #[test]
    fn test_peak() {
        let mut data = Vec::new();
        for s in [0.25f32, -0.75, 0.5] {
            data.extend_from_slice(&s.to_le_bytes());
        }
        assert_eq!(peak(FrameFormat::Float, &data), 0.75);
    }

    #[test]
    fn test_db_conversions() {
        assert!((db_to_linear(-6.0) - 0.501).abs() < 1e-3);
        assert!((linear_to_db(0.5) + 6.02).abs() < 1e-2);
        assert_eq!(linear_to_db(0.0), -120.0);
    }
}
