//! DMA ring attachment shared by the host and DAI endpoints.
//!
//! An endpoint moves data between a pipeline buffer and an external ring
//! (host memory or the DAI FIFO) attached at runtime through
//! [`Attribute::DmaBuffer`]. Transfers go through a scratch area sized at
//! prepare, so the copy path never allocates.

use conduit_core::{Attribute, ComponentError, CopyType, NodeContext, SharedBuffer};

/// Bytes in one period of the node's negotiated format.
pub(crate) fn period_bytes(ctx: &NodeContext<'_>) -> usize {
    ctx.frames() as usize * ctx.params().frame_bytes()
}

/// Rounds `bytes` down to whole frames.
pub(crate) fn whole_frames(bytes: usize, frame_bytes: usize) -> usize {
    if frame_bytes == 0 {
        return 0;
    }
    bytes - bytes % frame_bytes
}

/// Reserves `scratch` to exactly `bytes`, reporting allocation failure.
pub(crate) fn reserve_scratch(scratch: &mut Vec<u8>, bytes: usize) -> Result<(), ComponentError> {
    scratch.clear();
    scratch
        .try_reserve_exact(bytes)
        .map_err(|_| ComponentError::Driver(format!("cannot allocate {bytes} scratch bytes")))?;
    scratch.resize(bytes, 0);
    Ok(())
}

#[derive(Debug, Default)]
pub(crate) struct DmaLink {
    ring: Option<SharedBuffer>,
    scratch: Vec<u8>,
    copy_type: CopyType,
    copied_once: bool,
}

impl DmaLink {
    pub(crate) fn set_attribute(&mut self, attr: Attribute) -> Result<(), ComponentError> {
        match attr {
            Attribute::DmaBuffer(ring) => {
                tracing::debug!(ring = ring.id(), "dma ring attached");
                self.ring = Some(ring);
            }
            Attribute::CopyType(copy_type) => self.copy_type = copy_type,
        }
        Ok(())
    }

    pub(crate) fn ring(&self) -> Result<SharedBuffer, ComponentError> {
        self.ring.clone().ok_or(ComponentError::NotConnected("dma"))
    }

    pub(crate) fn prepare(&mut self, period: usize) -> Result<(), ComponentError> {
        self.copied_once = false;
        reserve_scratch(&mut self.scratch, period)
    }

    pub(crate) fn reset(&mut self) {
        self.copied_once = false;
    }

    /// Whether a transfer of `bytes` should happen this period.
    pub(crate) fn admits(&self, bytes: usize, period: usize) -> bool {
        match self.copy_type {
            CopyType::Normal => bytes > 0,
            CopyType::Blocking => bytes >= period && period > 0,
            CopyType::OneShot => bytes > 0 && !self.copied_once,
        }
    }

    /// Moves up to `bytes` from `from` to `to`. Returns bytes moved.
    pub(crate) fn transfer(&mut self, from: &SharedBuffer, to: &SharedBuffer, bytes: usize) -> usize {
        let n = bytes.min(self.scratch.len()).min(to.free());
        let n = from.read(&mut self.scratch[..n]);
        let moved = to.write(&self.scratch[..n]);
        if moved > 0 {
            self.copied_once = true;
        }
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_frames() {
        assert_eq!(whole_frames(17, 4), 16);
        assert_eq!(whole_frames(3, 4), 0);
        assert_eq!(whole_frames(5, 0), 0);
    }

    #[test]
    fn test_copy_type_admission() {
        let mut link = DmaLink::default();
        assert!(link.admits(8, 64));
        assert!(!link.admits(0, 64));

        link.set_attribute(Attribute::CopyType(CopyType::Blocking)).unwrap();
        assert!(!link.admits(32, 64));
        assert!(link.admits(64, 64));

        link.set_attribute(Attribute::CopyType(CopyType::OneShot)).unwrap();
        link.copied_once = true;
        assert!(!link.admits(64, 64));
        link.reset();
        assert!(link.admits(64, 64));
    }

    #[test]
    fn test_ring_required() {
        let link = DmaLink::default();
        assert!(matches!(link.ring(), Err(ComponentError::NotConnected("dma"))));
    }
}
