//! Per-core domain configuration.

use std::time::Duration;

use crate::buffer::{DEFAULT_ALIGNMENT, HEAP_BUFFER_SIZE};

/// Limits and identity of one core's topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainConfig {
    /// Core this topology runs on.
    pub core: u32,
    /// Largest buffer that may be allocated.
    pub max_buffer_bytes: usize,
    /// Alignment of buffer storage.
    pub buffer_align: usize,
    /// How long a forwarded cross-core request may take.
    pub forward_timeout: Duration,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            core: 0,
            max_buffer_bytes: HEAP_BUFFER_SIZE,
            buffer_align: DEFAULT_ALIGNMENT,
            forward_timeout: Duration::from_millis(1),
        }
    }
}

impl DomainConfig {
    /// Default configuration for `core`.
    pub fn for_core(core: u32) -> Self {
        Self {
            core,
            ..Self::default()
        }
    }
}
